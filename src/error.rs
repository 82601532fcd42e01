use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(KeyNotFound, msg: "bad argument {:?}", key);
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::io::read(buf));
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path), "read failed {:?}", file_path);
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a message.
///
/// Index errors form a small family, use the `is_*` predicates to match
/// on a whole family instead of a single variant.
#[derive(Clone, PartialEq)]
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    FailCbor(String, String),
    FailConvert(String, String),
    InvalidInput(String, String),
    InvalidFile(String, String),
    NotImplemented(String, String),
    /// Generic index failure, missing or existing bucket file, header
    /// overflow, broken records.
    IndexFail(String, String),
    /// Named index is not known to the database.
    IndexNotFound(String, String),
    /// Index is structurally unusable and must be rebuilt, or a rebuild
    /// is already in progress.
    Reindex(String, String),
    /// Caller should try reindexing, the operation might succeed after that.
    TryReindex(String, String),
    /// Key is missing in the index.
    KeyNotFound(String, String),
    /// Key is present but not for the requested document.
    DocIdNotFound(String, String),
    /// Duplicate key in a unique index, or duplicate index name.
    IndexConflict(String, String),
    /// Invalid configuration or arguments, like too many shards.
    Preconditions(String, String),
    /// Supplied revision does not match the stored revision.
    RevConflict(String, String),
    /// Document is present, but marked as deleted.
    RecordDeleted(String, String),
}

impl Error {
    /// Return true for every member of the index error family.
    pub fn is_index_error(&self) -> bool {
        use Error::*;

        matches!(
            self,
            IndexFail(_, _)
                | IndexNotFound(_, _)
                | Reindex(_, _)
                | TryReindex(_, _)
                | KeyNotFound(_, _)
                | DocIdNotFound(_, _)
                | IndexConflict(_, _)
                | Preconditions(_, _)
        )
    }

    /// Return true if error signals a missing key, document or index.
    pub fn is_not_found(&self) -> bool {
        use Error::*;

        matches!(
            self,
            KeyNotFound(_, _) | DocIdNotFound(_, _) | IndexNotFound(_, _)
        )
    }

    /// Return true if error asks for a reindex.
    pub fn is_reindex(&self) -> bool {
        matches!(self, Error::Reindex(_, _) | Error::TryReindex(_, _))
    }

    /// Return true if the operation might succeed after a reindex.
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::TryReindex(_, _))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            NotImplemented(p, msg) => write!(f, "{} NotImplemented: {}", p, msg),
            IndexFail(p, msg) => write!(f, "{} IndexFail: {}", p, msg),
            IndexNotFound(p, msg) => write!(f, "{} IndexNotFound: {}", p, msg),
            Reindex(p, msg) => write!(f, "{} Reindex: {}", p, msg),
            TryReindex(p, msg) => write!(f, "{} TryReindex: {}", p, msg),
            KeyNotFound(p, msg) => write!(f, "{} KeyNotFound: {}", p, msg),
            DocIdNotFound(p, msg) => write!(f, "{} DocIdNotFound: {}", p, msg),
            IndexConflict(p, msg) => write!(f, "{} IndexConflict: {}", p, msg),
            Preconditions(p, msg) => write!(f, "{} Preconditions: {}", p, msg),
            RevConflict(p, msg) => write!(f, "{} RevConflict: {}", p, msg),
            RecordDeleted(p, msg) => write!(f, "{} RecordDeleted: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
