use super::*;

fn missing(key: &str) -> Result<()> {
    err_at!(KeyNotFound, msg: "key {}", key)
}

#[test]
fn test_err_at() {
    let err = missing("hello").unwrap_err();
    match &err {
        Error::KeyNotFound(prefix, msg) => {
            assert!(prefix.starts_with(file!()), "{}", prefix);
            assert_eq!(msg, "key hello");
        }
        err => panic!("unexpected {}", err),
    }

    let res: Result<u8> = err_at!(FailConvert, u8::try_from(300_u32));
    assert!(matches!(res, Err(Error::FailConvert(_, _))));

    let res: Result<u8> = err_at!(FailConvert, u8::try_from(300_u32), "value {}", 300);
    match res {
        Err(Error::FailConvert(_, msg)) => assert!(msg.ends_with("value 300")),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_error_family() {
    let p = || ("here".to_string(), "msg".to_string());

    let (a, b) = p();
    let err = Error::TryReindex(a, b);
    assert!(err.is_index_error());
    assert!(err.is_reindex());
    assert!(err.is_retry());
    assert!(!err.is_not_found());

    let (a, b) = p();
    let err = Error::Reindex(a, b);
    assert!(err.is_reindex());
    assert!(!err.is_retry());

    let (a, b) = p();
    let err = Error::DocIdNotFound(a, b);
    assert!(err.is_not_found());
    assert!(err.is_index_error());

    let (a, b) = p();
    let err = Error::IOError(a, b);
    assert!(!err.is_index_error());
    assert_eq!(format!("{}", err), "here IOError: msg");
}
