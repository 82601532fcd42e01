use super::*;

#[test]
fn test_bucket_file_name() {
    let fname = BucketFileName::from("id".to_string());
    assert_eq!(fname.to_string(), "id_buck");
    assert_eq!(String::try_from(fname).unwrap(), "id".to_string());

    let fname = BucketFileName(ffi::OsString::from("/tmp/db/tags-shard-003_buck"));
    assert_eq!(String::try_from(fname).unwrap(), "tags-shard-003");

    let fname = BucketFileName(ffi::OsString::from("/tmp/db/id_stor"));
    assert!(String::try_from(fname).is_err());
    let fname = BucketFileName(ffi::OsString::from("_buck"));
    assert!(String::try_from(fname).is_err());
}

#[test]
fn test_storage_file_name() {
    let fname = StorageFileName::from("id".to_string());
    assert_eq!(fname.to_string(), "id_stor");
    assert_eq!(String::try_from(fname).unwrap(), "id".to_string());
}

#[test]
fn test_locations() {
    let dir = std::env::temp_dir().join("test_index_locations");
    let loc = to_bucket_location(dir.as_os_str(), "id");
    assert_eq!(path::Path::new(&loc), dir.join("id_buck").as_path());
    let loc = to_storage_location(dir.as_os_str(), "id");
    assert_eq!(path::Path::new(&loc), dir.join("id_stor").as_path());
    assert_eq!(to_compact_name("id"), "id_compact");
}

#[test]
fn test_purge_index_files() {
    let dir = std::env::temp_dir().join("test_purge_index_files");
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();

    assert!(!purge_index_files(dir.as_os_str(), "tags").unwrap());

    let buck = to_bucket_location(dir.as_os_str(), "tags");
    let stor = to_storage_location(dir.as_os_str(), "tags");
    std::fs::write(&stor, b"stale").unwrap();
    assert!(purge_index_files(dir.as_os_str(), "tags").unwrap());
    assert!(!path::Path::new(&buck).exists());
    assert!(!path::Path::new(&stor).exists());
}
