use std::collections::HashSet;

use super::*;

#[test]
fn test_hash_key() {
    assert_eq!(hash_key(b"hello world"), hash_key(b"hello world"));
    assert_ne!(hash_key(b"hello world"), hash_key(b"hello worle"));

    let slots: HashSet<u64> = (0..10_000_u64)
        .map(|i| hash_key(format!("key-{}", i).as_bytes()) & 0xFF)
        .collect();
    assert_eq!(slots.len(), 256, "poor spread across slots");

    let hasher = CityHasher::new();
    let mut h = hasher.build_hasher();
    h.write(b"abc");
    assert_eq!(h.finish(), hash_key(b"abc"));
}

#[test]
fn test_config() {
    let dir = std::env::temp_dir().join("test_hash_config");
    let mut config = Config::new(dir.as_os_str(), "tags");
    assert_eq!(config.hash_lim, HASH_LIM);
    assert_eq!(config.key_size, KEY_SIZE);
    assert_eq!(config.start_ind, START_IND);

    config
        .set_hash_lim(0xFF)
        .set_key_size(16)
        .set_id_size(8)
        .set_start_ind(1024)
        .set_cache(10, CachePolicy::Rr, true);
    assert_eq!(config.hash_lim, 0xFF);
    assert_eq!((config.key_size, config.id_size), (16, 8));
    assert_eq!(config.start_ind, 1024);
    assert_eq!(config.cache_policy, CachePolicy::Rr);
    assert!(config.cache_guard);

    let other = config.rename("tags_compact");
    assert_eq!(other.name, "tags_compact");
    assert_eq!(other.hash_lim, 0xFF);
}

#[test]
fn test_check_hash_lim() {
    for hash_lim in [0, 1, 0xF, 0xFF, HASH_LIM, u64::MAX >> 1].iter() {
        check_hash_lim(*hash_lim).unwrap();
    }
    for hash_lim in [2, 1000, 0x100, u64::MAX].iter() {
        match check_hash_lim(*hash_lim) {
            Err(Error::Preconditions(_, _)) => (),
            res => panic!("expected Preconditions for {:#x} {:?}", hash_lim, res),
        }
    }
}
