use std::{collections::HashMap, fs, path, sync::Arc};

use super::*;
use crate::{
    hash::{self, KeyFn, UniqueHashIndex},
    tree::TreeIndex,
};

fn unique_shard(dir: &ffi::OsStr, name: &str) -> Result<Box<dyn Index>> {
    let mut config = hash::Config::new(dir, name);
    config.set_hash_lim(0xFF);
    Ok(Box::new(UniqueHashIndex::new(&config)?))
}

fn new_sharded(name: &str, sh_nums: usize) -> ShardedIndex<PrefixShard> {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();
    ShardedIndex::new(dir.as_os_str(), name, sh_nums, PrefixShard, unique_shard).unwrap()
}

#[test]
fn test_prefix_shard() {
    let sf = PrefixShard;
    assert_eq!(sf.calculate_shard(b"0a3f", 16).unwrap(), 10);
    assert_eq!(sf.calculate_shard(b"00", 1).unwrap(), 0);
    assert!(sf.calculate_shard(b"0a3f", 10).is_err());
    assert!(sf.calculate_shard(b"z", 10).is_err());
    assert!(sf.calculate_shard(b"zz00", 10).is_err());

    for shard in 0..=MAX_SHARDS {
        let key = sf.create_key(shard).unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(sf.calculate_shard(&key, 256).unwrap(), shard);
    }
}

#[test]
fn test_sharded_sh_nums() {
    let dir = std::env::temp_dir().join("test_sharded_sh_nums");
    for sh_nums in [0, MAX_SHARDS + 1, 1000].iter() {
        let res = ShardedIndex::new(dir.as_os_str(), "ids", *sh_nums, PrefixShard, unique_shard);
        match res {
            Err(Error::Preconditions(_, _)) => (),
            Err(err) => panic!("unexpected {}", err),
            Ok(_) => panic!("expected Preconditions for {}", sh_nums),
        }
    }

    let index = new_sharded("test_sharded_sh_nums", 4);
    assert_eq!(index.to_sh_nums(), 4);
    let refs: Vec<String> = (0..4).map(|i| format!("test_sharded_sh_nums-shard-00{}", i)).collect();
    assert_eq!(index.to_shard_names(), refs);
}

#[test]
fn test_sharded_round_robin() {
    let sh_nums = 5;
    let mut index = new_sharded("test_sharded_round_robin", sh_nums);
    index.create_index().unwrap();

    let mut counts: HashMap<usize, usize> = HashMap::new();
    let mut prev = index.to_last_used();
    for _ in 0..(sh_nums * 7) {
        let key = index.create_key().unwrap();
        let shard = index.to_shard(&key).unwrap();
        assert_eq!(shard, (prev + 1) % sh_nums);
        assert_eq!(index.to_last_used(), shard);
        prev = shard;
        *counts.entry(shard).or_insert(0) += 1;
    }
    assert_eq!(counts.len(), sh_nums);
    assert!(counts.values().all(|n| *n == 7), "{:?}", counts);

    // insert, update and get move last_used to the key's shard.
    let key = PrefixShard.create_key(3).unwrap();
    index.insert(&key, b"00010001", 1, 0).unwrap();
    assert_eq!(index.to_last_used(), 3);
    let other = PrefixShard.create_key(1).unwrap();
    index.insert(&other, b"00010001", 1, 0).unwrap();
    index.get(&key).unwrap();
    assert_eq!(index.to_last_used(), 3);
    index.update(&other, b"00010002", 0, 0).unwrap();
    assert_eq!(index.to_last_used(), 1);
    // delete leaves last_used alone.
    index.delete(&key, b"00010001", 0, 0).unwrap();
    assert_eq!(index.to_last_used(), 1);

    index.destroy().unwrap();
}

#[test]
fn test_sharded_index() {
    let name = "test_sharded_index";
    let sh_nums = 3;
    let mut index = new_sharded(name, sh_nums);
    index.create_index().unwrap();
    assert_eq!(index.to_params().kind, "sharded");
    assert_eq!(index.to_params().shards, sh_nums as u64);

    let mut keys = vec![];
    for i in 0..30 {
        let key = index.create_key().unwrap();
        let value = format!("value-{}", i);
        index.insert_with_storage(&key, b"00010001", value.as_bytes()).unwrap();
        keys.push((key, value));
    }

    // values land in the storage of the key's shard.
    for (key, value) in keys.iter() {
        let entry = index.get(key).unwrap();
        let shard = index.to_shard(key).unwrap();
        let stor = index.shards[shard].storage().unwrap();
        assert_eq!(stor.get(entry.start, entry.size).unwrap(), value.as_bytes().to_vec());
        assert_eq!(index.read_value(&entry).unwrap(), value.as_bytes().to_vec());

        let loc = index.shard_storage(key).unwrap().to_location();
        let refn = ShardName::from((name.to_string(), shard)).to_string();
        assert!(loc.to_str().unwrap().contains(&refn), "{:?}", loc);
    }

    // full scan walks shards in order.
    let entries: Vec<Entry> = index.all(0).map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 30);
    let shards: Vec<usize> = entries.iter().map(|e| index.to_shard(&e.key).unwrap()).collect();
    let mut sorted = shards.clone();
    sorted.sort_unstable();
    assert_eq!(shards, sorted);
    assert_eq!(index.all(25).count(), 5);

    let mut cursor = Cursor::new(8, 4);
    let mut n = 0;
    while let Some(_) = index.next_all(&mut cursor).unwrap() {
        n += 1;
    }
    assert_eq!(n, 4);

    let (key, _) = &keys[7];
    let entries: Vec<Entry> = index.get_many(key, None, 0).map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(&entries[0].key, key);

    index.close_index().unwrap();

    let dir = std::env::temp_dir().join(name);
    let res = ShardedIndex::new(dir.as_os_str(), name, 2, PrefixShard, unique_shard);
    let mut other = res.unwrap();
    assert!(other.open_index().is_err());

    let res = ShardedIndex::new(dir.as_os_str(), name, sh_nums, PrefixShard, unique_shard);
    let mut index = res.unwrap();
    index.open_index().unwrap();
    assert_eq!(index.all(0).count(), 30);
    for (key, value) in keys.iter() {
        let entry = index.get(key).unwrap();
        assert_eq!(index.read_value(&entry).unwrap(), value.as_bytes().to_vec());
    }

    index.destroy().unwrap();
    assert!(!path::Path::new(&index.base.to_location()).exists());
}

#[test]
fn test_sharded_rehash() {
    let mut index = new_sharded("test_sharded_rehash", 3);
    index.create_index().unwrap();
    let keys: Vec<Vec<u8>> = (0..30).map(|_| index.create_key().unwrap()).collect();
    for key in keys.iter() {
        index.insert_with_storage(key, b"00010001", key).unwrap();
    }

    assert!(index.rehash(1000).is_err());
    index.rehash(0xFFF).unwrap();
    for shard in index.shards.iter() {
        assert_eq!(shard.to_params().hash_lim, 0xFFF);
    }
    assert_eq!(index.all(0).count(), 30);
    for key in keys.iter() {
        let entry = index.get(key).unwrap();
        assert_eq!(&index.read_value(&entry).unwrap(), key);
    }

    index.destroy().unwrap();
}

#[test]
fn test_sharded_ranges() {
    let name = "test_sharded_ranges";
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();

    let tree_shard = |dir: &ffi::OsStr, name: &str| -> Result<Box<dyn Index>> {
        let key_fn: KeyFn = Arc::new(|_doc: &Doc| None);
        let config = hash::Config::new(dir, name);
        Ok(Box::new(TreeIndex::new(&config, key_fn)?) as Box<dyn Index>)
    };
    let mut index = ShardedIndex::new(dir.as_os_str(), name, 2, PrefixShard, tree_shard).unwrap();
    index.create_index().unwrap();
    for key in ["01cc", "00bb", "01aa", "00aa"].iter() {
        index.insert_with_storage(key.as_bytes(), b"doc", key.as_bytes()).unwrap();
    }

    // key order within a shard, shards in order.
    let low = &b"00b"[..];
    let keys: Vec<Vec<u8>> = index
        .get_between(Bound::Included(low), Bound::Unbounded, None, 0)
        .map(|e| e.unwrap().key)
        .collect();
    assert_eq!(keys, vec![b"00bb".to_vec(), b"01aa".to_vec(), b"01cc".to_vec()]);
    let keys: Vec<Vec<u8>> = index
        .get_between(Bound::Unbounded, Bound::Unbounded, Some(1), 2)
        .map(|e| e.unwrap().key)
        .collect();
    assert_eq!(keys, vec![b"00bb".to_vec(), b"01aa".to_vec()]);

    let mut hashed = new_sharded("test_sharded_ranges_hash", 2);
    hashed.create_index().unwrap();
    let mut cursor = Cursor::default();
    match hashed.next_between(Bound::Unbounded, Bound::Unbounded, &mut cursor) {
        Err(Error::NotImplemented(_, _)) => (),
        res => panic!("expected NotImplemented {:?}", res),
    }

    hashed.destroy().unwrap();
    index.destroy().unwrap();
}
