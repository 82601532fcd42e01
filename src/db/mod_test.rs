use std::{fs, path, sync::Arc};

use super::*;
use crate::{
    hash::{HashIndex, KeyFn, Keys, MultiKeyFn},
    index::files::{to_bucket_location, to_storage_location},
    tree::TreeIndex,
};

fn tag_index(config: &Config, name: &str) -> Box<dyn Index> {
    let key_fn: KeyFn = Arc::new(|doc: &Doc| {
        let body = std::str::from_utf8(&doc.body).ok()?;
        let (tag, value) = body.split_once(':')?;
        Some((tag.as_bytes().to_vec(), value.as_bytes().to_vec()))
    });
    Box::new(HashIndex::new(&config.to_hash_config(name), key_fn).unwrap())
}

// body is a space separated list of words.
fn words_index(config: &Config, name: &str) -> Box<dyn Index> {
    let keys_fn: MultiKeyFn = Arc::new(|doc: &Doc| {
        doc.body
            .split(|b| *b == b' ')
            .filter(|w| !w.is_empty())
            .map(|w| (w.to_vec(), vec![]))
            .collect()
    });
    let config = config.to_hash_config(name);
    Box::new(HashIndex::with_keys(&config, Keys::Multi(keys_fn)).unwrap())
}

// body is `<name>:<age>`, ordered by age.
fn age_index(config: &Config, name: &str) -> Box<dyn Index> {
    let key_fn: KeyFn = Arc::new(|doc: &Doc| {
        let body = std::str::from_utf8(&doc.body).ok()?;
        let (name, age) = body.split_once(':')?;
        Some((age.as_bytes().to_vec(), name.as_bytes().to_vec()))
    });
    Box::new(TreeIndex::new(&config.to_hash_config(name), key_fn).unwrap())
}

fn to_tags<I>(iter: I) -> Vec<String>
where
    I: Iterator<Item = Result<Record>>,
{
    iter.map(|r| String::from_utf8(r.unwrap().tag).unwrap()).collect()
}

fn new_config(name: &str, id_shards: usize) -> Config {
    let dir = std::env::temp_dir().join(name);
    fs::remove_dir_all(&dir).ok();

    let mut config = Config::new(dir.as_os_str());
    config.set_id_shards(id_shards).set_hash_lim(0xFF);
    config
}

fn new_db(config: &Config) -> Database {
    let mut db = Database::new(config).unwrap();
    db.add_index(tag_index(config, "tags")).unwrap();
    db
}

fn with_rev(id: &str, rev: &str, body: &[u8]) -> Doc {
    let mut doc = Doc::new(body);
    doc.set_id(id).set_rev(rev);
    doc
}

#[test]
fn test_new_rev() {
    let rev = new_rev(None).unwrap();
    assert_eq!(rev.len(), 8);
    assert!(rev.starts_with("0001"), "{}", rev);

    let rev = new_rev(Some(&rev)).unwrap();
    assert!(rev.starts_with("0002"), "{}", rev);
    let rev = new_rev(Some("00ff1234")).unwrap();
    assert!(rev.starts_with("0100"), "{}", rev);
    assert!(new_rev(Some("fe001234")).unwrap().starts_with("fe01"));
    // wrap around beyond 65025
    assert!(new_rev(Some("fe011234")).unwrap().starts_with("0000"));

    match new_rev(Some("xyz")) {
        Err(Error::RevConflict(_, _)) => (),
        res => panic!("expected RevConflict {:?}", res),
    }
    assert!(new_rev(Some("zz001234")).is_err());
}

#[test]
fn test_database_crud() {
    let config = new_config("test_database_crud", 1);
    let mut db = new_db(&config);
    assert!(!db.is_opened());
    assert!(db.insert(&Doc::new(b"red:1")).is_err());

    db.create().unwrap();
    assert!(db.is_opened());
    assert!(db.create().is_err());
    assert_eq!(db.to_index_names(), vec!["id".to_string(), "tags".to_string()]);

    let (id, rev) = db.insert(&Doc::new(b"red:1")).unwrap();
    assert_eq!(id.len(), 32);
    assert!(rev.starts_with("0001"));

    let r = db.get("id", id.as_bytes()).unwrap();
    assert_eq!(r.id, id);
    assert_eq!(r.tag, rev.as_bytes().to_vec());
    assert_eq!(r.value, b"red:1".to_vec());

    let r = db.get("tags", b"red").unwrap();
    assert_eq!((r.id.as_str(), r.tag.as_slice(), r.value.as_slice()), (id.as_str(), &b"red"[..], &b"1"[..]));

    match db.get("colors", b"red") {
        Err(Error::IndexNotFound(_, _)) => (),
        res => panic!("expected IndexNotFound {:?}", res),
    }

    // insert with revision, update/delete without revision.
    assert!(db.insert(&with_rev(&id, &rev, b"red:1")).is_err());
    let mut doc = Doc::new(b"red:1");
    doc.set_id(&id);
    match db.update(&doc) {
        Err(Error::Preconditions(_, _)) => (),
        res => panic!("expected Preconditions {:?}", res),
    }
    assert!(db.delete(&doc).is_err());

    // duplicate id.
    match db.insert(&doc) {
        Err(Error::IndexConflict(_, _)) => (),
        res => panic!("expected IndexConflict {:?}", res),
    }

    match db.update(&with_rev(&id, "0009abcd", b"blue:2")) {
        Err(Error::RevConflict(_, _)) => (),
        res => panic!("expected RevConflict {:?}", res),
    }
    let (uid, new_rev) = db.update(&with_rev(&id, &rev, b"blue:2")).unwrap();
    assert_eq!(uid, id);
    assert!(new_rev.starts_with("0002"), "{}", new_rev);

    assert!(db.get("tags", b"red").unwrap_err().is_not_found());
    let r = db.get("tags", b"blue").unwrap();
    assert_eq!((r.id.clone(), r.value), (id.clone(), b"2".to_vec()));
    assert_eq!(db.get("id", id.as_bytes()).unwrap().value, b"blue:2".to_vec());

    // value change under the same key.
    let (_, new_rev) = db.update(&with_rev(&id, &new_rev, b"blue:3")).unwrap();
    assert_eq!(db.get("tags", b"blue").unwrap().value, b"3".to_vec());

    // documents that are not indexed by a secondary index.
    let (_, new_rev) = db.update(&with_rev(&id, &new_rev, b"plain")).unwrap();
    assert!(db.get("tags", b"blue").unwrap_err().is_not_found());
    assert_eq!(db.count("tags").unwrap(), 0);
    let (_, new_rev) = db.update(&with_rev(&id, &new_rev, b"green:4")).unwrap();
    assert_eq!(db.get("tags", b"green").unwrap().value, b"4".to_vec());

    assert!(db.delete(&with_rev(&id, &rev, b"")).is_err());
    db.delete(&with_rev(&id, &new_rev, b"")).unwrap();
    match db.get("id", id.as_bytes()) {
        Err(Error::RecordDeleted(_, _)) => (),
        res => panic!("expected RecordDeleted {:?}", res),
    }
    assert!(db.get("tags", b"green").unwrap_err().is_not_found());
    assert!(db.update(&with_rev(&id, &new_rev, b"green:5")).is_err());

    // empty bodies never touch storage.
    let (id, _) = db.insert(&Doc::new(b"")).unwrap();
    assert_eq!(db.get("id", id.as_bytes()).unwrap().value, Vec::<u8>::new());

    db.close().unwrap();
    assert!(db.close().is_err());
    db.destroy().unwrap();
    assert!(!path::Path::new(&config.dir).exists());
}

#[test]
fn test_database_scans() {
    let config = new_config("test_database_scans", 1);
    let mut db = new_db(&config);
    db.create().unwrap();

    let mut ids = vec![];
    for i in 0..20 {
        let tag = if i % 2 == 0 { "even" } else { "odd" };
        let body = format!("{}:{}", tag, i);
        ids.push(db.insert(&Doc::new(body.as_bytes())).unwrap().0);
    }

    assert_eq!(db.count("id").unwrap(), 20);
    assert_eq!(db.count("tags").unwrap(), 20);
    assert!(db.count("colors").is_err());

    let mut scan_ids: Vec<String> = db.all("id", 0).map(|r| r.unwrap().id).collect();
    scan_ids.sort();
    let mut refs = ids.clone();
    refs.sort();
    assert_eq!(scan_ids, refs);
    assert_eq!(db.all("id", 15).count(), 5);

    let records: Vec<Record> = db.get_many("tags", b"odd", None, 0).map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 10);
    let values: Vec<Vec<u8>> = records.iter().map(|r| r.value.clone()).collect();
    let refs: Vec<Vec<u8>> = (0..20).filter(|i| i % 2 == 1).map(|i| format!("{}", i).into_bytes()).collect();
    assert_eq!(values, refs);
    for r in records.iter() {
        assert_eq!(r.tag, b"odd".to_vec());
        let i = ids.iter().position(|id| id == &r.id).unwrap();
        assert_eq!(i % 2, 1);
    }

    let values: Vec<Vec<u8>> = db
        .get_many("tags", b"even", Some(2), 3)
        .map(|r| r.unwrap().value)
        .collect();
    assert_eq!(values, vec![b"4".to_vec(), b"6".to_vec(), b"8".to_vec()]);

    {
        let mut scan = db.get_many("id", ids[0].as_bytes(), None, 0);
        match scan.next() {
            Some(Err(Error::Preconditions(_, _))) => (),
            res => panic!("expected Preconditions {:?}", res),
        }
        assert!(scan.next().is_none());
    }
    match db.all("colors", 0).next() {
        Some(Err(Error::IndexNotFound(_, _))) => (),
        res => panic!("expected IndexNotFound {:?}", res),
    }

    // cursor driven scan.
    let mut cursor = Cursor::new(0, 5);
    let mut n = 0;
    while let Some(r) = db.next_all("tags", &mut cursor).unwrap() {
        assert!(r.tag == b"odd".to_vec() || r.tag == b"even".to_vec());
        n += 1;
    }
    assert_eq!(n, 5);

    db.destroy().unwrap();
}

#[test]
fn test_database_reopen() {
    let config = new_config("test_database_reopen", 1);
    let mut db = new_db(&config);
    db.create().unwrap();
    let mut docs = vec![];
    for i in 0..10 {
        let body = format!("tag{}:{}", i % 3, i);
        let (id, rev) = db.insert(&Doc::new(body.as_bytes())).unwrap();
        docs.push((id, rev, body));
    }
    db.close().unwrap();

    let mut db = Database::new(&config).unwrap();
    assert!(db.open().is_ok());
    db.close().unwrap();

    let mut db = new_db(&config);
    db.open().unwrap();
    assert!(db.open().is_err());
    for (id, rev, body) in docs.iter() {
        let r = db.get("id", id.as_bytes()).unwrap();
        assert_eq!(&r.tag, rev.as_bytes());
        assert_eq!(&r.value, body.as_bytes());
    }
    assert_eq!(db.get_many("tags", b"tag0", None, 0).count(), 4);

    // a secondary index added later, shall be reindexed.
    db.add_index(tag_index(&config, "late")).unwrap();
    assert!(db.add_index(tag_index(&config, "late")).is_err());
    assert_eq!(db.count("late").unwrap(), 0);

    // index never saw the document, delete shall pass.
    let (id, rev, _) = docs.pop().unwrap();
    db.delete(&with_rev(&id, &rev, b"")).unwrap();

    db.reindex_index("late").unwrap();
    assert_eq!(db.count("late").unwrap(), 9);
    assert_eq!(db.get_many("late", b"tag0", None, 0).count(), 3);

    match db.reindex_index("id") {
        Err(Error::Preconditions(_, _)) => (),
        res => panic!("expected Preconditions {:?}", res),
    }
    assert!(db.reindex_index("colors").is_err());
    match db.destroy_index("id") {
        Err(Error::Preconditions(_, _)) => (),
        res => panic!("expected Preconditions {:?}", res),
    }

    // edit index with reindex.
    db.edit_index(tag_index(&config, "late"), true).unwrap();
    assert_eq!(db.count("late").unwrap(), 9);
    assert!(db.edit_index(tag_index(&config, "colors"), false).is_err());

    db.destroy_index("late").unwrap();
    assert_eq!(db.to_index_names(), vec!["id".to_string(), "tags".to_string()]);
    db.reindex().unwrap();
    assert_eq!(db.count("tags").unwrap(), 9);

    db.destroy().unwrap();
}

#[test]
fn test_database_compact() {
    let config = new_config("test_database_compact", 1);
    let mut db = new_db(&config);
    db.create().unwrap();

    let mut docs = vec![];
    for i in 0..30 {
        let body = format!("tag{}:{}", i % 4, i);
        let (id, rev) = db.insert(&Doc::new(body.as_bytes())).unwrap();
        docs.push((id, rev, body));
    }
    for (id, rev, _) in docs.iter().step_by(2) {
        db.delete(&with_rev(id, rev, b"")).unwrap();
    }

    db.compact().unwrap();
    db.flush().unwrap();
    db.fsync().unwrap();
    assert_eq!(db.count("id").unwrap(), 15);
    assert_eq!(db.count("tags").unwrap(), 15);

    for (i, (id, rev, body)) in docs.iter().enumerate() {
        match i % 2 {
            0 => assert!(db.get("id", id.as_bytes()).unwrap_err().is_not_found()),
            _ => {
                let r = db.get("id", id.as_bytes()).unwrap();
                assert_eq!((&r.tag, &r.value), (&rev.as_bytes().to_vec(), &body.as_bytes().to_vec()));
            }
        }
    }

    assert!(db.compact_index("colors").is_err());
    db.compact_index("tags").unwrap();
    assert_eq!(db.count("tags").unwrap(), 15);

    db.destroy().unwrap();
}

#[test]
fn test_database_sharded_id() {
    let config = new_config("test_database_sharded_id", 4);
    let mut db = new_db(&config);
    db.create().unwrap();

    let mut docs = vec![];
    for i in 0..40 {
        let body = format!("tag:{}", i);
        let (id, rev) = db.insert(&Doc::new(body.as_bytes())).unwrap();
        let shard = u8::from_str_radix(&id[..2], 16).unwrap();
        assert!(shard < 4, "{}", id);
        docs.push((id, rev, body));
    }
    assert_eq!(db.count("id").unwrap(), 40);
    assert_eq!(db.count("tags").unwrap(), 40);

    // id from a shard that does not exist.
    let mut doc = Doc::new(b"tag:x");
    doc.set_id("ff000000000000000000000000000000");
    assert!(db.insert(&doc).is_err());

    for (id, rev, body) in docs.iter().take(10) {
        let (_, rev) = db.update(&with_rev(id, rev, body.as_bytes())).unwrap();
        assert!(rev.starts_with("0002"));
    }
    db.close().unwrap();

    let mut db = new_db(&config);
    db.open().unwrap();
    for (id, _, body) in docs.iter() {
        assert_eq!(&db.get("id", id.as_bytes()).unwrap().value, body.as_bytes());
    }
    let shards: Vec<String> = (0..4)
        .map(|i| format!("id-shard-{:03}_stor", i))
        .filter(|f| path::Path::new(&config.dir).join(f).exists())
        .collect();
    assert_eq!(shards.len(), 4);

    db.compact().unwrap();
    assert_eq!(db.count("id").unwrap(), 40);

    db.destroy().unwrap();
}

#[test]
fn test_database_id_index() {
    let config = new_config("test_database_id_index", 1);
    let index = tag_index(&config, "primary");
    match Database::with_id_index(&config, index, Box::new(DirectStore)) {
        Err(Error::Preconditions(_, _)) => (),
        Err(err) => panic!("unexpected {}", err),
        Ok(_) => panic!("expected Preconditions"),
    }

    let mut config = config.clone();
    config.set_id_shards(0);
    assert!(Database::new(&config).is_err());
    config.set_id_shards(256);
    assert!(Database::new(&config).is_err());

    config.set_id_shards(1).set_hash_lim(1000);
    match Database::new(&config) {
        Err(Error::Preconditions(_, _)) => (),
        Err(err) => panic!("unexpected {}", err),
        Ok(_) => panic!("expected Preconditions"),
    }
}

#[test]
fn test_database_edit_index() {
    let config = new_config("test_database_edit_index", 1);
    let mut db = new_db(&config);
    db.create().unwrap();
    let (id, rev) = db.insert(&Doc::new(b"red:1")).unwrap();

    // kind on disk is "hash", replacement fails to open.
    let index = UniqueHashIndex::new(&config.to_hash_config("tags")).unwrap();
    match db.edit_index(Box::new(index), false) {
        Err(Error::IndexFail(_, _)) => (),
        res => panic!("expected IndexFail {:?}", res),
    }

    // current index is still in service.
    assert_eq!(db.to_index_names(), vec!["id".to_string(), "tags".to_string()]);
    assert_eq!(db.get("tags", b"red").unwrap().id, id);
    let (id2, _) = db.insert(&Doc::new(b"red:2")).unwrap();
    assert_eq!(db.get_many("tags", b"red", None, 0).count(), 2);
    db.update(&with_rev(&id, &rev, b"blue:1")).unwrap();
    assert_eq!(db.get("tags", b"blue").unwrap().id, id);

    // same kind, new definition, reindexed.
    let key_fn: KeyFn = Arc::new(|doc: &Doc| {
        let body = std::str::from_utf8(&doc.body).ok()?;
        let (_, value) = body.split_once(':')?;
        Some((value.as_bytes().to_vec(), vec![]))
    });
    let index = HashIndex::new(&config.to_hash_config("tags"), key_fn).unwrap();
    db.edit_index(Box::new(index), true).unwrap();
    assert_eq!(db.get("tags", b"2").unwrap().id, id2);
    assert_eq!(db.get("tags", b"1").unwrap().id, id);
    assert!(db.get("tags", b"red").unwrap_err().is_not_found());

    match db.edit_index(tag_index(&config, "colors"), false) {
        Err(Error::IndexNotFound(_, _)) => (),
        res => panic!("expected IndexNotFound {:?}", res),
    }

    db.destroy().unwrap();
}

#[test]
fn test_database_user_ids() {
    let config = new_config("test_database_user_ids", 1);
    let mut db = new_db(&config);
    db.create().unwrap();

    let id = "0123456789abcdef0123456789ABCDEF".to_string();
    let mut doc = Doc::new(b"red:1");
    doc.set_id(&id);
    let (uid, rev) = db.insert(&doc).unwrap();
    assert_eq!(uid, id);

    let (_, rev) = db.update(&with_rev(&id, &rev, b"red:2")).unwrap();
    assert_eq!(db.get("tags", b"red").unwrap().value, b"2".to_vec());
    assert_eq!(db.get("id", id.as_bytes()).unwrap().value, b"red:2".to_vec());
    db.delete(&with_rev(&id, &rev, b"")).unwrap();
    match db.get("id", id.as_bytes()) {
        Err(Error::RecordDeleted(_, _)) => (),
        res => panic!("expected RecordDeleted {:?}", res),
    }

    // ids that can't be updated or deleted later are rejected up front.
    for bad in ["zz".repeat(16), "abc".to_string()].iter() {
        let mut doc = Doc::new(b"red:3");
        doc.set_id(bad);
        match db.insert(&doc) {
            Err(Error::Preconditions(_, _)) => (),
            res => panic!("expected Preconditions for {:?} {:?}", bad, res),
        }
        assert!(db.update(&with_rev(bad, "0001abcd", b"red:4")).is_err());
        assert!(db.delete(&with_rev(bad, "0001abcd", b"")).is_err());
    }
    assert_eq!(db.count("id").unwrap(), 0);
    assert_eq!(db.count("tags").unwrap(), 0);

    db.destroy().unwrap();
}

#[test]
fn test_database_compact_failure() {
    let config = new_config("test_database_compact_failure", 1);
    let mut db = new_db(&config);
    db.create().unwrap();
    for i in 0..10 {
        let body = format!("tag:{}", i);
        db.insert(&Doc::new(body.as_bytes())).unwrap();
    }

    // left behind by an interrupted compaction.
    let buck = to_bucket_location(&config.dir, "tags_compact");
    let stor = to_storage_location(&config.dir, "tags_compact");
    fs::write(&buck, b"stale").unwrap();
    fs::write(&stor, b"stale").unwrap();
    db.compact_index("tags").unwrap();
    assert!(!path::Path::new(&buck).exists());
    assert!(!path::Path::new(&stor).exists());
    assert_eq!(db.count("tags").unwrap(), 10);

    // failed compaction, index stays usable and can be compacted again.
    fs::create_dir_all(&buck).unwrap();
    assert!(db.compact_index("tags").is_err());
    assert_eq!(db.get_many("tags", b"tag", None, 0).count(), 10);
    db.insert(&Doc::new(b"tag:10")).unwrap();
    fs::remove_dir_all(&buck).unwrap();
    db.compact_index("tags").unwrap();
    assert_eq!(db.count("tags").unwrap(), 11);

    let buck = to_bucket_location(&config.dir, "id_compact");
    fs::write(&buck, b"stale").unwrap();
    db.compact().unwrap();
    assert_eq!(db.count("id").unwrap(), 11);
    assert!(!path::Path::new(&buck).exists());

    db.destroy().unwrap();
}

#[test]
fn test_database_rehash() {
    let config = new_config("test_database_rehash", 1);
    let mut db = new_db(&config);
    db.create().unwrap();
    let mut docs = vec![];
    for i in 0..20 {
        let body = format!("tag{}:{}", i % 4, i);
        let (id, _) = db.insert(&Doc::new(body.as_bytes())).unwrap();
        docs.push((id, body));
    }

    match db.rehash_index("tags", 1000) {
        Err(Error::Preconditions(_, _)) => (),
        res => panic!("expected Preconditions {:?}", res),
    }
    db.rehash_index("tags", 0xFFF).unwrap();
    db.rehash_index("id", 0xFFF).unwrap();
    assert!(db.rehash_index("colors", 0xFF).is_err());
    assert_eq!(db.count("id").unwrap(), 20);
    assert_eq!(db.get_many("tags", b"tag0", None, 0).count(), 5);
    db.close().unwrap();

    let mut db = new_db(&config);
    db.open().unwrap();
    for (id, body) in docs.iter() {
        assert_eq!(&db.get("id", id.as_bytes()).unwrap().value, body.as_bytes());
    }
    assert_eq!(db.count("tags").unwrap(), 20);

    db.destroy().unwrap();
}

#[test]
fn test_database_multi_keys() {
    let config = new_config("test_database_multi_keys", 1);
    let mut db = Database::new(&config).unwrap();
    db.add_index(words_index(&config, "words")).unwrap();
    db.create().unwrap();

    let (id1, rev1) = db.insert(&Doc::new(b"apple banana")).unwrap();
    let (id2, rev2) = db.insert(&Doc::new(b"banana cherry banana")).unwrap();
    let mut ids: Vec<String> = db
        .get_many("words", b"banana", None, 0)
        .map(|r| r.unwrap().id)
        .collect();
    ids.sort();
    let mut refs = vec![id1.clone(), id2.clone()];
    refs.sort();
    assert_eq!(ids, refs);
    assert_eq!(db.count("words").unwrap(), 4);

    // only changed keys are touched.
    db.update(&with_rev(&id1, &rev1, b"banana date")).unwrap();
    assert!(db.get("words", b"apple").unwrap_err().is_not_found());
    assert_eq!(db.get("words", b"date").unwrap().id, id1);
    assert_eq!(db.get_many("words", b"banana", None, 0).count(), 2);

    db.delete(&with_rev(&id2, &rev2, b"")).unwrap();
    assert!(db.get("words", b"cherry").unwrap_err().is_not_found());
    assert_eq!(db.get("words", b"banana").unwrap().id, id1);
    assert_eq!(db.count("words").unwrap(), 2);

    db.reindex_index("words").unwrap();
    assert_eq!(db.count("words").unwrap(), 2);

    db.destroy().unwrap();
}

#[test]
fn test_database_ranges() {
    let config = new_config("test_database_ranges", 1);
    let mut db = new_db(&config);
    db.add_index(age_index(&config, "ages")).unwrap();
    db.create().unwrap();

    let mut docs = vec![];
    for body in ["alice:31", "bob:25", "carol:40", "dave:25", "eve:19"].iter() {
        docs.push(db.insert(&Doc::new(body.as_bytes())).unwrap());
    }

    let (k19, k25, k31, k40) = (&b"19"[..], &b"25"[..], &b"31"[..], &b"40"[..]);
    let scan = db.get_between("ages", Bound::Included(k25), Bound::Excluded(k40), None, 0);
    assert_eq!(to_tags(scan), vec!["25", "25", "31"]);
    let scan = db.get_between("ages", Bound::Unbounded, Bound::Included(k25), None, 0);
    assert_eq!(to_tags(scan), vec!["19", "25", "25"]);
    let scan = db.get_between("ages", Bound::Excluded(k31), Bound::Unbounded, None, 0);
    let records: Vec<Record> = scan.map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].id.clone(), records[0].value.clone()), (docs[2].0.clone(), b"carol".to_vec()));
    let scan = db.get_between("ages", Bound::Unbounded, Bound::Unbounded, Some(1), 2);
    assert_eq!(to_tags(scan), vec!["25", "25"]);

    // update moves the document in key order.
    let (id, rev) = docs[1].clone();
    db.update(&with_rev(&id, &rev, b"bob:26")).unwrap();
    let scan = db.get_between("ages", Bound::Excluded(k25), Bound::Excluded(k31), None, 0);
    assert_eq!(to_tags(scan), vec!["26"]);
    let (id, rev) = docs[4].clone();
    db.delete(&with_rev(&id, &rev, b"")).unwrap();
    let scan = db.get_between("ages", Bound::Included(k19), Bound::Included(k19), None, 0);
    assert_eq!(scan.count(), 0);

    // only ordered secondary indexes scan ranges.
    match db.get_between("tags", Bound::Unbounded, Bound::Unbounded, None, 0).next() {
        Some(Err(Error::NotImplemented(_, _))) => (),
        res => panic!("expected NotImplemented {:?}", res),
    }
    match db.get_between("id", Bound::Unbounded, Bound::Unbounded, None, 0).next() {
        Some(Err(Error::Preconditions(_, _))) => (),
        res => panic!("expected Preconditions {:?}", res),
    }
    assert!(db.rehash_index("ages", 0xFF).is_err());
    db.compact_index("ages").unwrap();
    db.close().unwrap();

    let mut db = new_db(&config);
    db.add_index(age_index(&config, "ages")).unwrap();
    db.open().unwrap();
    let scan = db.get_between("ages", Bound::Unbounded, Bound::Unbounded, None, 0);
    assert_eq!(to_tags(scan), vec!["25", "26", "31", "40"]);
    assert_eq!(db.get("ages", b"26").unwrap().value, b"bob".to_vec());

    db.destroy().unwrap();
}
