use super::*;

#[test]
fn test_record_layout() {
    let layout = Layout::new(32, 8).unwrap();
    assert_eq!(layout.to_record_size(), 1 + 32 + 1 + 8 + 8 + 8 + 1 + 8);

    let mut r = Record::new(b"0123456789abcdef0123456789abcdef", b"0001beef", 1024, 77, 0);
    let buf = layout.encode(&r).unwrap();
    assert_eq!(buf.len(), layout.to_record_size());
    assert_eq!(layout.decode(&buf).unwrap(), r);

    r.key = b"short".to_vec();
    r.doc_id = vec![];
    r.status = Status::Deleted;
    r.next = 0xDEAD_BEEF;
    let buf = layout.encode(&r).unwrap();
    let r2 = layout.decode(&buf).unwrap();
    assert_eq!(r2, r);
    assert!(!r2.is_live());
    assert!(r2.to_entry().is_deleted());
}

#[test]
fn test_record_bounds() {
    assert!(Layout::new(0, 8).is_err());
    assert!(Layout::new(256, 8).is_err());
    assert!(Layout::new(16, 256).is_err());

    let layout = Layout::new(4, 4).unwrap();
    let r = Record::new(b"toolong", b"id", 0, 0, 0);
    assert!(matches!(layout.encode(&r), Err(Error::Preconditions(_, _))));
    let r = Record::new(b"key", b"too-long", 0, 0, 0);
    assert!(matches!(layout.encode(&r), Err(Error::Preconditions(_, _))));

    let r = Record::new(b"key", b"id", 0, 0, 0);
    let mut buf = layout.encode(&r).unwrap();
    assert!(layout.decode(&buf[1..]).is_err());
    buf[0] = 200;
    assert!(matches!(layout.decode(&buf), Err(Error::IndexFail(_, _))));

    let mut buf = layout.encode(&r).unwrap();
    let n = buf.len();
    buf[n - 9] = b'x';
    assert!(matches!(layout.decode(&buf), Err(Error::IndexFail(_, _))));
}
