use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use lumo_mdbx::{
    Canary, DbFlags, EnvFlags, Environment, Error, Geometry, Lookup, Table, TransactionFlags,
    TxnState, WriteFlags, DEFAULT_MODE,
};
use tempfile::TempDir;

const MAIN: Table = Table::MAIN;

fn setup_test_env() -> (TempDir, Environment) {
    let temp_dir = TempDir::new().unwrap();
    let env = Environment::create().unwrap();
    env.set_max_tables(8).unwrap();
    env.open(temp_dir.path(), EnvFlags::NOTLS, DEFAULT_MODE).unwrap();
    (temp_dir, env)
}

#[test]
fn test_single_writer() {
    let (_dir, env) = setup_test_env();
    let env = &env;

    let writer = env.begin_rw_txn().unwrap();
    writer.put(MAIN, "k", "v1", WriteFlags::UPSERT).unwrap();

    thread::scope(|s| {
        let busy = s.spawn(|| env.try_begin_rw_txn().map(|txn| txn.abort()).unwrap_err());
        let err = busy.join().unwrap();
        assert_eq!(err, Error::Busy);
        assert!(err.is_busy());

        let (started, rx) = mpsc::channel();
        let blocked = s.spawn(move || {
            let txn = env.begin_rw_txn().unwrap();
            started.send(()).unwrap();
            let seen = txn.get(MAIN, "k").unwrap().map(|v| v.to_vec());
            txn.abort().unwrap();
            seen
        });

        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err(), "second writer must wait");

        writer.commit().unwrap();
        assert_eq!(blocked.join().unwrap(), Some(b"v1".to_vec()));
        assert!(rx.try_recv().is_ok());
    });
}

#[test]
fn test_try_begin_with_free_slot() {
    let (_dir, env) = setup_test_env();

    let txn = env.try_begin_rw_txn().unwrap();
    assert!(!txn.flags().unwrap().contains(TransactionFlags::TRY));
    assert_eq!(txn.flags().unwrap(), TransactionFlags::READWRITE);
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();

    let txn = env.begin_rw_txn_with(TransactionFlags::TRY).unwrap();
    assert_eq!(txn.get(MAIN, "k").unwrap().unwrap().to_vec(), b"v");
    txn.abort().unwrap();
}

#[test]
fn test_reset_and_renew() {
    let (_dir, env) = setup_test_env();

    let mut reader = env.begin_ro_txn().unwrap();
    assert!(reader.get(MAIN, "k").unwrap().is_none());

    reader.reset().unwrap();
    assert_eq!(reader.state(), TxnState::Reset);
    assert_eq!(reader.get(MAIN, "k").unwrap_err(), Error::TxnReset);

    let writer = env.begin_rw_txn().unwrap();
    writer.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    writer.commit().unwrap();

    reader.renew().unwrap();
    assert_eq!(reader.state(), TxnState::Active);
    let value = reader.get(MAIN, "k").unwrap().unwrap();
    assert_eq!(value.to_vec(), b"v");
}

#[test]
fn test_reader_thread_affinity() {
    let dir = TempDir::new().unwrap();
    let pinned_env = Environment::create().unwrap();
    pinned_env.open(dir.path(), EnvFlags::empty(), DEFAULT_MODE).unwrap();
    let txn = pinned_env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();

    let reader = pinned_env.begin_ro_txn().unwrap();
    let mut reader = thread::scope(|s| {
        s.spawn(move || {
            let mut reader = reader;
            assert_eq!(reader.get(MAIN, "k").unwrap_err(), Error::ThreadMismatch);
            assert_eq!(reader.reset().unwrap_err(), Error::ThreadMismatch);
            reader
        })
        .join()
        .unwrap()
    });
    // back on its own thread the snapshot works again
    assert!(reader.get(MAIN, "k").unwrap().is_some());
    reader.reset().unwrap();
    reader.renew().unwrap();
    drop(reader);

    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();

    let reader = env.begin_ro_txn().unwrap();
    let seen = thread::scope(|s| {
        s.spawn(move || {
            let seen = reader.get(MAIN, "k").unwrap().map(|v| v.to_vec());
            seen
        })
        .join()
        .unwrap()
    });
    assert_eq!(seen, Some(b"v".to_vec()));
}

#[test]
fn test_prepared_reader_starts_reset() {
    let (_dir, env) = setup_test_env();

    let mut reader = env
        .begin_ro_txn_with(TransactionFlags::RDONLY_PREPARE)
        .unwrap();
    assert_eq!(reader.state(), TxnState::Reset);
    reader.renew().unwrap();
    assert!(reader.get(MAIN, "missing").unwrap().is_none());

    let err = env.begin_ro_txn_with(TransactionFlags::TRY).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_nested_transactions() {
    let (_dir, env) = setup_test_env();

    let mut parent = env.begin_rw_txn().unwrap();
    parent.put(MAIN, "p", "1", WriteFlags::UPSERT).unwrap();

    {
        let child = parent.begin_nested().unwrap();
        assert!(child.get(MAIN, "p").unwrap().is_some());
        child.put(MAIN, "aborted", "2", WriteFlags::UPSERT).unwrap();
        child.abort().unwrap();
    }
    {
        let child = parent.begin_nested().unwrap();
        child.put(MAIN, "kept", "3", WriteFlags::UPSERT).unwrap();
        child.commit().unwrap();
    }

    assert!(parent.get(MAIN, "aborted").unwrap().is_none());
    assert!(parent.get(MAIN, "kept").unwrap().is_some());
    parent.commit().unwrap();
}

#[test]
fn test_broken_transaction() {
    let (_dir, env) = setup_test_env();

    let mut txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.break_txn().unwrap();
    assert_eq!(txn.state(), TxnState::Broken);
    assert_eq!(
        txn.put(MAIN, "k2", "v2", WriteFlags::UPSERT).unwrap_err(),
        Error::TxnBroken
    );
    assert_eq!(txn.commit().unwrap_err(), Error::TxnBroken);

    // nothing was written and the writer slot is free again
    let txn = env.try_begin_rw_txn().unwrap();
    assert!(txn.get(MAIN, "k").unwrap().is_none());
}

#[test]
fn test_abort_discards_writes() {
    let (_dir, env) = setup_test_env();

    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.abort().unwrap();

    {
        // dropped without commit
        let txn = env.begin_rw_txn().unwrap();
        txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    }

    let txn = env.begin_ro_txn().unwrap();
    assert!(txn.get(MAIN, "k").unwrap().is_none());
}

#[test]
fn test_transaction_details() {
    let (_dir, env) = setup_test_env();

    let txn = env.begin_rw_txn_with(TransactionFlags::NOSYNC).unwrap();
    let id = txn.id().unwrap();
    assert!(id > 0);
    assert!(!txn.is_read_only());
    txn.put_canary(&Canary { x: 1, y: 2, z: 3, v: 0 }).unwrap();
    let latency = txn.commit_with_latency().unwrap();
    assert!(latency.whole >= Duration::ZERO);

    let txn = env.begin_ro_txn().unwrap();
    assert!(txn.flags().unwrap().contains(TransactionFlags::RDONLY));
    assert_eq!(txn.id().unwrap(), id);
    assert_eq!(txn.info(false).unwrap().id, id);
    assert!(txn.env_info().unwrap().recent_txnid >= id);

    let canary = txn.canary().unwrap();
    assert_eq!((canary.x, canary.y, canary.z), (1, 2, 3));
    assert_eq!(canary.v, id);
}

#[test]
fn test_replace() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "r", "old-value", WriteFlags::UPSERT).unwrap();

    let mut small = [0u8; 2];
    let err = txn
        .replace(MAIN, "r", Some(b"new"), WriteFlags::UPSERT, &mut small)
        .unwrap_err();
    assert_eq!(err, Error::BufferTooSmall { required: 9 });
    assert_eq!(txn.get(MAIN, "r").unwrap().unwrap().to_vec(), b"old-value");

    let mut old = [0u8; 16];
    let prev = txn
        .replace(MAIN, "r", Some(b"new"), WriteFlags::UPSERT, &mut old)
        .unwrap();
    assert_eq!(prev, Some(9));
    assert_eq!(&old[..9], b"old-value");
    assert_eq!(txn.get(MAIN, "r").unwrap().unwrap().to_vec(), b"new");

    let prev = txn
        .replace(MAIN, "fresh", Some(b"x"), WriteFlags::UPSERT, &mut old)
        .unwrap();
    assert_eq!(prev, None);

    let prev = txn.replace(MAIN, "r", None, WriteFlags::UPSERT, &mut old).unwrap();
    assert_eq!(prev, Some(3));
    assert_eq!(&old[..3], b"new");
    assert!(txn.get(MAIN, "r").unwrap().is_none());

    let prev = txn.replace(MAIN, "r", None, WriteFlags::UPSERT, &mut old).unwrap();
    assert_eq!(prev, None);

    let err = txn
        .replace(MAIN, "fresh", None, WriteFlags::RESERVE, &mut old)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    txn.commit().unwrap();

    // previous value on a page this transaction has not touched yet
    let txn = env.begin_rw_txn().unwrap();
    let mut old = [0u8; 16];
    let prev = txn.replace(MAIN, "fresh", None, WriteFlags::empty(), &mut old).unwrap();
    assert_eq!(prev, Some(1));
    assert_eq!(&old[..1], b"x");
    assert!(txn.get(MAIN, "fresh").unwrap().is_none());
}

#[test]
fn test_reserve() {
    let (_dir, env) = setup_test_env();
    let mut txn = env.begin_rw_txn().unwrap();

    let buf = txn.reserve(MAIN, "res", 4, WriteFlags::UPSERT).unwrap();
    assert_eq!(buf.len(), 4);
    buf.copy_from_slice(b"abcd");

    assert_eq!(txn.get(MAIN, "res").unwrap().unwrap().to_vec(), b"abcd");
    txn.commit().unwrap();
}

#[test]
fn test_lookups() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    let dups = txn.create_table(Some("dups"), DbFlags::DUPSORT).unwrap();

    txn.put(MAIN, "b", "1", WriteFlags::UPSERT).unwrap();
    txn.put(MAIN, "d", "2", WriteFlags::UPSERT).unwrap();
    txn.put(dups, "k", "a", WriteFlags::UPSERT).unwrap();
    txn.put(dups, "k", "b", WriteFlags::UPSERT).unwrap();

    match txn.get_equal_or_great(MAIN, "b").unwrap() {
        Lookup::Exact((k, v)) => assert_eq!((k.to_vec(), v.to_vec()), (b"b".to_vec(), b"1".to_vec())),
        other => panic!("expected exact match, got {:?}", other),
    }
    match txn.get_equal_or_great(MAIN, "c").unwrap() {
        Lookup::Next((k, _)) => assert_eq!(k.to_vec(), b"d"),
        other => panic!("expected next match, got {:?}", other),
    }
    assert!(!txn.get_equal_or_great(MAIN, "e").unwrap().is_found());

    let (first, count) = txn.get_with_count(dups, "k").unwrap().unwrap();
    assert_eq!(first.to_vec(), b"a");
    assert_eq!(count, 2);
    assert!(txn.get_with_count(dups, "nope").unwrap().is_none());

    assert!(txn.del(dups, "k", Some(b"a")).unwrap());
    assert_eq!(txn.get(dups, "k").unwrap().unwrap().to_vec(), b"b");
}

#[test]
fn test_drop_table() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    let table = txn.create_table(Some("tmp"), DbFlags::empty()).unwrap();
    txn.put(table, "k", "v", WriteFlags::UPSERT).unwrap();

    txn.drop_table(table, false).unwrap();
    assert_eq!(txn.table_stat(table).unwrap().entries, 0);

    txn.drop_table(table, true).unwrap();
    assert!(txn
        .open_table(Some("tmp"), DbFlags::empty())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_writes_invalidate_views() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();

    let value = txn.get(MAIN, "k").unwrap().unwrap();
    let copy = value.to_vec();
    assert!(value.is_valid());

    txn.put(MAIN, "other", "x", WriteFlags::UPSERT).unwrap();
    assert!(!value.is_valid());
    assert_eq!(copy, b"v");
}

#[test]
fn test_view_held_across_write() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "a", "XXXX", WriteFlags::UPSERT).unwrap();

    let held = txn.get(MAIN, "a").unwrap().unwrap();
    let snapshot = held.clone();
    txn.put(MAIN, "a", "YYYY", WriteFlags::UPSERT).unwrap();

    // the page under the view was rewritten in place
    assert!(!held.is_valid() && !snapshot.is_valid());
    let read = panic::catch_unwind(AssertUnwindSafe(|| held.to_vec()));
    assert!(read.is_err());
    let decoded = panic::catch_unwind(AssertUnwindSafe(|| snapshot.u32()));
    assert!(decoded.is_err());

    assert_eq!(txn.get(MAIN, "a").unwrap().unwrap().to_vec(), b"YYYY");
}

#[test]
#[should_panic(expected = "value view read after a write")]
fn test_stale_view_read_panics() {
    let (_dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(MAIN, "k", "v", WriteFlags::UPSERT).unwrap();

    let value = txn.get(MAIN, "k").unwrap().unwrap();
    txn.put(MAIN, "k", "changed", WriteFlags::UPSERT).unwrap();
    let _ = value.to_vec();
}

#[test]
fn test_capacity_limit() {
    let dir = TempDir::new().unwrap();
    let env = Environment::create().unwrap();
    env.set_geometry(Geometry {
        size_now: 1 << 20,
        size_upper: 64 << 20,
        page_size: 4096,
        ..Geometry::default()
    })
    .unwrap();
    env.open(dir.path(), EnvFlags::NOTLS, DEFAULT_MODE).unwrap();
    env.set_txn_dp_limit(128).unwrap();
    assert_eq!(env.txn_dp_limit().unwrap(), 128);

    // two values per page, each page held by an open cursor so that no
    // dirty page can be spilled to make room
    let value = vec![0xabu8; 1500];
    let txn = env.begin_rw_txn().unwrap();
    let mut cursors = Vec::new();
    let mut written = 0u32;
    let mut failure = None;
    for i in 0u32..4096 {
        let key = i.to_be_bytes();
        if let Err(err) = txn.put(MAIN, key, &value, WriteFlags::UPSERT) {
            failure = Some(err);
            break;
        }
        written += 1;
        let mut cursor = txn.open_cursor(MAIN).unwrap();
        cursor.set(key).unwrap().unwrap();
        cursors.push(cursor);
    }
    let err = failure.expect("pinned dirty pages must exhaust the limit");
    assert_eq!(err, Error::TxnFull);
    assert!(err.is_capacity_exhausted());
    assert!(written > 16, "failed after {} writes", written);
    drop(cursors);
}
