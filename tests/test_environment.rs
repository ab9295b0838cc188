use std::time::Duration;

use lumo_mdbx::{
    limits, CopyFlags, Database, DbFlags, DeleteMode, EnvFlags, EnvOption, Environment, Error,
    Geometry, Options, Table, WriteFlags, DEFAULT_MODE, DEFAULT_TABLE,
};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Environment) {
    let temp_dir = TempDir::new().unwrap();
    let env = Environment::create().unwrap();
    env.set_max_tables(8).unwrap();
    env.open(temp_dir.path(), EnvFlags::NOTLS, DEFAULT_MODE).unwrap();
    (temp_dir, env)
}

fn small_options(dir: &TempDir) -> Options {
    Options {
        geometry: Geometry {
            size_upper: 64 << 20,
            ..Geometry::default()
        },
        ..Options::with_path(dir.path())
    }
}

#[test]
fn test_open_and_close() {
    let dir = TempDir::new().unwrap();
    let mut env = Environment::create().unwrap();
    assert!(!env.is_open());
    assert!(env.opened_at().is_none());

    env.open(dir.path(), EnvFlags::empty(), DEFAULT_MODE).unwrap();
    assert!(env.is_open());
    let opened_at = env.opened_at().unwrap();

    // second open is a no-op
    env.open(dir.path(), EnvFlags::empty(), DEFAULT_MODE).unwrap();
    assert_eq!(env.opened_at(), Some(opened_at));
    assert_eq!(env.path().unwrap(), dir.path());

    env.close(false).unwrap();
    assert!(!env.is_open());
    assert!(env.closed_at().unwrap() >= opened_at);

    env.close(false).unwrap();
    assert_eq!(env.info().unwrap_err(), Error::EnvClosed);
    assert_eq!(env.begin_ro_txn().unwrap_err(), Error::EnvClosed);
}

#[test]
fn test_conflicting_sync_modes() {
    let dir = TempDir::new().unwrap();
    let env = Environment::create().unwrap();
    let err = env
        .open(
            dir.path(),
            EnvFlags::SAFE_NOSYNC | EnvFlags::NOMETASYNC,
            DEFAULT_MODE,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(!env.is_open());
}

#[test]
fn test_runtime_flags() {
    let (_dir, env) = setup_test_env();
    assert!(env.flags().unwrap().contains(EnvFlags::NOTLS));

    env.set_flags(EnvFlags::NOMEMINIT, true).unwrap();
    assert!(env.flags().unwrap().contains(EnvFlags::NOMEMINIT));
    env.set_flags(EnvFlags::NOMEMINIT, false).unwrap();
    assert!(!env.flags().unwrap().contains(EnvFlags::NOMEMINIT));

    let err = env.set_flags(EnvFlags::WRITEMAP, true).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_options() {
    let (_dir, env) = setup_test_env();
    assert_eq!(env.max_tables().unwrap(), 8);

    env.set_txn_dp_limit(4096).unwrap();
    assert_eq!(env.txn_dp_limit().unwrap(), 4096);
    env.set_option(EnvOption::SyncBytes, 1 << 20).unwrap();
    assert_eq!(env.option(EnvOption::SyncBytes).unwrap(), 1 << 20);

    env.set_sync_period(Duration::from_secs(2)).unwrap();
    assert_eq!(env.sync_period().unwrap(), Duration::from_secs(2));
}

#[test]
fn test_environment_details() {
    let (_dir, env) = setup_test_env();

    let info = env.info().unwrap();
    assert!(info.page_size >= 256);
    assert!(info.max_readers > 0);
    assert!(env.fd().unwrap() >= 0);
    assert_eq!(env.reader_check().unwrap(), 0);

    let key_limit = env.max_key_size(DbFlags::empty()).unwrap();
    assert!(key_limit > 0);
    assert_eq!(
        limits::max_key_size(info.page_size as usize, DbFlags::empty()),
        Some(key_limit)
    );
    assert!(env.max_value_size(DbFlags::DUPSORT).unwrap() > 0);
    assert!(limits::max_value_size(4096, DbFlags::empty()).is_some());
    assert_eq!(limits::max_key_size(1000, DbFlags::empty()), None);

    let txn = env.begin_rw_txn().unwrap();
    txn.put(Table::MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();
    env.sync(true, false).unwrap();
    assert_eq!(env.info().unwrap().unsync_volume, 0);
}

#[test]
fn test_copy_and_delete() {
    let (dir, mut env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(Table::MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();

    let backup_dir = TempDir::new().unwrap();
    let backup = backup_dir.path().join("backup.mdbx");
    env.copy(&backup, CopyFlags::COMPACT).unwrap();
    env.close(false).unwrap();

    let copy = Environment::create().unwrap();
    copy.open(&backup, EnvFlags::NOSUBDIR | EnvFlags::RDONLY, DEFAULT_MODE)
        .unwrap();
    let txn = copy.begin_ro_txn().unwrap();
    assert_eq!(txn.get(Table::MAIN, "k").unwrap().unwrap().to_vec(), b"v");
    drop(txn);
    drop(copy);

    assert!(Environment::delete(dir.path(), DeleteMode::JustDelete).unwrap());
}

#[test]
fn test_drop_closes_environment() {
    let (dir, env) = setup_test_env();
    let txn = env.begin_rw_txn().unwrap();
    txn.put(Table::MAIN, "k", "v", WriteFlags::UPSERT).unwrap();
    txn.commit().unwrap();
    drop(env);

    let env = Environment::create().unwrap();
    env.open(dir.path(), EnvFlags::empty(), DEFAULT_MODE).unwrap();
    let txn = env.begin_ro_txn().unwrap();
    assert_eq!(txn.get(Table::MAIN, "k").unwrap().unwrap().to_vec(), b"v");
}

#[test]
fn test_database_facade() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(small_options(&dir)).unwrap();
    assert_eq!(db.options().path, dir.path());

    db.put("hello", "world").unwrap();
    assert_eq!(db.get("hello").unwrap(), Some(b"world".to_vec()));
    assert!(db.del("hello").unwrap());
    assert!(!db.del("hello").unwrap());
    assert_eq!(db.get("hello").unwrap(), None);

    let table = db
        .view(|txn, _| txn.open_table(Some(DEFAULT_TABLE), DbFlags::empty()))
        .unwrap();
    assert_eq!(table, db.table());
    db.close().unwrap();
}

#[test]
fn test_database_update_rolls_back() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(small_options(&dir)).unwrap();

    let written = db.update(|txn, table| {
        txn.put(table, "a", "1", WriteFlags::UPSERT)?;
        txn.put(table, "b", "2", WriteFlags::UPSERT)?;
        Ok::<_, Error>(2)
    });
    assert_eq!(written, Ok(2));

    let failed: Result<(), Error> = db.update(|txn, table| {
        txn.put(table, "c", "3", WriteFlags::UPSERT)?;
        Err(Error::InvalidArgument("stop"))
    });
    assert!(failed.is_err());

    assert!(db.get("a").unwrap().is_some());
    assert!(db.get("c").unwrap().is_none());

    let count = db
        .view(|txn, table| txn.table_stat(table).map(|stat| stat.entries))
        .unwrap();
    assert_eq!(count, 2);
}
