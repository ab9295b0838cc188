use log::debug;

use crate::constants::{DbFlags, WriteFlags};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::transaction::{Transaction, RO, RW};
use crate::types::Table;

/// Name of the table the facade reads and writes
pub const DEFAULT_TABLE: &str = "default";

/// An environment opened from [`Options`] with one ready table.
///
/// Each convenience call runs in its own transaction. Use
/// [`update`](Database::update) and [`view`](Database::view) to group work.
#[derive(Debug)]
pub struct Database {
    env: Environment,
    table: Table,
    options: Options,
}

impl Database {
    /// Create, configure and open the environment, then create the default
    /// table
    pub fn open(options: Options) -> Result<Database> {
        let env = Environment::create()?;
        env.set_geometry(options.geometry)?;
        env.set_max_tables(options.max_tables)?;
        env.set_txn_dp_limit(options.txn_dp_limit)?;
        env.open(&options.path, options.flags, options.mode)?;

        let txn = env.begin_rw_txn()?;
        let table = txn.create_table(Some(DEFAULT_TABLE), DbFlags::empty())?;
        txn.commit()?;

        debug!("database ready at {}", options.path.display());
        Ok(Database {
            env,
            table,
            options,
        })
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run `f` in a write transaction, committing if it succeeds and aborting
    /// otherwise
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_, RW>, Table) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let txn = self.env.begin_rw_txn()?;
        match f(&txn, self.table) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }

    /// Run `f` in a read-only transaction
    pub fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction<'_, RO>, Table) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let txn = self.env.begin_ro_txn()?;
        let out = f(&txn, self.table)?;
        txn.commit()?;
        Ok(out)
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.update(|txn, table| txn.put(table, key, value, WriteFlags::UPSERT))
    }

    /// Copy of the value stored under `key`
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.view(|txn, table| Ok(txn.get(table, key)?.map(|v| v.to_vec())))
    }

    /// Returns `false` if the key was absent
    pub fn del(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.update(|txn, table| txn.del(table, key, None))
    }

    pub fn close(self) -> Result<()> {
        let mut env = self.env;
        env.close(false)
    }
}
