//! Transactional bindings for the libmdbx embedded key-value engine.
//!
//! An [`Environment`] owns one memory-mapped database. Work happens in
//! [`Transaction`]s, read-only ([`RO`]) or read-write ([`RW`]), over named
//! [`Table`]s, either directly or through a [`Cursor`]. Reads hand out
//! [`Value`] views that alias the map without copying and are tied to the
//! transaction that produced them.
//!
//! ```no_run
//! use lumo_mdbx::{DbFlags, EnvFlags, Environment, WriteFlags};
//!
//! # fn main() -> lumo_mdbx::Result<()> {
//! let env = Environment::create()?;
//! env.set_max_tables(4)?;
//! env.open("data", EnvFlags::empty(), 0o664)?;
//!
//! let txn = env.begin_rw_txn()?;
//! let table = txn.create_table(Some("default"), DbFlags::empty())?;
//! txn.put(table, "hello", "world", WriteFlags::UPSERT)?;
//! txn.commit()?;
//!
//! let txn = env.begin_ro_txn()?;
//! let value = txn.get(table, "hello")?;
//! assert_eq!(value.map(|v| v.to_vec()), Some(b"world".to_vec()));
//! # Ok(())
//! # }
//! ```

pub(crate) use signet_mdbx_sys as ffi;

mod bridge;
mod constants;
mod cursor;
mod database;
mod diagnostics;
mod env;
mod error;
mod layout;
mod options;
mod transaction;
mod types;
mod value;

pub use constants::{
    CopyFlags, DbFlags, DbiState, EnvFlags, TransactionFlags, WriteFlags, DEFAULT_MODE, MAX_DATA_SIZE,
    MAX_DBI, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
pub use cursor::{BindResult, Cursor, Pair, UnboundCursor};
pub use database::{Database, DEFAULT_TABLE};
pub use env::Environment;
pub use error::{describe, Error, ErrorKind, Result};
pub use options::{Options, DEFAULT_FLAGS, DEFAULT_GEOMETRY, SIMPLE_FLAGS};
pub use transaction::{Transaction, TransactionKind, TxnState, RO, RW};
pub use types::{
    Canary, CommitLatency, CursorOp, DeleteMode, EnvInfo, EnvOption, Geometry, GeometryInfo,
    Lookup, Stat, Table, TxnInfo,
};
pub use value::{Scalar, Value};

/// Engine size limits that do not need an open environment
pub mod limits {
    use crate::bridge::{self, LimitsKeySize, LimitsValSize};
    use crate::constants::DbFlags;

    /// Largest key for tables with `flags` at the given page size, `None`
    /// for an unsupported page size
    pub fn max_key_size(page_size: usize, flags: DbFlags) -> Option<usize> {
        let mut call = LimitsKeySize {
            page_size: isize::try_from(page_size).ok()?,
            flags: flags.bits(),
            size: -1,
        };
        // SAFETY: the block carries no pointers
        unsafe { bridge::invoke(&mut call) };
        usize::try_from(call.size).ok()
    }

    /// Largest value for tables with `flags` at the given page size
    pub fn max_value_size(page_size: usize, flags: DbFlags) -> Option<usize> {
        let mut call = LimitsValSize {
            page_size: isize::try_from(page_size).ok()?,
            flags: flags.bits(),
            size: -1,
        };
        // SAFETY: the block carries no pointers
        unsafe { bridge::invoke(&mut call) };
        usize::try_from(call.size).ok()
    }
}
