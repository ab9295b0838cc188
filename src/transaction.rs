use log::{debug, trace, warn};
use std::cell::Cell;
use std::ffi::CString;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, size_of, ManuallyDrop};
use std::os::raw::c_uint;
use std::ptr;
use std::slice;
use std::thread::{self, ThreadId};

use crate::bridge::{self, *};
use crate::constants::{
    DbFlags, DbiState, EnvFlags, TransactionFlags, WriteFlags, MDBX_NOTFOUND, MDBX_RESULT_TRUE,
    MDBX_SUCCESS,
};
use crate::cursor::Cursor;
use crate::env::Environment;
use crate::error::{Error, IntoResult, Result};
use crate::ffi;
use crate::types::{from_16dot16, Canary, CommitLatency, EnvInfo, Lookup, Stat, Table, TxnInfo};
use crate::value::{out_val, Value};

mod private {
    pub trait Sealed {}
}

/// Marker for the kind of a transaction
pub trait TransactionKind: private::Sealed + fmt::Debug + 'static {
    #[doc(hidden)]
    const READ_ONLY: bool;
}

/// Read-only transaction marker
#[derive(Debug)]
#[non_exhaustive]
pub struct RO;

/// Read-write transaction marker
#[derive(Debug)]
#[non_exhaustive]
pub struct RW;

impl private::Sealed for RO {}
impl private::Sealed for RW {}

impl TransactionKind for RO {
    const READ_ONLY: bool = true;
}

impl TransactionKind for RW {
    const READ_ONLY: bool = false;
}

/// Runtime state of a live transaction. Commit and abort consume the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    /// Read-only transaction released its snapshot, renew before use
    Reset,
    /// Only abort is allowed
    Broken,
}

/// A transaction over an [`Environment`].
///
/// Only one read-write transaction may run at a time across all processes
/// sharing the environment; read-only transactions never block each other or
/// the writer. A write transaction stays on the thread that began it. A
/// read-only one may move to another thread only when the environment was
/// opened with [`EnvFlags::NOTLS`]; otherwise its reader slot belongs to the
/// thread that began it and use elsewhere fails with
/// [`Error::ThreadMismatch`].
///
/// Values read through a transaction borrow it and become stale on the next
/// write in the same transaction.
pub struct Transaction<'env, K: TransactionKind> {
    env: &'env Environment,
    txn: *mut ffi::MDBX_txn,
    state: Cell<TxnState>,
    generation: Cell<u64>,
    owner: ThreadId,
    /// Reader slot tied to the owner thread
    pinned: bool,
    _kind: PhantomData<K>,
}

// SAFETY: the engine does not check the calling thread itself. A snapshot
// whose reader slot is tied to the owner thread refuses every call from
// another thread in `raw`, `reset` and `renew`.
unsafe impl Send for Transaction<'_, RO> {}

impl<K: TransactionKind> fmt::Debug for Transaction<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("kind", &if K::READ_ONLY { "ro" } else { "rw" })
            .field("state", &self.state.get())
            .finish()
    }
}

impl<'env, K: TransactionKind> Transaction<'env, K> {
    pub(crate) fn begin(
        env: &'env Environment,
        parent: *mut ffi::MDBX_txn,
        flags: TransactionFlags,
    ) -> Result<Self> {
        let pinned = K::READ_ONLY && !env.flags()?.contains(EnvFlags::NOTLS);
        let mut txn = ptr::null_mut();
        let mut call = TxnBegin {
            env: env.handle()?,
            parent,
            txn: &mut txn,
            context: ptr::null_mut(),
            flags: flags.bits(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;

        let state = if flags.contains(TransactionFlags::RDONLY_PREPARE) {
            TxnState::Reset
        } else {
            TxnState::Active
        };
        trace!(
            "began {} transaction{}",
            if K::READ_ONLY { "read-only" } else { "read-write" },
            if parent.is_null() { "" } else { " (nested)" }
        );

        Ok(Transaction {
            env,
            txn,
            state: Cell::new(state),
            generation: Cell::new(0),
            owner: thread::current().id(),
            pinned,
            _kind: PhantomData,
        })
    }

    /// Read-only snapshots without NOTLS stay on their thread in every build,
    /// write transactions are checked in debug builds.
    fn check_thread(&self) -> Result<()> {
        let checked = self.pinned || (!K::READ_ONLY && cfg!(debug_assertions));
        if checked && thread::current().id() != self.owner {
            return Err(Error::ThreadMismatch);
        }
        Ok(())
    }

    /// Native handle, once the transaction is known to be usable
    pub(crate) fn raw(&self) -> Result<*mut ffi::MDBX_txn> {
        match self.state.get() {
            TxnState::Active => {}
            TxnState::Reset => return Err(Error::TxnReset),
            TxnState::Broken => return Err(Error::TxnBroken),
        }
        self.check_thread()?;
        Ok(self.txn)
    }

    pub(crate) fn generation(&self) -> &Cell<u64> {
        &self.generation
    }

    /// Invalidates every value read so far
    pub(crate) fn touch(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    fn into_raw(self) -> *mut ffi::MDBX_txn {
        let this = ManuallyDrop::new(self);
        this.txn
    }

    pub fn env(&self) -> &'env Environment {
        self.env
    }

    pub fn state(&self) -> TxnState {
        self.state.get()
    }

    pub fn is_read_only(&self) -> bool {
        K::READ_ONLY
    }

    pub fn id(&self) -> Result<u64> {
        let mut call = TxnId {
            txn: self.raw()?,
            id: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        match call.id {
            0 => Err(Error::BadTxn),
            id => Ok(id),
        }
    }

    /// Flags the transaction was started with. The non-blocking `TRY` request
    /// and the engine's internal state bits are not reported.
    pub fn flags(&self) -> Result<TransactionFlags> {
        let mut call = TxnFlags {
            txn: self.raw()?,
            flags: -1,
        };
        unsafe { bridge::invoke(&mut call) };
        if call.flags < 0 {
            return Err(Error::BadTxn);
        }
        Ok(TransactionFlags::from_bits_truncate(call.flags as u32) - TransactionFlags::TRY)
    }

    /// Transaction details. `scan_rlt` also scans the reader table to compute
    /// the reader lag of a write transaction.
    pub fn info(&self, scan_rlt: bool) -> Result<TxnInfo> {
        let mut info = TxnInfo::default();
        let mut call = bridge::TxnInfo {
            txn: self.raw()?,
            info: &mut info as *mut TxnInfo as *mut ffi::MDBX_txn_info,
            scan_rlt,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(info)
    }

    /// Environment information as seen by this transaction's snapshot
    pub fn env_info(&self) -> Result<EnvInfo> {
        self.env.info_within(self.raw()?)
    }

    pub fn canary(&self) -> Result<Canary> {
        let mut canary = Canary::default();
        let mut call = CanaryGet {
            txn: self.raw()?,
            canary: &mut canary as *mut Canary as *mut ffi::MDBX_canary,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(canary)
    }

    /// Open a table. `None` names the main table.
    ///
    /// A table created here is visible to other transactions only after
    /// commit, and its handle is invalidated if the transaction aborts.
    pub fn open_table(&self, name: Option<&str>, flags: DbFlags) -> Result<Table> {
        let name = name
            .map(CString::new)
            .transpose()
            .map_err(|_| Error::InvalidArgument("table name contains a NUL byte"))?;
        let mut dbi = 0u32;
        let mut call = DbiOpen {
            txn: self.raw()?,
            name: name.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
            flags: flags.bits(),
            dbi: &mut dbi,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(Table { dbi })
    }

    pub fn table_stat(&self, table: Table) -> Result<Stat> {
        let mut stat = Stat::default();
        let mut call = DbiStat {
            txn: self.raw()?,
            dbi: table.dbi,
            stat: &mut stat as *mut Stat as *mut ffi::MDBX_stat,
            size: size_of::<Stat>(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(stat)
    }

    pub fn table_flags(&self, table: Table) -> Result<(DbFlags, DbiState)> {
        let mut flags: c_uint = 0;
        let mut state: c_uint = 0;
        let mut call = DbiFlags {
            txn: self.raw()?,
            dbi: table.dbi,
            flags: &mut flags,
            state: &mut state,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok((
            DbFlags::from_bits_truncate(flags as u32),
            DbiState::from_bits_retain(state as u32),
        ))
    }

    /// Value stored under `key`, the first one for DUPSORT tables.
    pub fn get(&self, table: Table, key: impl AsRef<[u8]>) -> Result<Option<Value<'_>>> {
        let key = Value::new(key.as_ref()).raw();
        let mut data = out_val();
        let mut call = Get {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &key,
            data: &mut data,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        match call.status {
            MDBX_SUCCESS => Ok(Some(Value::from_raw(data, &self.generation))),
            MDBX_NOTFOUND => Ok(None),
            status => Err(Error::from(status)),
        }
    }

    /// Like [`get`](Self::get), also returning how many values the key has
    pub fn get_with_count(
        &self,
        table: Table,
        key: impl AsRef<[u8]>,
    ) -> Result<Option<(Value<'_>, usize)>> {
        let mut key = Value::new(key.as_ref()).raw();
        let mut data = out_val();
        let mut count = 0usize;
        let mut call = GetEx {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &mut key,
            data: &mut data,
            values_count: &mut count,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        match call.status {
            MDBX_SUCCESS | MDBX_RESULT_TRUE => {
                Ok(Some((Value::from_raw(data, &self.generation), count)))
            }
            MDBX_NOTFOUND => Ok(None),
            status => Err(Error::from(status)),
        }
    }

    /// First pair whose key is equal to or greater than `key`
    pub fn get_equal_or_great(
        &self,
        table: Table,
        key: impl AsRef<[u8]>,
    ) -> Result<Lookup<(Value<'_>, Value<'_>)>> {
        let mut key = Value::new(key.as_ref()).raw();
        let mut data = out_val();
        let mut call = GetEqualOrGreat {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &mut key,
            data: &mut data,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        let pair = |key, data| {
            (
                Value::from_raw(key, &self.generation),
                Value::from_raw(data, &self.generation),
            )
        };
        match call.status {
            MDBX_SUCCESS => Ok(Lookup::Exact(pair(key, data))),
            MDBX_RESULT_TRUE => Ok(Lookup::Next(pair(key, data))),
            MDBX_NOTFOUND => Ok(Lookup::NotFound),
            status => Err(Error::from(status)),
        }
    }

    pub fn open_cursor(&self, table: Table) -> Result<Cursor<'_, K>> {
        Cursor::open(self, table)
    }

    /// Commit the transaction.
    ///
    /// The handle is released whatever the outcome.
    pub fn commit(self) -> Result<()> {
        self.commit_with_latency().map(|_| ())
    }

    /// Commit, reporting how long each stage took
    pub fn commit_with_latency(self) -> Result<CommitLatency> {
        match self.state.get() {
            TxnState::Active => {}
            TxnState::Reset => {
                self.abort()?;
                return Err(Error::TxnReset);
            }
            TxnState::Broken => {
                self.abort()?;
                return Err(Error::TxnBroken);
            }
        }

        let txn = self.into_raw();
        // SAFETY: plain-old-data structure, all-zero is a valid value
        let mut latency: ffi::MDBX_commit_latency = unsafe { mem::zeroed() };
        let mut call = TxnCommit {
            txn,
            latency: &mut latency,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };

        let result = match call.status {
            MDBX_SUCCESS => Ok(()),
            // the engine aborted instead of committing
            MDBX_RESULT_TRUE => Err(Error::TxnBroken),
            status => Err(Error::from(status)),
        };
        if let Err(err) = result {
            warn!("transaction commit failed: {}", err);
            return Err(err);
        }
        trace!("committed transaction");

        Ok(CommitLatency {
            preparation: from_16dot16(latency.preparation as u32),
            gc: from_16dot16(latency.gc_wallclock as u32),
            audit: from_16dot16(latency.audit as u32),
            write: from_16dot16(latency.write as u32),
            sync: from_16dot16(latency.sync as u32),
            ending: from_16dot16(latency.ending as u32),
            whole: from_16dot16(latency.whole as u32),
        })
    }

    /// Discard the transaction and all its writes
    pub fn abort(self) -> Result<()> {
        let mut call = TxnAbort {
            txn: self.into_raw(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    /// Mark the transaction unusable. It keeps its locks until aborted.
    pub fn break_txn(&mut self) -> Result<()> {
        let mut call = TxnBreak {
            txn: self.raw()?,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        self.state.set(TxnState::Broken);
        Ok(())
    }
}

impl<'env> Transaction<'env, RO> {
    /// Release the snapshot but keep the handle for a later [`renew`](Self::renew)
    pub fn reset(&mut self) -> Result<()> {
        if self.state.get() == TxnState::Broken {
            return Err(Error::TxnBroken);
        }
        self.check_thread()?;
        let mut call = TxnReset {
            txn: self.txn,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        self.state.set(TxnState::Reset);
        self.touch();
        Ok(())
    }

    /// Acquire a fresh snapshot for a reset transaction
    pub fn renew(&mut self) -> Result<()> {
        if self.state.get() == TxnState::Broken {
            return Err(Error::TxnBroken);
        }
        self.check_thread()?;
        let mut call = TxnRenew {
            txn: self.txn,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        self.state.set(TxnState::Active);
        self.touch();
        Ok(())
    }
}

impl<'env> Transaction<'env, RW> {
    /// Open a table, creating it if missing
    pub fn create_table(&self, name: Option<&str>, flags: DbFlags) -> Result<Table> {
        self.open_table(name, flags | DbFlags::CREATE)
    }

    /// Begin a child transaction. The parent is unusable until the child ends.
    pub fn begin_nested(&mut self) -> Result<Transaction<'_, RW>> {
        let parent = self.raw()?;
        Transaction::begin(self.env, parent, TransactionFlags::READWRITE)
    }

    /// Store a key/value pair.
    ///
    /// Use [`reserve`](Self::reserve) for `RESERVE` and a cursor's
    /// `put_multiple` for `MULTIPLE`.
    pub fn put(
        &self,
        table: Table,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        flags: WriteFlags,
    ) -> Result<()> {
        if flags.intersects(WriteFlags::RESERVE | WriteFlags::MULTIPLE) {
            return Err(Error::InvalidArgument("use reserve or put_multiple"));
        }
        let key = Value::new(key.as_ref()).raw();
        let mut data = Value::new(value.as_ref()).raw();
        let mut call = Put {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &key,
            data: &mut data,
            flags: flags.bits(),
            status: 0,
        };
        self.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    /// Make room for a value of `len` bytes and return it for the caller to
    /// fill before the next write.
    pub fn reserve(
        &mut self,
        table: Table,
        key: impl AsRef<[u8]>,
        len: usize,
        flags: WriteFlags,
    ) -> Result<&mut [u8]> {
        let key = Value::new(key.as_ref()).raw();
        let mut data = ffi::MDBX_val {
            iov_base: ptr::null_mut(),
            iov_len: len,
        };
        let mut call = Put {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &key,
            data: &mut data,
            flags: (flags | WriteFlags::RESERVE).bits(),
            status: 0,
        };
        self.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        if len == 0 || data.iov_base.is_null() {
            return Ok(&mut []);
        }
        // SAFETY: the engine reserved `len` writable bytes in a dirty page of
        // this transaction, exclusively borrowed for the slice's lifetime
        Ok(unsafe { slice::from_raw_parts_mut(data.iov_base as *mut u8, len) })
    }

    /// Replace the value of `key`, copying the previous one into `old`.
    ///
    /// `None` as the new value deletes the key. Returns the length of the
    /// previous value, or `None` if there was none. When `old` is too small
    /// nothing is changed and [`Error::BufferTooSmall`] carries the size
    /// needed.
    pub fn replace(
        &self,
        table: Table,
        key: impl AsRef<[u8]>,
        value: Option<&[u8]>,
        flags: WriteFlags,
        old: &mut [u8],
    ) -> Result<Option<usize>> {
        if flags.intersects(WriteFlags::RESERVE | WriteFlags::MULTIPLE) {
            return Err(Error::InvalidArgument("replace does not reserve or store multiple values"));
        }
        // deletion goes through the current-item path of the engine
        let flags = match value {
            Some(_) => flags,
            None => flags | WriteFlags::CURRENT,
        };
        let key = key.as_ref();
        if let Some(present) = self.get(table, key)? {
            if present.len() > old.len() {
                return Err(Error::BufferTooSmall {
                    required: present.len(),
                });
            }
        }

        let key = Value::new(key).raw();
        let mut new_data = value.map(|v| Value::new(v).raw());
        let mut old_data = ffi::MDBX_val {
            iov_base: old.as_mut_ptr().cast(),
            iov_len: old.len(),
        };
        let mut call = Replace {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &key,
            new_data: new_data.as_mut().map_or(ptr::null_mut(), |d| d as *mut _),
            old_data: &mut old_data,
            flags: flags.bits(),
            status: 0,
        };
        self.touch();
        unsafe { bridge::invoke(&mut call) };
        match call.status {
            MDBX_SUCCESS if old_data.iov_base.is_null() => Ok(None),
            MDBX_SUCCESS => {
                let len = old_data.iov_len;
                let dest = old
                    .get_mut(..len)
                    .ok_or(Error::BufferTooSmall { required: len })?;
                // an unmodified page is handed back in place instead of copied
                if old_data.iov_base as *const u8 != dest.as_ptr() {
                    // SAFETY: the engine points at the previous value, which
                    // stays mapped for the rest of the transaction
                    let previous =
                        unsafe { slice::from_raw_parts(old_data.iov_base as *const u8, len) };
                    dest.copy_from_slice(previous);
                }
                Ok(Some(len))
            }
            MDBX_NOTFOUND if value.is_none() => Ok(None),
            MDBX_RESULT_TRUE => Err(Error::BufferTooSmall {
                required: old_data.iov_len,
            }),
            status => Err(Error::from(status)),
        }
    }

    /// Delete `key`, or only the given duplicate when `value` is set.
    /// Returns `false` if nothing matched.
    pub fn del(&self, table: Table, key: impl AsRef<[u8]>, value: Option<&[u8]>) -> Result<bool> {
        let key = Value::new(key.as_ref()).raw();
        let data = value.map(|v| Value::new(v).raw());
        let mut call = Del {
            txn: self.raw()?,
            dbi: table.dbi,
            key: &key,
            data: data.as_ref().map_or(ptr::null(), |d| d as *const _),
            status: 0,
        };
        self.touch();
        unsafe { bridge::invoke(&mut call) };
        match call.status {
            MDBX_SUCCESS => Ok(true),
            MDBX_NOTFOUND => Ok(false),
            status => Err(Error::from(status)),
        }
    }

    /// Empty a table, or delete it and close its handle when `delete` is set
    pub fn drop_table(&self, table: Table, delete: bool) -> Result<()> {
        let mut call = TableDrop {
            txn: self.raw()?,
            dbi: table.dbi,
            del: delete,
            status: 0,
        };
        self.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    /// Store the x, y and z markers; the engine stamps `v` on commit.
    pub fn put_canary(&self, canary: &Canary) -> Result<()> {
        let mut call = CanaryPut {
            txn: self.raw()?,
            canary: canary as *const Canary as *const ffi::MDBX_canary,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }
}

impl<K: TransactionKind> Drop for Transaction<'_, K> {
    fn drop(&mut self) {
        debug!("aborting unfinished transaction");
        let mut call = TxnAbort {
            txn: self.txn,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        if call.status != MDBX_SUCCESS {
            warn!("implicit abort failed: {}", Error::from(call.status));
        }
    }
}
