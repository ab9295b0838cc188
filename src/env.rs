use lazy_static::lazy_static;
use log::{debug, warn};
use std::ffi::{CStr, CString, OsStr};
use std::mem::{self, size_of};
use std::os::raw::{c_char, c_int, c_uint};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::bridge::{self, *};
use crate::constants::{CopyFlags, DbFlags, EnvFlags, TransactionFlags, MDBX_BUSY, MDBX_RESULT_TRUE};
use crate::diagnostics;
use crate::error::{Error, IntoResult, Result};
use crate::ffi;
use crate::layout;
use crate::transaction::{Transaction, RO, RW};
use crate::types::{
    from_16dot16, DeleteMode, EnvInfo, EnvOption, Geometry, GeometryInfo, Stat, Table,
};

lazy_static! {
    static ref CHANGEABLE: EnvFlags = EnvFlags::SYNC_TIER
        | EnvFlags::NOMEMINIT
        | EnvFlags::COALESCE
        | EnvFlags::PAGEPERTURB
        | EnvFlags::VALIDATION;
}

#[derive(Debug, Default)]
struct Lifecycle {
    opened_at: Option<SystemTime>,
    closed_at: Option<SystemTime>,
}

/// An MDBX environment: one data file, its lock file and the memory map.
///
/// Created unopened by [`Environment::create`], configured, then bound to a
/// path with [`Environment::open`]. Transactions borrow the environment, so
/// [`Environment::close`] can only run once all of them have ended.
#[derive(Debug)]
pub struct Environment {
    handle: *mut ffi::MDBX_env,
    lifecycle: Mutex<Lifecycle>,
}

// SAFETY: the engine synchronizes access to an environment internally, the
// handle itself is only replaced under `&mut self`
unsafe impl Send for Environment {}
unsafe impl Sync for Environment {}

pub(crate) fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidArgument("path contains a NUL byte"))
}

impl Environment {
    /// Allocate a fresh, unopened environment
    pub fn create() -> Result<Environment> {
        layout::ensure()?;
        diagnostics::ensure();

        let mut handle = ptr::null_mut();
        let mut call = EnvCreate {
            env: &mut handle,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;

        Ok(Environment {
            handle,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    pub(crate) fn handle(&self) -> Result<*mut ffi::MDBX_env> {
        if self.handle.is_null() {
            Err(Error::EnvClosed)
        } else {
            Ok(self.handle)
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the environment at `path`.
    ///
    /// A second call on an already open environment does nothing. At most one
    /// durability tier (`NOMETASYNC`, `SAFE_NOSYNC`, `UTTERLY_NOSYNC`) may be
    /// selected.
    pub fn open<P: AsRef<Path>>(&self, path: P, flags: EnvFlags, mode: u32) -> Result<()> {
        let env = self.handle()?;
        let mut lifecycle = self.lifecycle();
        if lifecycle.opened_at.is_some() {
            return Ok(());
        }

        let tier = flags & EnvFlags::SYNC_TIER;
        if !(tier.is_empty()
            || tier == EnvFlags::NOMETASYNC
            || tier == EnvFlags::SAFE_NOSYNC
            || tier == EnvFlags::UTTERLY_NOSYNC)
        {
            return Err(Error::InvalidArgument("more than one sync mode selected"));
        }

        let path = path.as_ref();
        let c_path = path_to_cstring(path)?;
        let mut call = EnvOpen {
            env,
            path: c_path.as_ptr(),
            flags: flags.bits(),
            mode,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;

        lifecycle.opened_at = Some(SystemTime::now());
        debug!("opened environment at {} with {:?}", path.display(), flags);
        Ok(())
    }

    /// Close the environment, optionally skipping the final sync.
    ///
    /// Closing twice is a no-op. Once closed every operation fails with
    /// [`Error::EnvClosed`].
    pub fn close(&mut self, dont_sync: bool) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let mut call = EnvClose {
            env: self.handle,
            dont_sync,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        if call.status == MDBX_BUSY {
            warn!("environment close refused, a transaction is still running");
            return Err(Error::Busy);
        }

        self.handle = ptr::null_mut();
        self.lifecycle().closed_at = Some(SystemTime::now());

        let result = match call.status {
            MDBX_RESULT_TRUE => Ok(()),
            status => status.into_result(),
        };
        match result {
            Ok(()) => debug!("closed environment"),
            Err(err) => warn!("environment closed with error: {}", err),
        }
        result
    }

    pub fn is_open(&self) -> bool {
        !self.handle.is_null() && self.lifecycle().opened_at.is_some()
    }

    pub fn opened_at(&self) -> Option<SystemTime> {
        self.lifecycle().opened_at
    }

    pub fn closed_at(&self) -> Option<SystemTime> {
        self.lifecycle().closed_at
    }

    /// Set the memory map geometry. Fields left at `-1` keep their current
    /// value.
    pub fn set_geometry(&self, geometry: Geometry) -> Result<()> {
        let mut call = EnvSetGeometry {
            env: self.handle()?,
            size_lower: geometry.size_lower,
            size_now: geometry.size_now,
            size_upper: geometry.size_upper,
            growth_step: geometry.growth_step,
            shrink_threshold: geometry.shrink_threshold,
            page_size: geometry.page_size,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    pub fn set_option(&self, option: EnvOption, value: u64) -> Result<()> {
        let mut call = EnvSetOption {
            env: self.handle()?,
            option: option as u32,
            value,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    pub fn option(&self, option: EnvOption) -> Result<u64> {
        let mut value = 0u64;
        let mut call = EnvGetOption {
            env: self.handle()?,
            option: option as u32,
            value: &mut value,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(value)
    }

    /// Interval of the automatic background sync
    pub fn sync_period(&self) -> Result<Duration> {
        let raw = self.option(EnvOption::SyncPeriod)?;
        Ok(from_16dot16(u32::try_from(raw).unwrap_or(u32::MAX)))
    }

    pub fn set_sync_period(&self, period: Duration) -> Result<()> {
        let raw = (period.as_nanos() << 16) / 1_000_000_000;
        self.set_option(EnvOption::SyncPeriod, u64::try_from(raw).unwrap_or(u64::MAX))
    }

    /// Turn runtime-changeable flags on or off
    pub fn set_flags(&self, flags: EnvFlags, on: bool) -> Result<()> {
        if !CHANGEABLE.contains(flags) {
            return Err(Error::InvalidArgument("flag cannot be changed after open"));
        }
        let mut call = EnvSetFlags {
            env: self.handle()?,
            flags: flags.bits(),
            onoff: on,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    pub fn flags(&self) -> Result<EnvFlags> {
        let mut flags: c_uint = 0;
        let mut call = EnvGetFlags {
            env: self.handle()?,
            flags: &mut flags,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(EnvFlags::from_bits_retain(flags as u32))
    }

    /// Flush buffers to disk. Returns `false` when there was nothing to flush.
    pub fn sync(&self, force: bool, nonblock: bool) -> Result<bool> {
        let mut call = EnvSync {
            env: self.handle()?,
            force,
            nonblock,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match().map(|nothing| !nothing)
    }

    /// Copy the environment to `dest`, optionally compacting it
    pub fn copy<P: AsRef<Path>>(&self, dest: P, flags: CopyFlags) -> Result<()> {
        let dest = path_to_cstring(dest.as_ref())?;
        let mut call = EnvCopy {
            env: self.handle()?,
            dest: dest.as_ptr(),
            flags: flags.bits(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    /// Delete the files of an environment that is not open in this process.
    ///
    /// Returns `false` when there was nothing to delete.
    pub fn delete<P: AsRef<Path>>(path: P, mode: DeleteMode) -> Result<bool> {
        let path = path_to_cstring(path.as_ref())?;
        let mut call = EnvDelete {
            path: path.as_ptr(),
            mode: mode as u32,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match().map(|missing| !missing)
    }

    pub fn info(&self) -> Result<EnvInfo> {
        self.info_within(ptr::null_mut())
    }

    pub(crate) fn info_within(&self, txn: *mut ffi::MDBX_txn) -> Result<EnvInfo> {
        // SAFETY: plain-old-data structure, all-zero is a valid value
        let mut raw: ffi::MDBX_envinfo = unsafe { mem::zeroed() };
        let mut call = bridge::EnvInfo {
            env: self.handle()?,
            txn,
            info: &mut raw,
            size: size_of::<ffi::MDBX_envinfo>(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;

        Ok(EnvInfo {
            geometry: GeometryInfo {
                lower: raw.mi_geo.lower as u64,
                upper: raw.mi_geo.upper as u64,
                current: raw.mi_geo.current as u64,
                shrink: raw.mi_geo.shrink as u64,
                grow: raw.mi_geo.grow as u64,
            },
            map_size: raw.mi_mapsize as u64,
            last_pgno: raw.mi_last_pgno as u64,
            recent_txnid: raw.mi_recent_txnid as u64,
            latter_reader_txnid: raw.mi_latter_reader_txnid as u64,
            max_readers: raw.mi_maxreaders as u32,
            num_readers: raw.mi_numreaders as u32,
            page_size: raw.mi_dxb_pagesize as u32,
            sys_page_size: raw.mi_sys_pagesize as u32,
            unsync_volume: raw.mi_unsync_volume as u64,
            autosync_threshold: raw.mi_autosync_threshold as u64,
        })
    }

    /// Statistics of the main table
    pub fn stat(&self) -> Result<Stat> {
        let mut stat = Stat::default();
        let mut call = EnvStat {
            env: self.handle()?,
            txn: ptr::null_mut(),
            stat: &mut stat as *mut Stat as *mut ffi::MDBX_stat,
            size: size_of::<Stat>(),
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(stat)
    }

    pub fn path(&self) -> Result<PathBuf> {
        let mut raw: *const c_char = ptr::null();
        let mut call = EnvGetPath {
            env: self.handle()?,
            path: &mut raw,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        if raw.is_null() {
            return Err(Error::InvalidArgument("environment is not open"));
        }
        // SAFETY: NUL-terminated string owned by the environment
        let bytes = unsafe { CStr::from_ptr(raw) }.to_bytes();
        Ok(PathBuf::from(OsStr::from_bytes(bytes)))
    }

    /// File descriptor of the data file
    pub fn fd(&self) -> Result<RawFd> {
        let mut fd: ffi::mdbx_filehandle_t = -1;
        let mut call = EnvGetFd {
            env: self.handle()?,
            fd: &mut fd,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(fd as RawFd)
    }

    /// Largest key accepted by a table with `flags`
    pub fn max_key_size(&self, flags: DbFlags) -> Result<usize> {
        let mut call = EnvMaxKeySize {
            env: self.handle()?,
            flags: flags.bits(),
            size: -1,
        };
        unsafe { bridge::invoke(&mut call) };
        usize::try_from(call.size).map_err(|_| Error::InvalidArgument("unsupported table flags"))
    }

    /// Largest value accepted by a table with `flags`
    pub fn max_value_size(&self, flags: DbFlags) -> Result<usize> {
        let mut call = EnvMaxValSize {
            env: self.handle()?,
            flags: flags.bits(),
            size: -1,
        };
        unsafe { bridge::invoke(&mut call) };
        usize::try_from(call.size).map_err(|_| Error::InvalidArgument("unsupported table flags"))
    }

    /// Clear reader slots left by dead processes, returning how many
    pub fn reader_check(&self) -> Result<usize> {
        let mut dead: c_int = 0;
        let mut call = ReaderCheck {
            env: self.handle()?,
            dead: &mut dead,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match()?;
        Ok(dead.max(0) as usize)
    }

    /// Release a table handle. Rarely needed, handles are shared and cheap.
    pub fn close_table(&self, table: Table) -> Result<()> {
        let mut call = DbiClose {
            env: self.handle()?,
            dbi: table.dbi,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    pub fn begin_ro_txn(&self) -> Result<Transaction<'_, RO>> {
        Transaction::begin(self, ptr::null_mut(), TransactionFlags::RDONLY)
    }

    /// Begin a write transaction, waiting for the writer slot if taken
    pub fn begin_rw_txn(&self) -> Result<Transaction<'_, RW>> {
        Transaction::begin(self, ptr::null_mut(), TransactionFlags::READWRITE)
    }

    /// Begin a write transaction, or fail with [`Error::Busy`] if another one
    /// is running
    pub fn try_begin_rw_txn(&self) -> Result<Transaction<'_, RW>> {
        Transaction::begin(self, ptr::null_mut(), TransactionFlags::TRY)
    }

    /// Begin a read-only transaction. With `RDONLY_PREPARE` the transaction
    /// starts reset and must be renewed before use.
    pub fn begin_ro_txn_with(&self, flags: TransactionFlags) -> Result<Transaction<'_, RO>> {
        if !(TransactionFlags::RDONLY_PREPARE).contains(flags) {
            return Err(Error::InvalidArgument("write flags on a read-only transaction"));
        }
        Transaction::begin(self, ptr::null_mut(), flags | TransactionFlags::RDONLY)
    }

    pub fn begin_rw_txn_with(&self, flags: TransactionFlags) -> Result<Transaction<'_, RW>> {
        if flags.intersects(TransactionFlags::RDONLY_PREPARE) {
            return Err(Error::InvalidArgument("read-only flags on a write transaction"));
        }
        Transaction::begin(self, ptr::null_mut(), flags)
    }
}

macro_rules! tunables {
    ($($(#[$meta:meta])* $get:ident / $set:ident => $option:ident;)*) => {
        impl Environment {$(
            $(#[$meta])*
            pub fn $get(&self) -> Result<u64> {
                self.option(EnvOption::$option)
            }

            $(#[$meta])*
            pub fn $set(&self, value: u64) -> Result<()> {
                self.set_option(EnvOption::$option, value)
            }
        )*}
    };
}

tunables! {
    /// Maximum number of named tables, settable before open only
    max_tables / set_max_tables => MaxDb;
    /// Maximum number of reader slots, settable before open only
    max_readers / set_max_readers => MaxReaders;
    /// Unsynced volume in bytes that triggers an automatic sync
    sync_bytes / set_sync_bytes => SyncBytes;
    /// Dirty page limit of a write transaction
    txn_dp_limit / set_txn_dp_limit => TxnDpLimit;
    txn_dp_initial / set_txn_dp_initial => TxnDpInitial;
    rp_augment_limit / set_rp_augment_limit => RpAugmentLimit;
    loose_limit / set_loose_limit => LooseLimit;
    dp_reserve_limit / set_dp_reserve_limit => DpReserveLimit;
    spill_max_denominator / set_spill_max_denominator => SpillMaxDenominator;
    spill_min_denominator / set_spill_min_denominator => SpillMinDenominator;
    spill_parent4child_denominator / set_spill_parent4child_denominator => SpillParent4ChildDenominator;
    merge_threshold_16dot16_percent / set_merge_threshold_16dot16_percent => MergeThreshold16Dot16Percent;
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(err) = self.close(false) {
            warn!("failed to close environment on drop: {}", err);
        }
    }
}
