use std::time::Duration;

use crate::ffi;

/// Cursor positioning operations
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorOp {
    /// Position at first key/data item
    First = ffi::MDBX_FIRST as u32,
    /// Position at first data item of current key (DUPSORT)
    FirstDup = ffi::MDBX_FIRST_DUP as u32,
    /// Position at key/data pair (DUPSORT)
    GetBoth = ffi::MDBX_GET_BOTH as u32,
    /// Position at key, nearest data (DUPSORT)
    GetBothRange = ffi::MDBX_GET_BOTH_RANGE as u32,
    /// Return key/data at current cursor position
    GetCurrent = ffi::MDBX_GET_CURRENT as u32,
    /// Return up to a page of duplicate data items from current position (DUPFIXED)
    GetMultiple = ffi::MDBX_GET_MULTIPLE as u32,
    /// Position at last key/data item
    Last = ffi::MDBX_LAST as u32,
    /// Position at last data item of current key (DUPSORT)
    LastDup = ffi::MDBX_LAST_DUP as u32,
    /// Position at next data item
    Next = ffi::MDBX_NEXT as u32,
    /// Position at next data item of current key (DUPSORT)
    NextDup = ffi::MDBX_NEXT_DUP as u32,
    /// Return up to a page of duplicate data items from next position (DUPFIXED)
    NextMultiple = ffi::MDBX_NEXT_MULTIPLE as u32,
    /// Position at first data item of next key
    NextNoDup = ffi::MDBX_NEXT_NODUP as u32,
    /// Position at previous data item
    Prev = ffi::MDBX_PREV as u32,
    /// Position at previous data item of current key (DUPSORT)
    PrevDup = ffi::MDBX_PREV_DUP as u32,
    /// Position at last data item of previous key
    PrevNoDup = ffi::MDBX_PREV_NODUP as u32,
    /// Position at specified key
    Set = ffi::MDBX_SET as u32,
    /// Position at specified key, return both key and data
    SetKey = ffi::MDBX_SET_KEY as u32,
    /// Position at first key greater than or equal to specified key
    SetRange = ffi::MDBX_SET_RANGE as u32,
    /// Return up to a page of duplicate data items from previous position (DUPFIXED)
    PrevMultiple = ffi::MDBX_PREV_MULTIPLE as u32,
    /// Position at first pair greater than or equal to the given key and data
    SetLowerBound = ffi::MDBX_SET_LOWERBOUND as u32,
    /// Position at first pair greater than the given key and data
    SetUpperBound = ffi::MDBX_SET_UPPERBOUND as u32,
}

impl CursorOp {
    /// Whether the operation reads a caller supplied key
    pub fn takes_key(self) -> bool {
        matches!(
            self,
            CursorOp::GetBoth
                | CursorOp::GetBothRange
                | CursorOp::Set
                | CursorOp::SetKey
                | CursorOp::SetRange
                | CursorOp::SetLowerBound
                | CursorOp::SetUpperBound
        )
    }
}

/// Outcome of a search that may land on the requested key or past it.
///
/// The engine reports an inexact hit through a distinct success code; this
/// makes the three cases explicit instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Positioned on exactly the requested item
    Exact(T),
    /// Positioned on the next greater item
    Next(T),
    /// Nothing at or after the requested item
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_exact(&self) -> bool {
        matches!(self, Lookup::Exact(_))
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }

    /// The located item, exact or not
    pub fn into_inner(self) -> Option<T> {
        match self {
            Lookup::Exact(v) | Lookup::Next(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Exact(v) => Lookup::Exact(f(v)),
            Lookup::Next(v) => Lookup::Next(f(v)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

/// Handle to a table (named or unnamed sub-database).
///
/// A plain integer shared by every transaction of the environment once the
/// transaction that created it has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    pub(crate) dbi: u32,
}

impl Table {
    /// The main, unnamed table
    pub const MAIN: Table = Table { dbi: 1 };

    pub fn dbi(&self) -> u32 {
        self.dbi
    }
}

/// Table statistics
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub page_size: u32,
    pub depth: u32,
    pub branch_pages: u64,
    pub leaf_pages: u64,
    pub overflow_pages: u64,
    pub entries: u64,
    /// Txnid of the last committed modification
    pub mod_txnid: u64,
}

/// Transaction information
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnInfo {
    pub id: u64,
    /// For readers, how far the snapshot lags behind the latest commit
    pub reader_lag: u64,
    pub space_used: u64,
    pub space_limit_soft: u64,
    pub space_limit_hard: u64,
    pub space_retired: u64,
    pub space_leftover: u64,
    pub space_dirty: u64,
}

/// Four application-defined markers stored alongside each commit
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Canary {
    pub x: u64,
    pub y: u64,
    pub z: u64,
    /// Set by the engine to the id of the transaction that wrote the canary
    pub v: u64,
}

/// Map geometry as currently in effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryInfo {
    pub lower: u64,
    pub upper: u64,
    pub current: u64,
    pub shrink: u64,
    pub grow: u64,
}

/// Environment information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvInfo {
    pub geometry: GeometryInfo,
    pub map_size: u64,
    pub last_pgno: u64,
    pub recent_txnid: u64,
    pub latter_reader_txnid: u64,
    pub max_readers: u32,
    pub num_readers: u32,
    pub page_size: u32,
    pub sys_page_size: u32,
    pub unsync_volume: u64,
    pub autosync_threshold: u64,
}

/// Size bounds of the memory map. `-1` keeps the engine's current or default
/// value for that parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub size_lower: isize,
    pub size_now: isize,
    pub size_upper: isize,
    pub growth_step: isize,
    pub shrink_threshold: isize,
    pub page_size: isize,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            size_lower: -1,
            size_now: -1,
            size_upper: -1,
            growth_step: -1,
            shrink_threshold: -1,
            page_size: -1,
        }
    }
}

/// Runtime tunables of an environment
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvOption {
    /// Maximum number of named tables, before open only
    MaxDb = ffi::MDBX_opt_max_db as u32,
    /// Maximum number of reader slots, before open only
    MaxReaders = ffi::MDBX_opt_max_readers as u32,
    /// Unsynced bytes that trigger an automatic sync
    SyncBytes = ffi::MDBX_opt_sync_bytes as u32,
    /// Interval for automatic sync, 16.16 fixed-point seconds
    SyncPeriod = ffi::MDBX_opt_sync_period as u32,
    RpAugmentLimit = ffi::MDBX_opt_rp_augment_limit as u32,
    LooseLimit = ffi::MDBX_opt_loose_limit as u32,
    DpReserveLimit = ffi::MDBX_opt_dp_reserve_limit as u32,
    /// Dirty page limit of a write transaction
    TxnDpLimit = ffi::MDBX_opt_txn_dp_limit as u32,
    TxnDpInitial = ffi::MDBX_opt_txn_dp_initial as u32,
    SpillMaxDenominator = ffi::MDBX_opt_spill_max_denominator as u32,
    SpillMinDenominator = ffi::MDBX_opt_spill_min_denominator as u32,
    SpillParent4ChildDenominator = ffi::MDBX_opt_spill_parent4child_denominator as u32,
    MergeThreshold16Dot16Percent = ffi::MDBX_opt_merge_threshold_16dot16_percent as u32,
}

/// How `Environment::delete` treats an environment still in use
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeleteMode {
    /// Delete without checking for other users
    #[default]
    JustDelete = ffi::MDBX_ENV_JUST_DELETE as u32,
    /// Fail with `Busy` if another process uses the environment
    EnsureUnused = ffi::MDBX_ENV_ENSURE_UNUSED as u32,
    /// Wait until no other process uses the environment
    WaitForUnused = ffi::MDBX_ENV_WAIT_FOR_UNUSED as u32,
}

/// Durations of the commit stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitLatency {
    pub preparation: Duration,
    pub gc: Duration,
    pub audit: Duration,
    pub write: Duration,
    pub sync: Duration,
    pub ending: Duration,
    pub whole: Duration,
}

/// Converts 16.16 fixed-point seconds to a `Duration`.
pub(crate) fn from_16dot16(value: u32) -> Duration {
    Duration::from_nanos((u64::from(value) * 1_000_000_000) >> 16)
}
