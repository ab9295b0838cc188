use bitflags::bitflags;
use std::os::raw::c_int;

use crate::ffi;

// Environment flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnvFlags: u32 {
        /// Extra validation of DB structure and pages content
        const VALIDATION = ffi::MDBX_VALIDATION as u32;
        /// No environment directory, the path names the data file itself
        const NOSUBDIR = ffi::MDBX_NOSUBDIR as u32;
        /// Read only mode
        const RDONLY = ffi::MDBX_RDONLY as u32;
        /// Open in exclusive/monopolistic mode
        const EXCLUSIVE = ffi::MDBX_EXCLUSIVE as u32;
        /// Use the geometry and flags of an already opened environment
        const ACCEDE = ffi::MDBX_ACCEDE as u32;
        /// Map data into memory with write permission
        const WRITEMAP = ffi::MDBX_WRITEMAP as u32;
        /// Do not tie reader locktable slots to threads
        const NOTLS = ffi::MDBX_NOTLS as u32;
        /// Don't do readahead
        const NORDAHEAD = ffi::MDBX_NORDAHEAD as u32;
        /// Don't initialize malloc'ed memory before writing to datafile
        const NOMEMINIT = ffi::MDBX_NOMEMINIT as u32;
        /// Aims to coalesce a garbage collection items
        const COALESCE = ffi::MDBX_COALESCE as u32;
        /// LIFO policy for recycling garbage collection items
        const LIFORECLAIM = ffi::MDBX_LIFORECLAIM as u32;
        /// Debugging option, fill/perturb released pages
        const PAGEPERTURB = ffi::MDBX_PAGEPERTURB as u32;
        /// Default robust and durable sync mode
        const SYNC_DURABLE = ffi::MDBX_SYNC_DURABLE as u32;
        /// Don't sync the meta-page after commit
        const NOMETASYNC = ffi::MDBX_NOMETASYNC as u32;
        /// Don't sync anything but keep previous steady commits
        const SAFE_NOSYNC = ffi::MDBX_SAFE_NOSYNC as u32;
        /// Don't sync anything and wipe previous steady commits
        const UTTERLY_NOSYNC = ffi::MDBX_UTTERLY_NOSYNC as u32;
    }
}

impl EnvFlags {
    /// Flags forming the durability tier, only one tier may be selected.
    pub const SYNC_TIER: EnvFlags = EnvFlags::NOMETASYNC
        .union(EnvFlags::SAFE_NOSYNC)
        .union(EnvFlags::UTTERLY_NOSYNC);
}

// Table (named database) flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DbFlags: u32 {
        /// Use reverse string comparison for keys
        const REVERSEKEY = ffi::MDBX_REVERSEKEY as u32;
        /// Use sorted duplicates, i.e. allow multi-values for a key
        const DUPSORT = ffi::MDBX_DUPSORT as u32;
        /// Numeric keys in native byte order, 4 or 8 bytes wide
        const INTEGERKEY = ffi::MDBX_INTEGERKEY as u32;
        /// With DUPSORT, sorted dup items have fixed size
        const DUPFIXED = ffi::MDBX_DUPFIXED as u32;
        /// With DUPSORT and DUPFIXED, dups are fixed size integers
        const INTEGERDUP = ffi::MDBX_INTEGERDUP as u32;
        /// With DUPSORT, use reverse string comparison for data
        const REVERSEDUP = ffi::MDBX_REVERSEDUP as u32;
        /// Create the table if not already existing
        const CREATE = ffi::MDBX_CREATE as u32;
        /// Open with the flags the table already has
        const ACCEDE = ffi::MDBX_DB_ACCEDE as u32;
    }
}

// Write operation flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteFlags: u32 {
        /// Upsertion by default
        const UPSERT = ffi::MDBX_UPSERT as u32;
        /// For insertion: don't write if the key already exists
        const NOOVERWRITE = ffi::MDBX_NOOVERWRITE as u32;
        /// Only for DUPSORT: don't write if the key-value pair already exists
        const NODUPDATA = ffi::MDBX_NODUPDATA as u32;
        /// Overwrite the current key/data pair, the key must exist
        const CURRENT = ffi::MDBX_CURRENT as u32;
        /// Only for DUPSORT: replace or delete all values of the key
        const ALLDUPS = ffi::MDBX_ALLDUPS as u32;
        /// Just reserve space for data, don't copy it
        const RESERVE = ffi::MDBX_RESERVE as u32;
        /// Data is being appended, keys must arrive in order
        const APPEND = ffi::MDBX_APPEND as u32;
        /// Only for DUPSORT: duplicate data is being appended
        const APPENDDUP = ffi::MDBX_APPENDDUP as u32;
        /// Only for DUPFIXED: store multiple data items in one call
        const MULTIPLE = ffi::MDBX_MULTIPLE as u32;
    }
}

// Transaction flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransactionFlags: u32 {
        /// Start read-write transaction
        const READWRITE = ffi::MDBX_TXN_READWRITE as u32;
        /// Start read-only transaction
        const RDONLY = ffi::MDBX_TXN_RDONLY as u32;
        /// Prepare but not start a read-only transaction
        const RDONLY_PREPARE = ffi::MDBX_TXN_RDONLY_PREPARE as u32;
        /// Do not block when starting a write transaction
        const TRY = ffi::MDBX_TXN_TRY as u32;
        /// Exactly the same as NOMETASYNC, but for this transaction only
        const NOMETASYNC = ffi::MDBX_TXN_NOMETASYNC as u32;
        /// Exactly the same as SAFE_NOSYNC, but for this transaction only
        const NOSYNC = ffi::MDBX_TXN_NOSYNC as u32;
    }
}

// Copy operation flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CopyFlags: u32 {
        /// Compact while copying, omitting free space
        const COMPACT = ffi::MDBX_CP_COMPACT as u32;
        /// Force dynamic size for the copy
        const FORCE_DYNAMIC_SIZE = ffi::MDBX_CP_FORCE_DYNAMIC_SIZE as u32;
    }
}

// State of a table handle within a transaction
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DbiState: u32 {
        /// Table was written in this txn
        const DIRTY = ffi::MDBX_DBI_DIRTY as u32;
        /// Named table record is older than the txn
        const STALE = ffi::MDBX_DBI_STALE as u32;
        /// Named table handle opened in this txn
        const FRESH = ffi::MDBX_DBI_FRESH as u32;
        /// Named table handle created in this txn
        const CREAT = ffi::MDBX_DBI_CREAT as u32;
    }
}

/// Largest number of named tables
pub const MAX_DBI: u32 = ffi::MDBX_MAX_DBI as u32;
/// Largest size of a single value
pub const MAX_DATA_SIZE: u32 = ffi::MDBX_MAXDATASIZE as u32;
/// Smallest supported page size
pub const MIN_PAGE_SIZE: usize = ffi::MDBX_MIN_PAGESIZE as usize;
/// Largest supported page size
pub const MAX_PAGE_SIZE: usize = ffi::MDBX_MAX_PAGESIZE as usize;

// Engine status codes
pub(crate) const MDBX_SUCCESS: c_int = ffi::MDBX_SUCCESS as c_int;
pub(crate) const MDBX_RESULT_TRUE: c_int = ffi::MDBX_RESULT_TRUE as c_int;
pub(crate) const MDBX_KEYEXIST: c_int = ffi::MDBX_KEYEXIST as c_int;
pub(crate) const MDBX_NOTFOUND: c_int = ffi::MDBX_NOTFOUND as c_int;
pub(crate) const MDBX_PAGE_NOTFOUND: c_int = ffi::MDBX_PAGE_NOTFOUND as c_int;
pub(crate) const MDBX_CORRUPTED: c_int = ffi::MDBX_CORRUPTED as c_int;
pub(crate) const MDBX_PANIC: c_int = ffi::MDBX_PANIC as c_int;
pub(crate) const MDBX_VERSION_MISMATCH: c_int = ffi::MDBX_VERSION_MISMATCH as c_int;
pub(crate) const MDBX_INVALID: c_int = ffi::MDBX_INVALID as c_int;
pub(crate) const MDBX_MAP_FULL: c_int = ffi::MDBX_MAP_FULL as c_int;
pub(crate) const MDBX_DBS_FULL: c_int = ffi::MDBX_DBS_FULL as c_int;
pub(crate) const MDBX_READERS_FULL: c_int = ffi::MDBX_READERS_FULL as c_int;
pub(crate) const MDBX_TXN_FULL: c_int = ffi::MDBX_TXN_FULL as c_int;
pub(crate) const MDBX_CURSOR_FULL: c_int = ffi::MDBX_CURSOR_FULL as c_int;
pub(crate) const MDBX_PAGE_FULL: c_int = ffi::MDBX_PAGE_FULL as c_int;
pub(crate) const MDBX_UNABLE_EXTEND_MAPSIZE: c_int = ffi::MDBX_UNABLE_EXTEND_MAPSIZE as c_int;
pub(crate) const MDBX_INCOMPATIBLE: c_int = ffi::MDBX_INCOMPATIBLE as c_int;
pub(crate) const MDBX_BAD_RSLOT: c_int = ffi::MDBX_BAD_RSLOT as c_int;
pub(crate) const MDBX_BAD_TXN: c_int = ffi::MDBX_BAD_TXN as c_int;
pub(crate) const MDBX_BAD_VALSIZE: c_int = ffi::MDBX_BAD_VALSIZE as c_int;
pub(crate) const MDBX_BAD_DBI: c_int = ffi::MDBX_BAD_DBI as c_int;
pub(crate) const MDBX_PROBLEM: c_int = ffi::MDBX_PROBLEM as c_int;
pub(crate) const MDBX_BUSY: c_int = ffi::MDBX_BUSY as c_int;
pub(crate) const MDBX_EMULTIVAL: c_int = ffi::MDBX_EMULTIVAL as c_int;
pub(crate) const MDBX_EBADSIGN: c_int = ffi::MDBX_EBADSIGN as c_int;
pub(crate) const MDBX_WANNA_RECOVERY: c_int = ffi::MDBX_WANNA_RECOVERY as c_int;
pub(crate) const MDBX_EKEYMISMATCH: c_int = ffi::MDBX_EKEYMISMATCH as c_int;
pub(crate) const MDBX_TOO_LARGE: c_int = ffi::MDBX_TOO_LARGE as c_int;
pub(crate) const MDBX_THREAD_MISMATCH: c_int = ffi::MDBX_THREAD_MISMATCH as c_int;
pub(crate) const MDBX_TXN_OVERLAPPING: c_int = ffi::MDBX_TXN_OVERLAPPING as c_int;

// System error numbers the engine passes through
pub(crate) const MDBX_EINVAL: c_int = ffi::MDBX_EINVAL as c_int;
pub(crate) const MDBX_ENOMEM: c_int = ffi::MDBX_ENOMEM as c_int;

/// Default file mode for newly created environment files
pub const DEFAULT_MODE: u32 = 0o664;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_values() {
        assert_eq!(MDBX_RESULT_TRUE, -1);
        assert_eq!(MDBX_NOTFOUND, -30798);
        assert!(EnvFlags::UTTERLY_NOSYNC.contains(EnvFlags::SAFE_NOSYNC));
        assert!(TransactionFlags::RDONLY_PREPARE.contains(TransactionFlags::RDONLY));
        assert!(TransactionFlags::READWRITE.is_empty());
        assert_eq!(MAX_PAGE_SIZE, 65536);
    }
}
