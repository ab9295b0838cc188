use std::ffi::CStr;
use std::io;
use std::os::raw::c_int;
use std::result;

use thiserror::Error;

use crate::bridge::{self, Strerror};
use crate::constants::*;

/// Custom result type for MDBX operations
pub type Result<T> = result::Result<T, Error>;

/// MDBX error codes, plus the misuse the binding detects on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Key/data pair already exists
    #[error("{}", describe_or_code(MDBX_KEYEXIST))]
    KeyExist,
    /// No matching key/data pair found
    #[error("{}", describe_or_code(MDBX_NOTFOUND))]
    NotFound,
    /// Requested page not found, usually indicates corruption
    #[error("{}", describe_or_code(MDBX_PAGE_NOTFOUND))]
    PageNotFound,
    /// Database is corrupted
    #[error("{}", describe_or_code(MDBX_CORRUPTED))]
    Corrupted,
    /// Environment had a fatal error and must be shut down
    #[error("{}", describe_or_code(MDBX_PANIC))]
    Panic,
    /// Database file version mismatch with the engine
    #[error("{}", describe_or_code(MDBX_VERSION_MISMATCH))]
    VersionMismatch,
    /// File is not a valid MDBX file
    #[error("{}", describe_or_code(MDBX_INVALID))]
    Invalid,
    /// Environment mapsize reached
    #[error("{}", describe_or_code(MDBX_MAP_FULL))]
    MapFull,
    /// Environment maxdbs reached
    #[error("{}", describe_or_code(MDBX_DBS_FULL))]
    DbsFull,
    /// Environment maxreaders reached
    #[error("{}", describe_or_code(MDBX_READERS_FULL))]
    ReadersFull,
    /// Transaction has too many dirty pages
    #[error("{}", describe_or_code(MDBX_TXN_FULL))]
    TxnFull,
    /// Cursor stack too deep
    #[error("{}", describe_or_code(MDBX_CURSOR_FULL))]
    CursorFull,
    /// Page has not enough space
    #[error("{}", describe_or_code(MDBX_PAGE_FULL))]
    PageFull,
    /// Engine was unable to extend the mapping
    #[error("{}", describe_or_code(MDBX_UNABLE_EXTEND_MAPSIZE))]
    UnableExtendMapSize,
    /// Table or environment incompatible with the requested operation or flags
    #[error("{}", describe_or_code(MDBX_INCOMPATIBLE))]
    Incompatible,
    /// Invalid reuse of reader locktable slot
    #[error("{}", describe_or_code(MDBX_BAD_RSLOT))]
    BadRslot,
    /// Transaction is not valid for the requested operation
    #[error("{}", describe_or_code(MDBX_BAD_TXN))]
    BadTxn,
    /// Invalid size or alignment of key or data
    #[error("{}", describe_or_code(MDBX_BAD_VALSIZE))]
    BadValSize,
    /// The table handle is invalid or was changed by another transaction
    #[error("{}", describe_or_code(MDBX_BAD_DBI))]
    BadDbi,
    /// Unexpected internal error, the transaction should be aborted
    #[error("{}", describe_or_code(MDBX_PROBLEM))]
    Problem,
    /// Another write transaction is running, or the environment is exclusively used
    #[error("{}", describe_or_code(MDBX_BUSY))]
    Busy,
    /// The key has more than one associated value
    #[error("{}", describe_or_code(MDBX_EMULTIVAL))]
    MultiVal,
    /// Bad signature of a runtime object, use-after-free or double-free
    #[error("{}", describe_or_code(MDBX_EBADSIGN))]
    BadSign,
    /// Database needs recovery but was opened read-only
    #[error("{}", describe_or_code(MDBX_WANNA_RECOVERY))]
    WannaRecovery,
    /// The given key does not match the cursor position or the append order
    #[error("{}", describe_or_code(MDBX_EKEYMISMATCH))]
    KeyMismatch,
    /// Database is too large for the address space
    #[error("{}", describe_or_code(MDBX_TOO_LARGE))]
    TooLarge,
    /// A thread has used an object it does not own
    #[error("{}", describe_or_code(MDBX_THREAD_MISMATCH))]
    ThreadMismatch,
    /// Overlapping read and write transactions in the current thread
    #[error("{}", describe_or_code(MDBX_TXN_OVERLAPPING))]
    TxnOverlapping,
    /// System error number passed through by the engine
    #[error("{}", describe_code(.0))]
    Os(c_int),
    /// Unknown status code
    #[error("{}", describe_code(.0))]
    Other(c_int),
    /// The environment was closed
    #[error("environment is closed")]
    EnvClosed,
    /// Read-only transaction is reset and must be renewed before use
    #[error("transaction is reset")]
    TxnReset,
    /// Transaction was broken and can only be aborted
    #[error("transaction is broken")]
    TxnBroken,
    /// Argument rejected before reaching the engine
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Caller buffer cannot hold the previous value
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },
    /// Local structure layout differs from the engine's
    #[error("layout of {name} differs from the engine: {local} bytes locally, {native} natively")]
    LayoutMismatch {
        name: &'static str,
        local: usize,
        native: usize,
    },
}

/// Coarse category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key or key/value pair absent
    NotFound,
    /// Key or key/value pair already present
    Exists,
    /// Writer slot held, or exclusive-open contention
    Contention,
    /// Map, table, reader, dirty-page or cursor-stack limits reached
    CapacityExhausted,
    /// Flags or transaction kind do not fit the operation
    Incompatible,
    /// Structure corruption or fatal engine state
    Corruption,
    /// Programmer misuse of handles
    Misuse,
    /// Operating system or resource error
    System,
    /// Anything else
    Other,
}

impl From<c_int> for Error {
    fn from(err: c_int) -> Error {
        match err {
            MDBX_KEYEXIST => Error::KeyExist,
            MDBX_NOTFOUND => Error::NotFound,
            MDBX_PAGE_NOTFOUND => Error::PageNotFound,
            MDBX_CORRUPTED => Error::Corrupted,
            MDBX_PANIC => Error::Panic,
            MDBX_VERSION_MISMATCH => Error::VersionMismatch,
            MDBX_INVALID => Error::Invalid,
            MDBX_MAP_FULL => Error::MapFull,
            MDBX_DBS_FULL => Error::DbsFull,
            MDBX_READERS_FULL => Error::ReadersFull,
            MDBX_TXN_FULL => Error::TxnFull,
            MDBX_CURSOR_FULL => Error::CursorFull,
            MDBX_PAGE_FULL => Error::PageFull,
            MDBX_UNABLE_EXTEND_MAPSIZE => Error::UnableExtendMapSize,
            MDBX_INCOMPATIBLE => Error::Incompatible,
            MDBX_BAD_RSLOT => Error::BadRslot,
            MDBX_BAD_TXN => Error::BadTxn,
            MDBX_BAD_VALSIZE => Error::BadValSize,
            MDBX_BAD_DBI => Error::BadDbi,
            MDBX_PROBLEM => Error::Problem,
            MDBX_BUSY => Error::Busy,
            MDBX_EMULTIVAL => Error::MultiVal,
            MDBX_EBADSIGN => Error::BadSign,
            MDBX_WANNA_RECOVERY => Error::WannaRecovery,
            MDBX_EKEYMISMATCH => Error::KeyMismatch,
            MDBX_TOO_LARGE => Error::TooLarge,
            MDBX_THREAD_MISMATCH => Error::ThreadMismatch,
            MDBX_TXN_OVERLAPPING => Error::TxnOverlapping,
            code if code > 0 => Error::Os(code),
            code => Error::Other(code),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.raw_os_error() {
            Some(code) => Error::Os(code),
            None => Error::Os(MDBX_EINVAL),
        }
    }
}

impl Error {
    /// Native status code of this error
    pub fn code(&self) -> c_int {
        match self {
            Error::KeyExist => MDBX_KEYEXIST,
            Error::NotFound => MDBX_NOTFOUND,
            Error::PageNotFound => MDBX_PAGE_NOTFOUND,
            Error::Corrupted => MDBX_CORRUPTED,
            Error::Panic => MDBX_PANIC,
            Error::VersionMismatch => MDBX_VERSION_MISMATCH,
            Error::Invalid => MDBX_INVALID,
            Error::MapFull => MDBX_MAP_FULL,
            Error::DbsFull => MDBX_DBS_FULL,
            Error::ReadersFull => MDBX_READERS_FULL,
            Error::TxnFull => MDBX_TXN_FULL,
            Error::CursorFull => MDBX_CURSOR_FULL,
            Error::PageFull => MDBX_PAGE_FULL,
            Error::UnableExtendMapSize => MDBX_UNABLE_EXTEND_MAPSIZE,
            Error::Incompatible => MDBX_INCOMPATIBLE,
            Error::BadRslot => MDBX_BAD_RSLOT,
            Error::BadTxn => MDBX_BAD_TXN,
            Error::BadValSize => MDBX_BAD_VALSIZE,
            Error::BadDbi => MDBX_BAD_DBI,
            Error::Problem => MDBX_PROBLEM,
            Error::Busy => MDBX_BUSY,
            Error::MultiVal => MDBX_EMULTIVAL,
            Error::BadSign => MDBX_EBADSIGN,
            Error::WannaRecovery => MDBX_WANNA_RECOVERY,
            Error::KeyMismatch => MDBX_EKEYMISMATCH,
            Error::TooLarge => MDBX_TOO_LARGE,
            Error::ThreadMismatch => MDBX_THREAD_MISMATCH,
            Error::TxnOverlapping => MDBX_TXN_OVERLAPPING,
            Error::Os(code) | Error::Other(code) => *code,
            Error::EnvClosed => MDBX_EBADSIGN,
            Error::TxnReset | Error::TxnBroken => MDBX_BAD_TXN,
            Error::InvalidArgument(_) | Error::LayoutMismatch { .. } => MDBX_EINVAL,
            Error::BufferTooSmall { .. } => MDBX_RESULT_TRUE,
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::KeyExist => ErrorKind::Exists,
            Error::Busy => ErrorKind::Contention,
            Error::MapFull
            | Error::DbsFull
            | Error::ReadersFull
            | Error::TxnFull
            | Error::CursorFull
            | Error::PageFull
            | Error::UnableExtendMapSize
            | Error::TooLarge
            | Error::BufferTooSmall { .. } => ErrorKind::CapacityExhausted,
            Error::Incompatible | Error::VersionMismatch | Error::MultiVal => {
                ErrorKind::Incompatible
            }
            Error::PageNotFound
            | Error::Corrupted
            | Error::Panic
            | Error::Invalid
            | Error::BadSign
            | Error::WannaRecovery
            | Error::Problem
            | Error::LayoutMismatch { .. } => ErrorKind::Corruption,
            Error::ThreadMismatch
            | Error::TxnOverlapping
            | Error::BadRslot
            | Error::BadTxn
            | Error::BadValSize
            | Error::BadDbi
            | Error::KeyMismatch
            | Error::EnvClosed
            | Error::TxnReset
            | Error::TxnBroken
            | Error::InvalidArgument(_) => ErrorKind::Misuse,
            Error::Os(MDBX_EINVAL) => ErrorKind::Misuse,
            Error::Os(_) => ErrorKind::System,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_busy(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }

    pub fn is_capacity_exhausted(&self) -> bool {
        self.kind() == ErrorKind::CapacityExhausted
    }

    /// The operating system view of a system error, if this is one
    pub fn as_io_error(&self) -> Option<io::Error> {
        match self {
            Error::Os(code) => Some(io::Error::from_raw_os_error(*code)),
            _ => None,
        }
    }
}

/// Asks the engine for the text of a status code.
///
/// The text is fetched on every call. Returns `None` when the engine has no
/// message for the code.
pub fn describe(code: c_int) -> Option<String> {
    let mut call = Strerror {
        code,
        message: std::ptr::null(),
    };
    // SAFETY: the block carries no pointers the engine reads
    unsafe { bridge::invoke(&mut call) };
    if call.message.is_null() {
        return None;
    }
    // SAFETY: the engine returns a NUL-terminated static or thread-local buffer
    let text = unsafe { CStr::from_ptr(call.message) };
    Some(text.to_string_lossy().into_owned())
}

fn describe_code(code: &c_int) -> String {
    describe_or_code(*code)
}

fn describe_or_code(code: c_int) -> String {
    describe(code).unwrap_or_else(|| format!("mdbx error {}", code))
}

/// Helper trait for converting engine status codes to Results
pub(crate) trait IntoResult {
    /// Success only for `MDBX_SUCCESS`
    fn into_result(self) -> Result<()>;

    /// Success for both `MDBX_SUCCESS` (false) and `MDBX_RESULT_TRUE` (true)
    fn into_match(self) -> Result<bool>;
}

impl IntoResult for c_int {
    fn into_result(self) -> Result<()> {
        if self == MDBX_SUCCESS {
            Ok(())
        } else {
            Err(Error::from(self))
        }
    }

    fn into_match(self) -> Result<bool> {
        match self {
            MDBX_SUCCESS => Ok(false),
            MDBX_RESULT_TRUE => Ok(true),
            err => Err(Error::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_codes_round_trip() {
        for code in [
            MDBX_KEYEXIST,
            MDBX_NOTFOUND,
            MDBX_MAP_FULL,
            MDBX_BUSY,
            MDBX_THREAD_MISMATCH,
            MDBX_TXN_OVERLAPPING,
            MDBX_EKEYMISMATCH,
        ] {
            assert_eq!(Error::from(code).code(), code);
        }
    }

    #[test]
    fn positive_codes_are_system_errors() {
        assert_eq!(Error::from(MDBX_ENOMEM), Error::Os(MDBX_ENOMEM));
        assert_eq!(Error::from(MDBX_ENOMEM).kind(), ErrorKind::System);
        assert_eq!(Error::from(MDBX_EINVAL).kind(), ErrorKind::Misuse);
        assert!(Error::from(MDBX_ENOMEM).as_io_error().is_some());
        assert_eq!(Error::from(-12345), Error::Other(-12345));
    }

    #[test]
    fn categories() {
        assert!(Error::NotFound.is_not_found());
        assert!(Error::Busy.is_busy());
        assert!(Error::MapFull.is_capacity_exhausted());
        assert!(Error::TxnFull.is_capacity_exhausted());
        assert!(Error::ReadersFull.is_capacity_exhausted());
        assert_eq!(Error::Corrupted.kind(), ErrorKind::Corruption);
        assert_eq!(Error::BadSign.kind(), ErrorKind::Corruption);
        assert_eq!(Error::ThreadMismatch.kind(), ErrorKind::Misuse);
        assert_eq!(Error::Incompatible.kind(), ErrorKind::Incompatible);
        assert_eq!(Error::KeyExist.kind(), ErrorKind::Exists);
    }

    #[test]
    fn status_conversion() {
        assert_eq!(MDBX_SUCCESS.into_result(), Ok(()));
        assert_eq!(MDBX_SUCCESS.into_match(), Ok(false));
        assert_eq!(MDBX_RESULT_TRUE.into_match(), Ok(true));
        assert_eq!(MDBX_RESULT_TRUE.into_result(), Err(Error::Other(MDBX_RESULT_TRUE)));
        assert_eq!(MDBX_NOTFOUND.into_match(), Err(Error::NotFound));
    }

    #[test]
    fn messages_come_from_the_engine() {
        let text = describe(MDBX_NOTFOUND).expect("engine message");
        assert!(!text.is_empty());
        assert_eq!(Error::NotFound.to_string(), text);
        assert_eq!(Error::EnvClosed.to_string(), "environment is closed");
        assert_eq!(
            Error::BufferTooSmall { required: 9 }.to_string(),
            "buffer too small, 9 bytes required"
        );
    }
}
