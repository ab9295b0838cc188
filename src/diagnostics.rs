//! Engine-side diagnostics.
//!
//! Debug builds of the engine check internal assertions at run time and abort
//! the process when one trips. That check is switched off once per process,
//! and engine messages are forwarded to the `log` facade under the `libmdbx`
//! target instead of stderr.

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::{ptr, slice};

use log::{debug, log, log_enabled, Level, LevelFilter};
use once_cell::sync::Lazy;

use crate::bridge::{self, SetupDebug};
use crate::ffi;

const TARGET: &str = "libmdbx";
const BUFFER_SIZE: usize = 1024;

static INSTALLED: Lazy<c_int> = Lazy::new(install);

/// Debug flags left in force by the one-time setup
pub(crate) fn ensure() -> c_int {
    *INSTALLED
}

fn setup(
    level: c_int,
    flags: c_int,
    logger: ffi::MDBX_debug_func_nofmt,
    buffer: *mut c_char,
    size: usize,
) -> c_int {
    let mut call = SetupDebug {
        level,
        flags,
        logger,
        buffer,
        size,
        previous: 0,
    };
    // SAFETY: a buffer handed to the engine is leaked and outlives every call
    unsafe { bridge::invoke(&mut call) };
    call.previous
}

/// Engine debug flags, read without changing anything
pub(crate) fn debug_flags() -> c_int {
    let previous = setup(
        ffi::MDBX_LOG_DONTCHANGE as c_int,
        ffi::MDBX_DBG_DONTCHANGE as c_int,
        None,
        ptr::null_mut(),
        0,
    );
    previous & 0xffff
}

fn install() -> c_int {
    let flags = debug_flags() & !(ffi::MDBX_DBG_ASSERT as c_int);
    let buffer = Box::leak(vec![0u8; BUFFER_SIZE].into_boxed_slice());
    setup(
        engine_level(log::max_level()),
        flags,
        Some(forward),
        buffer.as_mut_ptr() as *mut c_char,
        buffer.len(),
    );
    debug!("engine messages forwarded to `{}`, debug flags {:#x}", TARGET, flags);
    flags
}

fn engine_level(filter: LevelFilter) -> c_int {
    let level = match filter {
        LevelFilter::Off | LevelFilter::Error => ffi::MDBX_LOG_ERROR,
        LevelFilter::Warn => ffi::MDBX_LOG_WARN,
        LevelFilter::Info => ffi::MDBX_LOG_NOTICE,
        LevelFilter::Debug => ffi::MDBX_LOG_DEBUG,
        LevelFilter::Trace => ffi::MDBX_LOG_TRACE,
    };
    level as c_int
}

fn log_level(level: c_int) -> Level {
    match level {
        l if l <= ffi::MDBX_LOG_ERROR as c_int => Level::Error,
        l if l == ffi::MDBX_LOG_WARN as c_int => Level::Warn,
        l if l <= ffi::MDBX_LOG_VERBOSE as c_int => Level::Info,
        l if l == ffi::MDBX_LOG_DEBUG as c_int => Level::Debug,
        _ => Level::Trace,
    }
}

unsafe extern "C" fn forward(
    level: c_int,
    function: *const c_char,
    line: c_int,
    msg: *const c_char,
    length: c_uint,
) {
    let level = log_level(level);
    if msg.is_null() || !log_enabled!(target: TARGET, level) {
        return;
    }
    let text = slice::from_raw_parts(msg as *const u8, length as usize);
    let text = String::from_utf8_lossy(text);
    let function = if function.is_null() {
        Cow::Borrowed("?")
    } else {
        CStr::from_ptr(function).to_string_lossy()
    };
    log!(target: TARGET, level, "{}:{}: {}", function, line, text.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertions_are_switched_off() {
        let flags = ensure();
        assert_eq!(flags & ffi::MDBX_DBG_ASSERT as c_int, 0);
        assert_eq!(debug_flags() & ffi::MDBX_DBG_ASSERT as c_int, 0);
    }

    #[test]
    fn levels_map_both_ways() {
        assert_eq!(log_level(ffi::MDBX_LOG_FATAL as c_int), Level::Error);
        assert_eq!(log_level(ffi::MDBX_LOG_WARN as c_int), Level::Warn);
        assert_eq!(log_level(ffi::MDBX_LOG_NOTICE as c_int), Level::Info);
        assert_eq!(log_level(ffi::MDBX_LOG_EXTRA as c_int), Level::Trace);
        assert_eq!(engine_level(LevelFilter::Off), ffi::MDBX_LOG_ERROR as c_int);
        assert_eq!(engine_level(LevelFilter::Debug), ffi::MDBX_LOG_DEBUG as c_int);
    }
}
