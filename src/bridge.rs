//! Two-word foreign call bridge.
//!
//! Every native entry point is reached through a trampoline of the shape
//! `fn(arg0, arg1)`, where `arg0` is the address of a `#[repr(C)]` argument
//! block holding the real inputs, the output slots and the status slot.
//! `arg1` is reserved and always zero.
//!
//! The bridge validates nothing and cannot fail. The engine's status is copied
//! back into the block and interpreted by the caller. Calls are synchronous and
//! run on the calling OS thread; the bridge adds no locking of its own, the
//! thread-affinity rules are enforced by the transaction and cursor types.

use std::os::raw::{c_char, c_int, c_uint, c_void};

use crate::ffi;

/// Native trampoline signature
pub(crate) type Entry = unsafe extern "C" fn(usize, usize);

/// An argument block for exactly one native entry point.
///
/// # Safety
///
/// `ENTRY` must reinterpret `arg0` as `*mut Self` and nothing else.
pub(crate) unsafe trait Call: Sized {
    const ENTRY: Entry;
}

/// Issues the native call described by `block`, blocking until it returns.
///
/// # Safety
///
/// Every handle and buffer pointer stored in `block` must be valid for the
/// duration of the call, as required by the engine entry point.
#[inline]
pub(crate) unsafe fn invoke<C: Call>(block: &mut C) {
    (C::ENTRY)(block as *mut C as usize, 0)
}

macro_rules! native_calls {
    ($(
        $(#[$meta:meta])*
        $name:ident => $entry:ident { $($field:ident: $ty:ty),* $(,)? } |$args:ident| $body:block
    )*) => {$(
        $(#[$meta])*
        #[repr(C)]
        pub(crate) struct $name {
            $(pub(crate) $field: $ty,)*
        }

        unsafe extern "C" fn $entry(arg0: usize, _arg1: usize) {
            let $args = &mut *(arg0 as *mut $name);
            $body
        }

        unsafe impl Call for $name {
            const ENTRY: Entry = $entry;
        }
    )*};
}

native_calls! {
    /// Text of a status code
    Strerror => do_strerror { code: c_int, message: *const c_char } |a| {
        a.message = ffi::mdbx_strerror(a.code);
    }

    /// Engine diagnostics: level, debug flags and the message sink
    SetupDebug => do_setup_debug {
        level: c_int,
        flags: c_int,
        logger: ffi::MDBX_debug_func_nofmt,
        buffer: *mut c_char,
        size: usize,
        previous: c_int,
    } |a| {
        a.previous = ffi::mdbx_setup_debug_nofmt(a.level as _, a.flags as _, a.logger, a.buffer, a.size);
    }

    // Environment

    EnvCreate => do_env_create { env: *mut *mut ffi::MDBX_env, status: c_int } |a| {
        a.status = ffi::mdbx_env_create(a.env);
    }

    EnvOpen => do_env_open {
        env: *mut ffi::MDBX_env,
        path: *const c_char,
        flags: u32,
        mode: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_open(a.env, a.path, a.flags as _, a.mode as _);
    }

    EnvClose => do_env_close { env: *mut ffi::MDBX_env, dont_sync: bool, status: c_int } |a| {
        a.status = ffi::mdbx_env_close_ex(a.env, a.dont_sync);
    }

    EnvSetGeometry => do_env_set_geometry {
        env: *mut ffi::MDBX_env,
        size_lower: isize,
        size_now: isize,
        size_upper: isize,
        growth_step: isize,
        shrink_threshold: isize,
        page_size: isize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_set_geometry(
            a.env,
            a.size_lower,
            a.size_now,
            a.size_upper,
            a.growth_step,
            a.shrink_threshold,
            a.page_size,
        );
    }

    EnvSetOption => do_env_set_option {
        env: *mut ffi::MDBX_env,
        option: u32,
        value: u64,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_set_option(a.env, a.option as _, a.value);
    }

    EnvGetOption => do_env_get_option {
        env: *mut ffi::MDBX_env,
        option: u32,
        value: *mut u64,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_get_option(a.env, a.option as _, a.value);
    }

    EnvSetFlags => do_env_set_flags {
        env: *mut ffi::MDBX_env,
        flags: u32,
        onoff: bool,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_set_flags(a.env, a.flags as _, a.onoff);
    }

    EnvGetFlags => do_env_get_flags { env: *mut ffi::MDBX_env, flags: *mut c_uint, status: c_int } |a| {
        a.status = ffi::mdbx_env_get_flags(a.env, a.flags);
    }

    EnvSync => do_env_sync { env: *mut ffi::MDBX_env, force: bool, nonblock: bool, status: c_int } |a| {
        a.status = ffi::mdbx_env_sync_ex(a.env, a.force, a.nonblock);
    }

    EnvCopy => do_env_copy {
        env: *mut ffi::MDBX_env,
        dest: *const c_char,
        flags: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_copy(a.env, a.dest, a.flags as _);
    }

    EnvDelete => do_env_delete { path: *const c_char, mode: u32, status: c_int } |a| {
        a.status = ffi::mdbx_env_delete(a.path, a.mode as _);
    }

    EnvInfo => do_env_info {
        env: *mut ffi::MDBX_env,
        txn: *mut ffi::MDBX_txn,
        info: *mut ffi::MDBX_envinfo,
        size: usize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_info_ex(a.env, a.txn, a.info, a.size);
    }

    EnvStat => do_env_stat {
        env: *mut ffi::MDBX_env,
        txn: *mut ffi::MDBX_txn,
        stat: *mut ffi::MDBX_stat,
        size: usize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_stat_ex(a.env, a.txn, a.stat, a.size);
    }

    EnvGetPath => do_env_get_path { env: *mut ffi::MDBX_env, path: *mut *const c_char, status: c_int } |a| {
        a.status = ffi::mdbx_env_get_path(a.env, a.path);
    }

    EnvGetFd => do_env_get_fd {
        env: *mut ffi::MDBX_env,
        fd: *mut ffi::mdbx_filehandle_t,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_env_get_fd(a.env, a.fd);
    }

    EnvMaxKeySize => do_env_max_key_size { env: *mut ffi::MDBX_env, flags: u32, size: c_int } |a| {
        a.size = ffi::mdbx_env_get_maxkeysize_ex(a.env, a.flags as _);
    }

    EnvMaxValSize => do_env_max_val_size { env: *mut ffi::MDBX_env, flags: u32, size: c_int } |a| {
        a.size = ffi::mdbx_env_get_maxvalsize_ex(a.env, a.flags as _);
    }

    ReaderCheck => do_reader_check { env: *mut ffi::MDBX_env, dead: *mut c_int, status: c_int } |a| {
        a.status = ffi::mdbx_reader_check(a.env, a.dead);
    }

    DbiClose => do_dbi_close { env: *mut ffi::MDBX_env, dbi: u32, status: c_int } |a| {
        a.status = ffi::mdbx_dbi_close(a.env, a.dbi);
    }

    LimitsKeySize => do_limits_key_size { page_size: isize, flags: u32, size: isize } |a| {
        a.size = ffi::mdbx_limits_keysize_max(a.page_size, a.flags as _);
    }

    LimitsValSize => do_limits_val_size { page_size: isize, flags: u32, size: isize } |a| {
        a.size = ffi::mdbx_limits_valsize_max(a.page_size, a.flags as _);
    }

    // Transactions

    TxnBegin => do_txn_begin {
        env: *mut ffi::MDBX_env,
        parent: *mut ffi::MDBX_txn,
        txn: *mut *mut ffi::MDBX_txn,
        context: *mut c_void,
        flags: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_txn_begin_ex(a.env, a.parent, a.flags as _, a.txn, a.context);
    }

    TxnCommit => do_txn_commit {
        txn: *mut ffi::MDBX_txn,
        latency: *mut ffi::MDBX_commit_latency,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_txn_commit_ex(a.txn, a.latency);
    }

    TxnAbort => do_txn_abort { txn: *mut ffi::MDBX_txn, status: c_int } |a| {
        a.status = ffi::mdbx_txn_abort(a.txn);
    }

    TxnBreak => do_txn_break { txn: *mut ffi::MDBX_txn, status: c_int } |a| {
        a.status = ffi::mdbx_txn_break(a.txn);
    }

    TxnReset => do_txn_reset { txn: *mut ffi::MDBX_txn, status: c_int } |a| {
        a.status = ffi::mdbx_txn_reset(a.txn);
    }

    TxnRenew => do_txn_renew { txn: *mut ffi::MDBX_txn, status: c_int } |a| {
        a.status = ffi::mdbx_txn_renew(a.txn);
    }

    TxnInfo => do_txn_info {
        txn: *mut ffi::MDBX_txn,
        info: *mut ffi::MDBX_txn_info,
        scan_rlt: bool,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_txn_info(a.txn, a.info, a.scan_rlt);
    }

    TxnFlags => do_txn_flags { txn: *mut ffi::MDBX_txn, flags: c_int } |a| {
        a.flags = ffi::mdbx_txn_flags(a.txn) as c_int;
    }

    TxnId => do_txn_id { txn: *mut ffi::MDBX_txn, id: u64 } |a| {
        a.id = ffi::mdbx_txn_id(a.txn);
    }

    CanaryPut => do_canary_put { txn: *mut ffi::MDBX_txn, canary: *const ffi::MDBX_canary, status: c_int } |a| {
        a.status = ffi::mdbx_canary_put(a.txn, a.canary);
    }

    CanaryGet => do_canary_get { txn: *mut ffi::MDBX_txn, canary: *mut ffi::MDBX_canary, status: c_int } |a| {
        a.status = ffi::mdbx_canary_get(a.txn, a.canary);
    }

    // Tables

    DbiOpen => do_dbi_open {
        txn: *mut ffi::MDBX_txn,
        name: *const c_char,
        flags: u32,
        dbi: *mut u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_dbi_open(a.txn, a.name, a.flags as _, a.dbi);
    }

    DbiStat => do_dbi_stat {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        stat: *mut ffi::MDBX_stat,
        size: usize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_dbi_stat(a.txn, a.dbi, a.stat, a.size);
    }

    DbiFlags => do_dbi_flags {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        flags: *mut c_uint,
        state: *mut c_uint,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_dbi_flags_ex(a.txn, a.dbi, a.flags, a.state);
    }

    TableDrop => do_drop { txn: *mut ffi::MDBX_txn, dbi: u32, del: bool, status: c_int } |a| {
        a.status = ffi::mdbx_drop(a.txn, a.dbi, a.del);
    }

    // Direct access

    Get => do_get {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *const ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_get(a.txn, a.dbi, a.key, a.data);
    }

    GetEqualOrGreat => do_get_equal_or_great {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *mut ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_get_equal_or_great(a.txn, a.dbi, a.key, a.data);
    }

    GetEx => do_get_ex {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *mut ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        values_count: *mut usize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_get_ex(a.txn, a.dbi, a.key, a.data, a.values_count);
    }

    Put => do_put {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *const ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        flags: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_put(a.txn, a.dbi, a.key, a.data, a.flags as _);
    }

    Replace => do_replace {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *const ffi::MDBX_val,
        new_data: *mut ffi::MDBX_val,
        old_data: *mut ffi::MDBX_val,
        flags: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_replace(a.txn, a.dbi, a.key, a.new_data, a.old_data, a.flags as _);
    }

    Del => do_del {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        key: *const ffi::MDBX_val,
        data: *const ffi::MDBX_val,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_del(a.txn, a.dbi, a.key, a.data);
    }

    // Cursors

    CursorCreate => do_cursor_create { context: *mut c_void, cursor: *mut ffi::MDBX_cursor } |a| {
        a.cursor = ffi::mdbx_cursor_create(a.context);
    }

    CursorBind => do_cursor_bind {
        txn: *mut ffi::MDBX_txn,
        cursor: *mut ffi::MDBX_cursor,
        dbi: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_cursor_bind(a.txn, a.cursor, a.dbi);
    }

    CursorOpen => do_cursor_open {
        txn: *mut ffi::MDBX_txn,
        dbi: u32,
        cursor: *mut *mut ffi::MDBX_cursor,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_cursor_open(a.txn, a.dbi, a.cursor);
    }

    CursorClose => do_cursor_close { cursor: *mut ffi::MDBX_cursor } |a| {
        ffi::mdbx_cursor_close(a.cursor);
    }

    CursorRenew => do_cursor_renew { txn: *mut ffi::MDBX_txn, cursor: *mut ffi::MDBX_cursor, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_renew(a.txn, a.cursor);
    }

    CursorTxn => do_cursor_txn { cursor: *mut ffi::MDBX_cursor, txn: *mut ffi::MDBX_txn } |a| {
        a.txn = ffi::mdbx_cursor_txn(a.cursor);
    }

    CursorDbi => do_cursor_dbi { cursor: *mut ffi::MDBX_cursor, dbi: u32 } |a| {
        a.dbi = ffi::mdbx_cursor_dbi(a.cursor);
    }

    CursorCopy => do_cursor_copy { src: *mut ffi::MDBX_cursor, dest: *mut ffi::MDBX_cursor, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_copy(a.src, a.dest);
    }

    CursorGet => do_cursor_get {
        cursor: *mut ffi::MDBX_cursor,
        key: *mut ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        op: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_cursor_get(a.cursor, a.key, a.data, a.op as _);
    }

    CursorPut => do_cursor_put {
        cursor: *mut ffi::MDBX_cursor,
        key: *const ffi::MDBX_val,
        data: *mut ffi::MDBX_val,
        flags: u32,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_cursor_put(a.cursor, a.key, a.data, a.flags as _);
    }

    CursorDel => do_cursor_del { cursor: *mut ffi::MDBX_cursor, flags: u32, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_del(a.cursor, a.flags as _);
    }

    CursorCount => do_cursor_count { cursor: *mut ffi::MDBX_cursor, count: *mut usize, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_count(a.cursor, a.count);
    }

    CursorEof => do_cursor_eof { cursor: *mut ffi::MDBX_cursor, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_eof(a.cursor);
    }

    CursorOnFirst => do_cursor_on_first { cursor: *mut ffi::MDBX_cursor, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_on_first(a.cursor);
    }

    CursorOnLast => do_cursor_on_last { cursor: *mut ffi::MDBX_cursor, status: c_int } |a| {
        a.status = ffi::mdbx_cursor_on_last(a.cursor);
    }

    EstimateDistance => do_estimate_distance {
        first: *mut ffi::MDBX_cursor,
        last: *mut ffi::MDBX_cursor,
        distance: *mut isize,
        status: c_int,
    } |a| {
        a.status = ffi::mdbx_estimate_distance(a.first, a.last, a.distance);
    }
}
