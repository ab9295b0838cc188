use std::fmt;
use std::mem::ManuallyDrop;
use std::os::raw::c_int;
use std::ptr;

use crate::bridge::{self, *};
use crate::constants::{
    WriteFlags, MDBX_ENOMEM, MDBX_NOTFOUND, MDBX_RESULT_TRUE, MDBX_SUCCESS,
};
use crate::error::{Error, IntoResult, Result};
use crate::ffi;
use crate::transaction::{Transaction, TransactionKind, RW};
use crate::types::{CursorOp, Lookup, Table};
use crate::value::{out_val, Value};

/// Key/value pair read through a cursor
pub type Pair<'txn> = (Value<'txn>, Value<'txn>);

/// Outcome of attaching an [`UnboundCursor`]. A failed attach hands the
/// cursor back so it can be tried again.
pub type BindResult<'txn, K> = std::result::Result<Cursor<'txn, K>, (UnboundCursor, Error)>;

/// A position within one table, scoped to a transaction.
///
/// Every positioning method returns `Ok(None)` when the move runs off the
/// table. Values stay valid until the next write in the transaction.
pub struct Cursor<'txn, K: TransactionKind> {
    txn: &'txn Transaction<'txn, K>,
    cursor: *mut ffi::MDBX_cursor,
}

/// Cursor not bound to any transaction, for reuse across transactions
#[derive(Debug)]
pub struct UnboundCursor {
    cursor: *mut ffi::MDBX_cursor,
    table: Option<Table>,
}

// SAFETY: an unbound cursor is plain memory until bound again, binding
// checks the transaction's thread
unsafe impl Send for UnboundCursor {}

fn create_raw() -> Result<*mut ffi::MDBX_cursor> {
    let mut call = CursorCreate {
        context: ptr::null_mut(),
        cursor: ptr::null_mut(),
    };
    unsafe { bridge::invoke(&mut call) };
    if call.cursor.is_null() {
        return Err(Error::Os(MDBX_ENOMEM));
    }
    Ok(call.cursor)
}

fn close_raw(cursor: *mut ffi::MDBX_cursor) {
    let mut call = CursorClose { cursor };
    unsafe { bridge::invoke(&mut call) };
}

impl<'txn, K: TransactionKind> Cursor<'txn, K> {
    pub(crate) fn open(txn: &'txn Transaction<'txn, K>, table: Table) -> Result<Self> {
        let mut cursor = ptr::null_mut();
        let mut call = CursorOpen {
            txn: txn.raw()?,
            dbi: table.dbi,
            cursor: &mut cursor,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(Cursor { txn, cursor })
    }

    fn value(&self, raw: ffi::MDBX_val) -> Value<'txn> {
        Value::from_raw(raw, self.txn.generation())
    }

    /// Runs one positioning call. Success, inexact match and not-found come
    /// back as a status; anything else is an error.
    fn get_raw(
        &mut self,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
        op: CursorOp,
    ) -> Result<(c_int, ffi::MDBX_val, ffi::MDBX_val)> {
        let mut key = key.map_or_else(out_val, |k| Value::new(k).raw());
        let mut data = data.map_or_else(out_val, |d| Value::new(d).raw());
        let mut call = CursorGet {
            cursor: self.cursor,
            key: &mut key,
            data: &mut data,
            op: op as u32,
            status: 0,
        };
        self.txn.raw()?;
        unsafe { bridge::invoke(&mut call) };
        match call.status {
            MDBX_SUCCESS | MDBX_RESULT_TRUE | MDBX_NOTFOUND => Ok((call.status, key, data)),
            status => Err(Error::from(status)),
        }
    }

    fn pair_op(&mut self, key: Option<&[u8]>, op: CursorOp) -> Result<Option<Pair<'txn>>> {
        let (status, key, data) = self.get_raw(key, None, op)?;
        if status == MDBX_NOTFOUND {
            return Ok(None);
        }
        Ok(Some((self.value(key), self.value(data))))
    }

    fn data_op(&mut self, key: Option<&[u8]>, data: Option<&[u8]>, op: CursorOp) -> Result<Option<Value<'txn>>> {
        let (status, _, data) = self.get_raw(key, data, op)?;
        if status == MDBX_NOTFOUND {
            return Ok(None);
        }
        Ok(Some(self.value(data)))
    }

    /// Move with any operation that needs no key. Keyed operations have
    /// their own methods.
    pub fn position(&mut self, op: CursorOp) -> Result<Option<Pair<'txn>>> {
        if op.takes_key() {
            return Err(Error::InvalidArgument("cursor operation needs a key"));
        }
        self.pair_op(None, op)
    }

    pub fn first(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::First)
    }

    pub fn last(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::Last)
    }

    pub fn next(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::Next)
    }

    pub fn prev(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::Prev)
    }

    pub fn get_current(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::GetCurrent)
    }

    /// Next value of the current key (DUPSORT)
    pub fn next_dup(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::NextDup)
    }

    pub fn prev_dup(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::PrevDup)
    }

    /// First value of the next key
    pub fn next_nodup(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::NextNoDup)
    }

    /// Last value of the previous key
    pub fn prev_nodup(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::PrevNoDup)
    }

    pub fn first_dup(&mut self) -> Result<Option<Value<'txn>>> {
        self.data_op(None, None, CursorOp::FirstDup)
    }

    pub fn last_dup(&mut self) -> Result<Option<Value<'txn>>> {
        self.data_op(None, None, CursorOp::LastDup)
    }

    /// Up to a page of fixed-size duplicates from the current position (DUPFIXED)
    pub fn get_multiple(&mut self) -> Result<Option<Value<'txn>>> {
        self.data_op(None, None, CursorOp::GetMultiple)
    }

    pub fn next_multiple(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::NextMultiple)
    }

    pub fn prev_multiple(&mut self) -> Result<Option<Pair<'txn>>> {
        self.pair_op(None, CursorOp::PrevMultiple)
    }

    /// Position at `key`, returning its value
    pub fn set(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Value<'txn>>> {
        self.data_op(Some(key.as_ref()), None, CursorOp::Set)
    }

    /// Position at `key`, returning the stored key and value
    pub fn set_key(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Pair<'txn>>> {
        self.pair_op(Some(key.as_ref()), CursorOp::SetKey)
    }

    /// Position at the first key greater than or equal to `key`
    pub fn set_range(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Pair<'txn>>> {
        self.pair_op(Some(key.as_ref()), CursorOp::SetRange)
    }

    /// Position at the exact pair (DUPSORT)
    pub fn get_both(&mut self, key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Result<bool> {
        let found = self.data_op(Some(key.as_ref()), Some(data.as_ref()), CursorOp::GetBoth)?;
        Ok(found.is_some())
    }

    /// Position at `key` and the first of its values not less than `data` (DUPSORT)
    pub fn get_both_range(
        &mut self,
        key: impl AsRef<[u8]>,
        data: impl AsRef<[u8]>,
    ) -> Result<Option<Value<'txn>>> {
        self.data_op(Some(key.as_ref()), Some(data.as_ref()), CursorOp::GetBothRange)
    }

    /// Position at the first pair not less than `key` (and `data` for DUPSORT
    /// tables), telling an exact hit from a greater one.
    pub fn set_lowerbound(
        &mut self,
        key: impl AsRef<[u8]>,
        data: Option<&[u8]>,
    ) -> Result<Lookup<Pair<'txn>>> {
        let (status, key, data) =
            self.get_raw(Some(key.as_ref()), Some(data.unwrap_or_default()), CursorOp::SetLowerBound)?;
        Ok(match status {
            MDBX_SUCCESS => Lookup::Exact((self.value(key), self.value(data))),
            MDBX_RESULT_TRUE => Lookup::Next((self.value(key), self.value(data))),
            _ => Lookup::NotFound,
        })
    }

    /// Position at the first pair greater than `key` (and `data`). Never
    /// exact.
    pub fn set_upperbound(
        &mut self,
        key: impl AsRef<[u8]>,
        data: Option<&[u8]>,
    ) -> Result<Lookup<Pair<'txn>>> {
        let (status, key, data) =
            self.get_raw(Some(key.as_ref()), Some(data.unwrap_or_default()), CursorOp::SetUpperBound)?;
        Ok(match status {
            MDBX_NOTFOUND => Lookup::NotFound,
            _ => Lookup::Next((self.value(key), self.value(data))),
        })
    }

    /// Number of values of the current key
    pub fn count(&self) -> Result<usize> {
        let mut count = 0usize;
        let mut call = CursorCount {
            cursor: self.cursor,
            count: &mut count,
            status: 0,
        };
        self.txn.raw()?;
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(count)
    }

    pub fn eof(&self) -> Result<bool> {
        let mut call = CursorEof {
            cursor: self.cursor,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match()
    }

    pub fn on_first(&self) -> Result<bool> {
        let mut call = CursorOnFirst {
            cursor: self.cursor,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match()
    }

    pub fn on_last(&self) -> Result<bool> {
        let mut call = CursorOnLast {
            cursor: self.cursor,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_match()
    }

    pub fn table(&self) -> Result<Table> {
        let mut call = CursorDbi {
            cursor: self.cursor,
            dbi: u32::MAX,
        };
        unsafe { bridge::invoke(&mut call) };
        match call.dbi {
            u32::MAX => Err(Error::BadDbi),
            dbi => Ok(Table { dbi }),
        }
    }

    pub fn txn(&self) -> &'txn Transaction<'txn, K> {
        self.txn
    }

    /// Whether the engine still ties the cursor to the transaction it borrows
    pub fn is_bound(&self) -> bool {
        let mut call = CursorTxn {
            cursor: self.cursor,
            txn: ptr::null_mut(),
        };
        unsafe { bridge::invoke(&mut call) };
        match self.txn.raw() {
            Ok(txn) => !call.txn.is_null() && call.txn == txn,
            Err(_) => false,
        }
    }

    /// A second cursor at the same position
    pub fn try_clone(&self) -> Result<Cursor<'txn, K>> {
        self.txn.raw()?;
        let dest = create_raw()?;
        let mut call = CursorCopy {
            src: self.cursor,
            dest,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        if let Err(err) = call.status.into_result() {
            close_raw(dest);
            return Err(err);
        }
        Ok(Cursor {
            txn: self.txn,
            cursor: dest,
        })
    }

    /// Estimated number of items between two cursors of the same table,
    /// negative when `last` is before `first`
    pub fn estimate_distance(first: &Cursor<'_, K>, last: &Cursor<'_, K>) -> Result<isize> {
        let mut distance = 0isize;
        let mut call = EstimateDistance {
            first: first.cursor,
            last: last.cursor,
            distance: &mut distance,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(distance)
    }

    pub fn close(self) {}

    /// Detach from the transaction, keeping the native cursor for reuse
    pub fn unbind(self) -> UnboundCursor {
        let table = self.table().ok();
        let this = ManuallyDrop::new(self);
        UnboundCursor {
            cursor: this.cursor,
            table,
        }
    }
}

impl<'txn> Cursor<'txn, RW> {
    /// Store a pair at the cursor. With `CURRENT`, overwrite the current one.
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, flags: WriteFlags) -> Result<()> {
        if flags.intersects(WriteFlags::RESERVE | WriteFlags::MULTIPLE) {
            return Err(Error::InvalidArgument("use put_multiple for MULTIPLE"));
        }
        let key = Value::new(key.as_ref()).raw();
        let mut data = Value::new(value.as_ref()).raw();
        let mut call = CursorPut {
            cursor: self.cursor,
            key: &key,
            data: &mut data,
            flags: flags.bits(),
            status: 0,
        };
        self.txn.raw()?;
        self.txn.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }

    /// Store consecutive fixed-size items of `data` as duplicates of `key`
    /// (DUPFIXED). Returns how many were written.
    pub fn put_multiple(&mut self, key: impl AsRef<[u8]>, data: &[u8], item_size: usize) -> Result<usize> {
        if item_size == 0 || data.len() % item_size != 0 {
            return Err(Error::InvalidArgument("data is not a whole number of items"));
        }
        let key = Value::new(key.as_ref()).raw();
        let mut items = [
            ffi::MDBX_val {
                iov_base: data.as_ptr() as *mut _,
                iov_len: item_size,
            },
            ffi::MDBX_val {
                iov_base: ptr::null_mut(),
                iov_len: data.len() / item_size,
            },
        ];
        let mut call = CursorPut {
            cursor: self.cursor,
            key: &key,
            data: items.as_mut_ptr(),
            flags: WriteFlags::MULTIPLE.bits(),
            status: 0,
        };
        self.txn.raw()?;
        self.txn.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()?;
        Ok(items[1].iov_len)
    }

    /// Delete the current pair, or every value of the current key with
    /// `ALLDUPS`
    pub fn del(&mut self, flags: WriteFlags) -> Result<()> {
        let mut call = CursorDel {
            cursor: self.cursor,
            flags: flags.bits(),
            status: 0,
        };
        self.txn.raw()?;
        self.txn.touch();
        unsafe { bridge::invoke(&mut call) };
        call.status.into_result()
    }
}

impl<K: TransactionKind> fmt::Debug for Cursor<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("table", &self.table().ok()).finish()
    }
}

impl<K: TransactionKind> Drop for Cursor<'_, K> {
    fn drop(&mut self) {
        close_raw(self.cursor);
    }
}

impl UnboundCursor {
    pub fn new() -> Result<Self> {
        Ok(UnboundCursor {
            cursor: create_raw()?,
            table: None,
        })
    }

    /// Attach to `table` in `txn`
    pub fn bind<'txn, K: TransactionKind>(
        mut self,
        txn: &'txn Transaction<'txn, K>,
        table: Table,
    ) -> BindResult<'txn, K> {
        let raw = match txn.raw() {
            Ok(raw) => raw,
            Err(err) => return Err((self, err)),
        };
        let mut call = CursorBind {
            txn: raw,
            cursor: self.cursor,
            dbi: table.dbi,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        if let Err(err) = call.status.into_result() {
            return Err((self, err));
        }
        self.table = Some(table);
        Ok(self.attach(txn))
    }

    /// Attach to `txn` on the table the cursor was last bound to
    pub fn renew<'txn, K: TransactionKind>(self, txn: &'txn Transaction<'txn, K>) -> BindResult<'txn, K> {
        if self.table.is_none() {
            return Err((self, Error::InvalidArgument("cursor was never bound to a table")));
        }
        let raw = match txn.raw() {
            Ok(raw) => raw,
            Err(err) => return Err((self, err)),
        };
        let mut call = CursorRenew {
            txn: raw,
            cursor: self.cursor,
            status: 0,
        };
        unsafe { bridge::invoke(&mut call) };
        if let Err(err) = call.status.into_result() {
            return Err((self, err));
        }
        Ok(self.attach(txn))
    }

    fn attach<'txn, K: TransactionKind>(self, txn: &'txn Transaction<'txn, K>) -> Cursor<'txn, K> {
        let this = ManuallyDrop::new(self);
        Cursor {
            txn,
            cursor: this.cursor,
        }
    }

    pub fn table(&self) -> Option<Table> {
        self.table
    }

    pub fn close(self) {}
}

impl Drop for UnboundCursor {
    fn drop(&mut self) {
        close_raw(self.cursor);
    }
}
