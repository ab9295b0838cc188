use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::os::raw::c_void;
use std::{ptr, slice, str};

use crate::ffi;

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width scalars that can be viewed in native byte order
pub trait Scalar: sealed::Sealed + Copy + Default {}

macro_rules! scalars {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}
        impl Scalar for $t {}
    )*};
}

scalars!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Empty slot for the engine to write a key or value into
pub(crate) fn out_val() -> ffi::MDBX_val {
    ffi::MDBX_val {
        iov_base: ptr::null_mut(),
        iov_len: 0,
    }
}

/// Non-owning view over a key or value.
///
/// Input views alias caller memory. Views returned by the engine alias pages
/// of the memory map and stay valid only until the next write in the same
/// transaction, or until the transaction ends. The lifetime ties a view to
/// its transaction; writes are caught at runtime through a generation stamp,
/// see [`Value::is_valid`].
///
/// The copying and decoding accessors check the stamp in every build and
/// panic on a stale view. Borrowing the memory itself is `unsafe`, see
/// [`Value::as_bytes`].
pub struct Value<'a> {
    raw: ffi::MDBX_val,
    stamp: Option<(&'a Cell<u64>, u64)>,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> Value<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Value {
            raw: ffi::MDBX_val {
                iov_base: data.as_ptr() as *mut c_void,
                iov_len: data.len(),
            },
            stamp: None,
            _marker: PhantomData,
        }
    }

    pub fn empty() -> Value<'static> {
        Value::new(&[])
    }

    pub fn from_bytes(data: &'a [u8]) -> Self {
        Value::new(data)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(data: &'a str) -> Self {
        Value::new(data.as_bytes())
    }

    /// Views a scalar in native byte order, without conversion.
    pub fn from_scalar<T: Scalar>(value: &'a T) -> Self {
        Value {
            raw: ffi::MDBX_val {
                iov_base: value as *const T as *mut c_void,
                iov_len: size_of::<T>(),
            },
            stamp: None,
            _marker: PhantomData,
        }
    }

    pub fn from_u8(value: &'a u8) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_i8(value: &'a i8) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_u16(value: &'a u16) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_i16(value: &'a i16) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_u32(value: &'a u32) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_i32(value: &'a i32) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_u64(value: &'a u64) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_i64(value: &'a i64) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_f32(value: &'a f32) -> Self {
        Value::from_scalar(value)
    }

    pub fn from_f64(value: &'a f64) -> Self {
        Value::from_scalar(value)
    }

    /// Wraps memory written back by the engine, stamped with the current
    /// generation of the owning transaction.
    pub(crate) fn from_raw(raw: ffi::MDBX_val, generation: &'a Cell<u64>) -> Self {
        Value {
            raw,
            stamp: Some((generation, generation.get())),
            _marker: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> ffi::MDBX_val {
        ffi::MDBX_val {
            iov_base: self.raw.iov_base,
            iov_len: self.raw.iov_len,
        }
    }

    /// False once the owning transaction has written since this view was
    /// produced. Caller-memory views are always valid.
    pub fn is_valid(&self) -> bool {
        match self.stamp {
            Some((generation, seen)) => generation.get() == seen,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.raw.iov_len
    }

    pub fn is_empty(&self) -> bool {
        self.raw.iov_len == 0
    }

    fn unchecked(&self) -> &[u8] {
        if self.raw.iov_base.is_null() || self.raw.iov_len == 0 {
            return &[];
        }
        // SAFETY: base/len come from a caller slice or from the engine, which
        // keeps the pages mapped for the transaction borrow `'a`
        unsafe { slice::from_raw_parts(self.raw.iov_base as *const u8, self.raw.iov_len) }
    }

    /// Memory behind a view that is still current.
    ///
    /// # Panics
    ///
    /// When the owning transaction has written since the view was produced.
    fn checked(&self) -> &[u8] {
        assert!(self.is_valid(), "value view read after a write in its transaction");
        self.unchecked()
    }

    /// Aliases the underlying memory without copying.
    ///
    /// # Safety
    ///
    /// No write may happen in the owning transaction while the returned slice
    /// is alive: a write can rewrite or move the page under it. Debug builds
    /// assert that the view is still current when it is borrowed.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        debug_assert!(self.is_valid(), "value view read after a write in its transaction");
        self.unchecked()
    }

    /// Aliases the underlying memory as text, `None` if it is not UTF-8.
    ///
    /// # Safety
    ///
    /// Same contract as [`as_bytes`](Self::as_bytes).
    pub unsafe fn as_str(&self) -> Option<&str> {
        str::from_utf8(self.as_bytes()).ok()
    }

    /// Reads a native-endian scalar from the start of the view, or zero when
    /// the view is shorter than the scalar.
    pub fn scalar<T: Scalar>(&self) -> T {
        let bytes = self.checked();
        if bytes.len() < size_of::<T>() {
            return T::default();
        }
        // SAFETY: length checked above, the read tolerates misalignment
        unsafe { ptr::read_unaligned(bytes.as_ptr() as *const T) }
    }

    pub fn u8(&self) -> u8 {
        self.scalar()
    }

    pub fn i8(&self) -> i8 {
        self.scalar()
    }

    pub fn u16(&self) -> u16 {
        self.scalar()
    }

    pub fn i16(&self) -> i16 {
        self.scalar()
    }

    pub fn u32(&self) -> u32 {
        self.scalar()
    }

    pub fn i32(&self) -> i32 {
        self.scalar()
    }

    pub fn u64(&self) -> u64 {
        self.scalar()
    }

    pub fn i64(&self) -> i64 {
        self.scalar()
    }

    pub fn f32(&self) -> f32 {
        self.scalar()
    }

    pub fn f64(&self) -> f64 {
        self.scalar()
    }

    /// Copies the bytes out; the result may be kept indefinitely.
    pub fn to_vec(&self) -> Vec<u8> {
        self.checked().to_vec()
    }

    pub fn to_string_lossy(&self) -> String {
        match String::from_utf8_lossy(self.checked()) {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s,
        }
    }

    /// Replaces the contents of `buf` with a copy of the view.
    pub fn copy_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.extend_from_slice(self.checked());
    }
}

impl Clone for Value<'_> {
    fn clone(&self) -> Self {
        Value {
            raw: self.raw(),
            stamp: self.stamp,
            _marker: PhantomData,
        }
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(data: &'a [u8]) -> Self {
        Value::new(data)
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(data: &'a str) -> Self {
        Value::from_str(data)
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Value");
        dbg.field("len", &self.len());
        if self.is_valid() {
            dbg.field("data", &self.unchecked());
        } else {
            dbg.field("stale", &true);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_alias_native_order() {
        let n: u32 = 0xdead_beef;
        let v = Value::from_u32(&n);
        assert_eq!(v.len(), 4);
        assert_eq!(v.to_vec(), n.to_ne_bytes());
        assert_eq!(v.u32(), n);
        let b = n.to_ne_bytes();
        assert_eq!(v.u16(), u16::from_ne_bytes([b[0], b[1]]));

        let f = -1.5f64;
        assert_eq!(Value::from_f64(&f).f64(), f);
        let i = -7i8;
        assert_eq!(Value::from_i8(&i).i8(), -7);
    }

    #[test]
    fn short_views_decode_to_zero() {
        let v = Value::from_bytes(b"ab");
        assert_eq!(v.u32(), 0);
        assert_eq!(v.u64(), 0);
        assert_eq!(v.f64(), 0.0);
        assert_eq!(Value::empty().u8(), 0);
    }

    #[test]
    fn unaligned_reads() {
        let buf = [0u8, 1, 0, 0, 0, 0, 0, 0, 0];
        let v = Value::from_bytes(&buf[1..]);
        assert_eq!(v.u64(), u64::from_ne_bytes([1, 0, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn text_accessors() {
        let v = Value::from_str("hello");
        assert_eq!(unsafe { v.as_str() }, Some("hello"));
        assert_eq!(v.to_string_lossy(), "hello");

        let bad = Value::from_bytes(&[0xff, b'a']);
        assert_eq!(unsafe { bad.as_str() }, None);
        assert_eq!(bad.to_string_lossy(), "\u{fffd}a");
    }

    #[test]
    fn copies_outlive_the_view() {
        let mut out = vec![9, 9, 9, 9];
        {
            let data = b"xyz".to_vec();
            let v = Value::new(&data);
            v.copy_into(&mut out);
            assert_eq!(v.to_vec(), b"xyz");
        }
        assert_eq!(out, b"xyz");
    }

    #[test]
    fn generation_stamp() {
        let generation = Cell::new(3);
        let data = b"engine";
        let raw = Value::new(data).raw();
        let v = Value::from_raw(raw, &generation);
        assert!(v.is_valid());
        assert_eq!(unsafe { v.as_bytes() }, b"engine");
        generation.set(4);
        assert!(!v.is_valid());
        assert!(format!("{:?}", v).contains("stale"));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "value view read after a write")]
    fn stale_borrow_panics_in_debug() {
        let generation = Cell::new(0);
        let raw = Value::new(b"x").raw();
        let v = Value::from_raw(raw, &generation);
        generation.set(1);
        let _ = unsafe { v.as_bytes() };
    }

    #[test]
    #[should_panic(expected = "value view read after a write")]
    fn stale_copy_panics_in_every_build() {
        let generation = Cell::new(0);
        let raw = Value::new(b"x").raw();
        let v = Value::from_raw(raw, &generation);
        generation.set(1);
        let _ = v.to_vec();
    }

    #[test]
    #[should_panic(expected = "value view read after a write")]
    fn stale_decode_panics_in_every_build() {
        let generation = Cell::new(0);
        let n = 7u64;
        let raw = Value::from_u64(&n).raw();
        let v = Value::from_raw(raw, &generation);
        generation.set(1);
        let _ = v.u64();
    }
}
