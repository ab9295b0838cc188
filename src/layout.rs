//! Structures shared with the engine by pointer must match its layout exactly.
//! The check runs once per process, before the first environment is created.

use std::mem::{offset_of, size_of};

use log::error;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::ffi;
use crate::types::{Canary, Stat, TxnInfo};

static VERIFIED: Lazy<Result<()>> = Lazy::new(verify);

/// Result of the one-time layout check
pub(crate) fn ensure() -> Result<()> {
    *VERIFIED
}

fn check(name: &'static str, local: usize, native: usize) -> Result<()> {
    if local == native {
        return Ok(());
    }
    error!(
        "layout mismatch for {}: {} bytes locally, {} natively",
        name, local, native
    );
    Err(Error::LayoutMismatch {
        name,
        local,
        native,
    })
}

macro_rules! same_offset {
    ($name:literal, $local:ty, $lf:ident, $native:ty, $nf:ident) => {
        check($name, offset_of!($local, $lf), offset_of!($native, $nf))
    };
}

fn verify() -> Result<()> {
    check("MDBX_val", 2 * size_of::<usize>(), size_of::<ffi::MDBX_val>())?;

    check("MDBX_stat", size_of::<Stat>(), size_of::<ffi::MDBX_stat>())?;
    same_offset!("MDBX_stat.ms_depth", Stat, depth, ffi::MDBX_stat, ms_depth)?;
    same_offset!("MDBX_stat.ms_branch_pages", Stat, branch_pages, ffi::MDBX_stat, ms_branch_pages)?;
    same_offset!("MDBX_stat.ms_entries", Stat, entries, ffi::MDBX_stat, ms_entries)?;
    same_offset!("MDBX_stat.ms_mod_txnid", Stat, mod_txnid, ffi::MDBX_stat, ms_mod_txnid)?;

    check("MDBX_txn_info", size_of::<TxnInfo>(), size_of::<ffi::MDBX_txn_info>())?;
    same_offset!("MDBX_txn_info.txn_reader_lag", TxnInfo, reader_lag, ffi::MDBX_txn_info, txn_reader_lag)?;
    same_offset!("MDBX_txn_info.txn_space_dirty", TxnInfo, space_dirty, ffi::MDBX_txn_info, txn_space_dirty)?;

    check("MDBX_canary", size_of::<Canary>(), size_of::<ffi::MDBX_canary>())?;
    same_offset!("MDBX_canary.v", Canary, v, ffi::MDBX_canary, v)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mirrors_match_the_engine() {
        assert_eq!(ensure(), Ok(()));
        assert_eq!(size_of::<Stat>(), 48);
        assert_eq!(size_of::<TxnInfo>(), 64);
        assert_eq!(size_of::<Canary>(), 32);
    }

    #[test]
    fn mismatch_is_reported() {
        let err = check("sample", 8, 16).unwrap_err();
        assert_eq!(
            err,
            Error::LayoutMismatch {
                name: "sample",
                local: 8,
                native: 16
            }
        );
    }
}
