use std::path::PathBuf;

use crate::constants::{EnvFlags, DEFAULT_MODE};
use crate::types::Geometry;

/// Throughput oriented flags: no thread-local reader slots, writable map,
/// LIFO page reclaiming
pub const DEFAULT_FLAGS: EnvFlags = EnvFlags::SYNC_DURABLE
    .union(EnvFlags::NOTLS)
    .union(EnvFlags::WRITEMAP)
    .union(EnvFlags::LIFORECLAIM)
    .union(EnvFlags::NOMEMINIT)
    .union(EnvFlags::COALESCE);

/// Durable data, meta page synced lazily
pub const SIMPLE_FLAGS: EnvFlags = EnvFlags::NOMETASYNC.union(EnvFlags::SYNC_DURABLE);

/// 1 GiB initial map growing in 1 GiB steps up to 16 GiB, 64 KiB pages
pub const DEFAULT_GEOMETRY: Geometry = Geometry {
    size_lower: 1 << 30,
    size_now: 1 << 30,
    size_upper: 1 << 34,
    growth_step: 1 << 30,
    shrink_threshold: 1 << 31,
    page_size: 1 << 16,
};

/// Settings applied by [`Database::open`](crate::Database::open)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub path: PathBuf,
    pub flags: EnvFlags,
    pub geometry: Geometry,
    pub max_tables: u64,
    /// Dirty page limit of each write transaction
    pub txn_dp_limit: u64,
    /// File mode of created files
    pub mode: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            path: PathBuf::from("db"),
            flags: SIMPLE_FLAGS,
            geometry: DEFAULT_GEOMETRY,
            max_tables: 1024,
            txn_dp_limit: 1024,
            mode: DEFAULT_MODE,
        }
    }
}

impl Options {
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Options {
            path: path.into(),
            ..Options::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.path, PathBuf::from("db"));
        assert_eq!(opts.flags, EnvFlags::NOMETASYNC);
        assert_eq!(opts.geometry.size_upper, 16 << 30);
        assert_eq!(opts.max_tables, 1024);
        assert_eq!(opts.mode, 0o664);
        assert!(DEFAULT_FLAGS.contains(EnvFlags::NOTLS | EnvFlags::WRITEMAP));
        assert!(!DEFAULT_FLAGS.intersects(EnvFlags::SYNC_TIER));
    }
}
