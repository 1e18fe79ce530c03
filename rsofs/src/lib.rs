#![cfg_attr(fuzzing, allow(dead_code, unused_imports, unused_mut))]

mod cache;
mod check;
mod device;
mod error;
mod layout;
mod sofs;

/// Nodes held by the block cache.
pub(crate) const BCACHE_SIZE: usize = 64;

pub(crate) fn new_lru<K: std::hash::Hash + Eq, V>(n: usize) -> lru::LruCache<K, V> {
	lru::LruCache::new(std::num::NonZeroUsize::new(n).unwrap())
}

pub use crate::{
	cache::BlockCache,
	device::{Backend, RawDevice},
	error::{Error, Result},
	layout::{
		byte_location, inode_location, ClusterHeader, ClusterNum, DirEntry, Inode, InodeAttr,
		InodeMeta, InodeNum, InodeType, Superblock, BLOCKS_PER_CLUSTER, BLOCK_SIZE, BSLPC,
		CLUSTER_SIZE, DIR_ENTRY_SIZE, DPC, DZC, INODE_SIZE, IPB, MAX_FILE_CLUSTERS, MAX_FILE_SIZE,
		MAX_NAME, MAX_PATH, MSTAT_IN_USE, MSTAT_PROPERLY_UNMOUNTED, N_DIRECT, REF_COUNT_MAX, RPC,
		SOFS_MAGIC, SOFS_VERSION,
	},
	sofs::{
		format, format_device, AddOp, FormatOpts, Geometry, IStatus, Info, RemOp, Sofs, PERM_R,
		PERM_W, PERM_X,
	},
};

#[cfg(feature = "fuser")]
mod f {
	use fuser::{FileAttr, FileType};

	use crate::{layout::CLUSTER_SIZE, InodeAttr, InodeType};

	impl From<InodeType> for FileType {
		fn from(t: InodeType) -> Self {
			match t {
				InodeType::RegularFile => Self::RegularFile,
				InodeType::Directory => Self::Directory,
				InodeType::Symlink => Self::Symlink,
			}
		}
	}

	impl From<InodeAttr> for FileAttr {
		fn from(a: InodeAttr) -> Self {
			Self {
				ino:     a.inr.get64() + 1,
				size:    a.size,
				blocks:  a.clusters * 4,
				atime:   a.atime,
				mtime:   a.mtime,
				ctime:   a.mtime,
				crtime:  a.mtime,
				kind:    a.kind.into(),
				perm:    a.perm,
				nlink:   a.nlink.into(),
				uid:     a.uid,
				gid:     a.gid,
				rdev:    0,
				blksize: CLUSTER_SIZE as u32,
				flags:   0,
			}
		}
	}
}
