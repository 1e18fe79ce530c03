//! Structural predicates used as contract assertions by the upper layers.
//! All of them are side-effect free.

use crate::{
	error::{Error, Result},
	layout::*,
};

pub fn superblock_ok(sb: &Superblock, nblocks: u32) -> Result<()> {
	let ok = sb.magic == SOFS_MAGIC
		&& sb.version == SOFS_VERSION
		&& sb.ntotal == nblocks
		&& sb.itable_start == 1
		&& sb.itable_size >= 1
		&& sb.itotal == sb.itable_size * IPB as u32
		&& sb.ifree < sb.itotal
		&& sb.dzone_start == 1 + sb.itable_size
		&& sb.dzone_total >= 1
		&& sb.dzone_free < sb.dzone_total
		&& sb.dzone_start + sb.dzone_total * BLOCKS_PER_CLUSTER as u32 <= sb.ntotal
		&& sb.retrieval_idx <= DZC as u32
		&& sb.insertion_idx <= DZC as u32
		&& (sb.ihead.is_null() == (sb.ifree == 0))
		&& (sb.itail.is_null() == (sb.ifree == 0))
		&& (sb.dhead.is_null() == sb.dtail.is_null());
	if !ok {
		return Err(Error::LowerLevelInconsistency);
	}

	// every cached reference must address the data zone
	for i in sb.retrieval_idx as usize..DZC {
		if sb.retrieval[i].is_null() || sb.retrieval[i].get() >= sb.dzone_total {
			return Err(Error::LowerLevelInconsistency);
		}
	}
	for i in 0..sb.insertion_idx as usize {
		if sb.insertion[i].is_null() || sb.insertion[i].get() >= sb.dzone_total {
			return Err(Error::LowerLevelInconsistency);
		}
	}
	Ok(())
}

pub fn inode_in_use_ok(ino: &Inode) -> Result<()> {
	// refCount is deliberately unconstrained: allocation and rename windows
	// legitimately hold an in-use inode at zero references.
	let ok = !ino.is_free()
		&& InodeType::from_mode(ino.mode).is_some()
		&& ino.mode & !(S_IFMT | S_IPERM) == 0
		&& ino.size as u64 <= MAX_FILE_SIZE
		&& ino.clu_count <= MAX_FILE_CLUSTERS + RPC as u32 + 2
		&& matches!(ino.meta, InodeMeta::Times { .. });
	if ok {
		Ok(())
	} else {
		Err(Error::InUseInodeInvalid)
	}
}

pub fn inode_free_clean_ok(ino: &Inode) -> Result<()> {
	let ok = ino.mode == S_IFREE
		&& ino.ref_count == 0
		&& ino.owner == 0
		&& ino.group == 0
		&& ino.size == 0
		&& ino.clu_count == 0
		&& ino.direct.iter().all(|c| c.is_null())
		&& ino.i1.is_null()
		&& ino.i2.is_null()
		&& matches!(ino.meta, InodeMeta::FreeLink { .. });
	if ok {
		Ok(())
	} else {
		Err(Error::FreeCleanInodeInvalid)
	}
}

pub fn inode_free_dirty_ok(ino: &Inode) -> Result<()> {
	// residual references from the inode's prior life are permitted
	let ok = ino.is_free()
		&& InodeType::from_mode(ino.mode).is_some()
		&& ino.ref_count == 0
		&& matches!(ino.meta, InodeMeta::FreeLink { .. });
	if ok {
		Ok(())
	} else {
		Err(Error::FreeDirtyInodeInvalid)
	}
}

/// First cluster of an initialized directory: `.` and `..` at slots 0 and 1.
pub fn dir_first_cluster_ok(ents: &[DirEntry; DPC], this: InodeNum) -> Result<()> {
	let ok = ents[0].name_bytes() == b"."
		&& ents[0].inode == this
		&& ents[1].name_bytes() == b".."
		&& !ents[1].inode.is_null();
	if ok {
		Ok(())
	} else {
		Err(Error::DirectoryInvalid)
	}
}

#[cfg(test)]
mod t {
	use super::*;

	fn used_inode() -> Inode {
		Inode {
			mode:      S_IFREG | 0o644,
			ref_count: 1,
			owner:     100,
			group:     100,
			size:      5,
			clu_count: 1,
			meta:      InodeMeta::Times { atime: 1, mtime: 1 },
			direct:    [ClusterNum::NULL; N_DIRECT],
			i1:        ClusterNum::NULL,
			i2:        ClusterNum::NULL,
		}
	}

	#[test]
	fn in_use() {
		assert!(inode_in_use_ok(&used_inode()).is_ok());
		let mut bad = used_inode();
		bad.mode |= S_IFREE;
		assert!(matches!(inode_in_use_ok(&bad), Err(Error::InUseInodeInvalid)));
		let mut bad = used_inode();
		bad.mode = 0o644; // no type code
		assert!(inode_in_use_ok(&bad).is_err());
	}

	#[test]
	fn free_clean() {
		let ino = Inode {
			mode:      S_IFREE,
			ref_count: 0,
			owner:     0,
			group:     0,
			size:      0,
			clu_count: 0,
			meta:      InodeMeta::FreeLink {
				prev: InodeNum::NULL,
				next: InodeNum::NULL,
			},
			direct:    [ClusterNum::NULL; N_DIRECT],
			i1:        ClusterNum::NULL,
			i2:        ClusterNum::NULL,
		};
		assert!(inode_free_clean_ok(&ino).is_ok());
		assert!(matches!(
			inode_free_dirty_ok(&ino),
			Err(Error::FreeDirtyInodeInvalid)
		));

		let mut dirty = ino.clone();
		dirty.mode = S_IFREG | S_IFREE;
		dirty.direct[0] = ClusterNum::new(3);
		dirty.clu_count = 1;
		assert!(inode_free_clean_ok(&dirty).is_err());
		assert!(inode_free_dirty_ok(&dirty).is_ok());
	}

	#[test]
	fn dir_first_cluster() {
		let mut ents = [DirEntry::EMPTY; DPC];
		ents[0] = DirEntry::new(b".", InodeNum::ROOT);
		ents[1] = DirEntry::new(b"..", InodeNum::ROOT);
		assert!(dir_first_cluster_ok(&ents, InodeNum::ROOT).is_ok());
		assert!(matches!(
			dir_first_cluster_ok(&ents, InodeNum::new(4)),
			Err(Error::DirectoryInvalid)
		));
		ents[1] = DirEntry::EMPTY;
		assert!(dir_first_cluster_ok(&ents, InodeNum::ROOT).is_err());
	}
}
