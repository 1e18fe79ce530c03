use super::*;
use crate::check;

impl<R: Backend> Sofs<R> {
	/// Take the inode at the head of the free list and initialize it.
	///
	/// A recycled inode may still carry the reference tree of its prior
	/// life; it is cleaned here, lazily, before being handed out.
	pub(crate) fn alloc_inode(&mut self, kind: InodeType) -> Result<InodeNum> {
		log::trace!("alloc_inode({kind:?});");
		if self.sb.ifree == 0 {
			return Err(Error::NoInodes);
		}
		let n = self.sb.ihead;
		if n.is_null() {
			return Err(Error::ReferenceListInvalid);
		}

		let mut ino = self.read_inode_raw(n)?;
		if check::inode_free_clean_ok(&ino).is_err() {
			check::inode_free_dirty_ok(&ino)?;
			self.clean_inode(n)?;
			ino = self.read_inode_raw(n)?;
		}
		let InodeMeta::FreeLink { next, .. } = ino.meta else {
			return Err(Error::ReferenceListInvalid);
		};

		// detach the head
		self.sb.ihead = next;
		if next.is_null() {
			self.sb.itail = InodeNum::NULL;
		} else {
			let mut nx = self.read_inode_raw(next)?;
			let InodeMeta::FreeLink { next: nn, .. } = nx.meta else {
				return Err(Error::ReferenceListInvalid);
			};
			nx.meta = InodeMeta::FreeLink {
				prev: InodeNum::NULL,
				next: nn,
			};
			self.write_inode_raw(next, &nx)?;
		}

		let now = unix_now();
		ino = Inode {
			mode:      kind.as_mode(),
			ref_count: 0,
			owner:     self.uid,
			group:     self.gid,
			size:      0,
			clu_count: 0,
			meta:      InodeMeta::Times { atime: now, mtime: now },
			direct:    [ClusterNum::NULL; N_DIRECT],
			i1:        ClusterNum::NULL,
			i2:        ClusterNum::NULL,
		};
		self.write_inode_raw(n, &ino)?;

		self.sb.ifree -= 1;
		self.store_sb()?;
		Ok(n)
	}

	/// Append an unreferenced inode at the tail of the free list.
	///
	/// The reference vectors are left intact; cleanup happens lazily when
	/// the inode is reallocated.
	pub(crate) fn free_inode(&mut self, n: InodeNum) -> Result<()> {
		log::trace!("free_inode({n});");
		if n == InodeNum::ROOT {
			return Err(Error::InvalidArgument);
		}
		let mut ino = self.read_inode_raw(n)?;
		if ino.is_free() || ino.ref_count != 0 {
			return Err(Error::InvalidArgument);
		}

		ino.mode |= S_IFREE;
		ino.meta = InodeMeta::FreeLink {
			prev: self.sb.itail,
			next: InodeNum::NULL,
		};
		self.write_inode_raw(n, &ino)?;

		if self.sb.itail.is_null() {
			self.sb.ihead = n;
		} else {
			let tail = self.sb.itail;
			let mut tl = self.read_inode_raw(tail)?;
			let InodeMeta::FreeLink { prev, .. } = tl.meta else {
				return Err(Error::ReferenceListInvalid);
			};
			tl.meta = InodeMeta::FreeLink { prev, next: n };
			self.write_inode_raw(tail, &tl)?;
		}
		self.sb.itail = n;

		self.sb.ifree += 1;
		self.store_sb()
	}
}
