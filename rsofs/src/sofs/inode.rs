use super::*;
use crate::check;

/// Which state an inode is required to be in when read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IStatus {
	InUse,
	FreeDirty,
}

// permission bits used by access checks
pub const PERM_R: u8 = 4;
pub const PERM_W: u8 = 2;
pub const PERM_X: u8 = 1;

impl<R: Backend> Sofs<R> {
	pub(crate) fn read_inode_raw(&mut self, n: InodeNum) -> Result<Inode> {
		self.valid_inum(n)?;
		let (blk, off) = self.sb.inode_block(n);
		let buf = self.disk.read_block(blk)?;
		decode_at(&buf, off)
	}

	pub(crate) fn write_inode_raw(&mut self, n: InodeNum, ino: &Inode) -> Result<()> {
		self.valid_inum(n)?;
		let (blk, off) = self.sb.inode_block(n);
		let mut buf = self.disk.read_block(blk)?;
		encode_at(&mut buf, off, ino)?;
		self.disk.write_block(blk, &buf)
	}

	/// Load an inode, validate it against `status` and return a snapshot.
	///
	/// Reading an in-use inode refreshes its access time on disk, so even
	/// lookups mutate metadata; the adapter serializes all calls.
	pub(crate) fn read_inode(&mut self, n: InodeNum, status: IStatus) -> Result<Inode> {
		log::trace!("read_inode({n}, {status:?});");
		let mut ino = self.read_inode_raw(n)?;
		match status {
			IStatus::InUse => {
				check::inode_in_use_ok(&ino)?;
				let (_, mtime) = ino.times();
				ino.meta = InodeMeta::Times {
					atime: unix_now(),
					mtime,
				};
				self.write_inode_raw(n, &ino)?;
			}
			IStatus::FreeDirty => check::inode_free_dirty_ok(&ino)?,
		}
		Ok(ino)
	}

	/// Validate and store an inode snapshot.
	pub(crate) fn write_inode(&mut self, n: InodeNum, status: IStatus, ino: &mut Inode) -> Result<()> {
		log::trace!("write_inode({n}, {status:?});");
		match status {
			IStatus::InUse => {
				let now = unix_now();
				ino.meta = InodeMeta::Times {
					atime: now,
					mtime: now,
				};
				check::inode_in_use_ok(ino)?;
			}
			IStatus::FreeDirty => check::inode_free_dirty_ok(ino)?,
		}
		self.write_inode_raw(n, ino)
	}

	/// Dissociate every cluster a dirty free inode still references.
	///
	/// Used when a recycled inode is handed out again; afterwards the inode
	/// has no references left and `cluCount == 0`.
	pub(crate) fn clean_inode(&mut self, n: InodeNum) -> Result<()> {
		log::trace!("clean_inode({n});");
		if n == InodeNum::ROOT {
			return Err(Error::InvalidArgument);
		}
		self.clean_all_clusters(n)
	}

	/// Get metadata about an inode.
	#[doc(alias("stat", "getattr"))]
	pub fn inode_attr(&mut self, inr: InodeNum) -> Result<InodeAttr> {
		log::trace!("inode_attr({inr});");
		let ino = self.read_inode(inr, IStatus::InUse)?;
		Ok(ino.as_attr(inr))
	}

	/// Check `want` (a mask of [`PERM_R`], [`PERM_W`], [`PERM_X`]) against
	/// the inode's permission bits and the mount credentials.
	pub(crate) fn check_access(&self, ino: &Inode, want: u8) -> Result<()> {
		let perm = ino.perm();
		let have = if self.uid == 0 {
			// root may do anything except execute a file with no x bit at all
			PERM_R | PERM_W | if perm & 0o111 != 0 { PERM_X } else { 0 }
		} else {
			let shift = if self.uid == ino.owner {
				6
			} else if self.gid == ino.group {
				3
			} else {
				0
			};
			((perm >> shift) & 0o7) as u8
		};
		if have & want == want {
			Ok(())
		} else {
			Err(Error::AccessDenied)
		}
	}

	/// Permission check addressed by inode, for the adapter.
	pub fn access_inode(&mut self, inr: InodeNum, want: u8) -> Result<()> {
		let ino = self.read_inode(inr, IStatus::InUse)?;
		self.check_access(&ino, want)
	}

	/// Change the permission bits; only the owner (or root) may.
	pub fn chmod_inode(&mut self, inr: InodeNum, perm: u16) -> Result<()> {
		log::trace!("chmod_inode({inr}, {perm:o});");
		let mut ino = self.read_inode(inr, IStatus::InUse)?;
		if self.uid != 0 && self.uid != ino.owner {
			return Err(Error::OperationNotPermitted);
		}
		ino.mode = (ino.mode & !S_IPERM) | (perm & S_IPERM);
		self.write_inode(inr, IStatus::InUse, &mut ino)
	}

	/// Change owner and/or group.
	pub fn chown_inode(&mut self, inr: InodeNum, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
		log::trace!("chown_inode({inr}, {uid:?}, {gid:?});");
		let mut ino = self.read_inode(inr, IStatus::InUse)?;
		if let Some(uid) = uid {
			// only root may give a file away
			if self.uid != 0 && uid != ino.owner {
				return Err(Error::OperationNotPermitted);
			}
			ino.owner = uid;
		}
		if let Some(gid) = gid {
			if self.uid != 0 && self.uid != ino.owner {
				return Err(Error::OperationNotPermitted);
			}
			ino.group = gid;
		}
		self.write_inode(inr, IStatus::InUse, &mut ino)
	}

	/// Set access and modification times explicitly.
	pub fn utime_inode(&mut self, inr: InodeNum, atime: u32, mtime: u32) -> Result<()> {
		log::trace!("utime_inode({inr}, {atime}, {mtime});");
		let mut ino = self.read_inode(inr, IStatus::InUse)?;
		if self.uid != 0 && self.uid != ino.owner {
			self.check_access(&ino, PERM_W)?;
		}
		ino.meta = InodeMeta::Times { atime, mtime };
		check::inode_in_use_ok(&ino)?;
		self.write_inode_raw(inr, &ino)
	}
}
