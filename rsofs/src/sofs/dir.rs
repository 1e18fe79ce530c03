use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

use super::*;
use crate::sofs::inode::{PERM_W, PERM_X};

/// How a new directory entry binds to its inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
	/// Bind any kind of inode, initializing a directory's content on its
	/// first appearance.
	Add,
	/// Re-bind an already-initialized directory, rewiring its `..`.
	Attach,
}

/// How an entry is taken out of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemOp {
	/// Drop the reference and reclaim the target's storage when the last
	/// one goes.
	Remove,
	/// Only dissociate; the target keeps its storage.
	Detach,
}

pub(crate) fn name_ok(name: &[u8]) -> Result<()> {
	if name.is_empty() || name.contains(&b'/') || name.contains(&0) {
		return Err(Error::InvalidArgument);
	}
	if name.len() > MAX_NAME {
		return Err(Error::NameTooLong);
	}
	Ok(())
}

fn dir_capacity(size: u32) -> u32 {
	size / (DPC * DIR_ENTRY_SIZE) as u32 * DPC as u32
}

enum Slot {
	Found { inr: InodeNum, idx: u32 },
	Missing { free: Option<u32>, end: u32 },
}

impl<R: Backend> Sofs<R> {
	/// Walk every allocated slot of `dino`, looking for `name` and noting
	/// the first free slot as the insertion point.
	fn scan_dir(&mut self, dino: &Inode, name: &[u8]) -> Result<Slot> {
		let nclusters = dir_capacity(dino.size) / DPC as u32;
		let mut free: Option<u32> = None;
		for k in 0..nclusters {
			let ents = match self.lookup_ref(dino, k)? {
				Some(c) => dirents_of(&self.read_cluster(c)?)?,
				// a freed directory cluster reads as all-free slots
				None => [DirEntry::EMPTY; DPC],
			};
			for (j, e) in ents.iter().enumerate() {
				let idx = k * DPC as u32 + j as u32;
				if e.is_free() {
					if free.is_none() {
						free = Some(idx);
					}
					continue;
				}
				if e.name_bytes() == name {
					return Ok(Slot::Found { inr: e.inode, idx });
				}
			}
		}
		Ok(Slot::Missing {
			free,
			end: nclusters * DPC as u32,
		})
	}

	/// Look a name up in a directory; requires execute permission on it.
	pub(crate) fn get_dir_entry_by_name(
		&mut self,
		nd: InodeNum,
		name: &[u8],
	) -> Result<(InodeNum, u32)> {
		log::trace!(
			"get_dir_entry_by_name({nd}, {:?});",
			String::from_utf8_lossy(name)
		);
		name_ok(name)?;
		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&dino, PERM_X)?;
		match self.scan_dir(&dino, name)? {
			Slot::Found { inr, idx } => Ok((inr, idx)),
			Slot::Missing { .. } => Err(Error::DoesNotExist),
		}
	}

	/// Find the inode a name binds to, for the adapter.
	pub fn dir_lookup(&mut self, nd: InodeNum, name: &OsStr) -> Result<InodeNum> {
		self.get_dir_entry_by_name(nd, name.as_bytes()).map(|(inr, _)| inr)
	}

	/// Iterate through a directory and call `f` for each occupied slot.
	pub fn dir_iter<T>(
		&mut self,
		nd: InodeNum,
		mut f: impl FnMut(&OsStr, InodeNum, u32) -> Option<T>,
	) -> Result<Option<T>> {
		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		let nclusters = dir_capacity(dino.size) / DPC as u32;
		for k in 0..nclusters {
			let Some(c) = self.lookup_ref(&dino, k)? else {
				continue;
			};
			let ents = dirents_of(&self.read_cluster(c)?)?;
			for (j, e) in ents.iter().enumerate() {
				if e.is_free() {
					continue;
				}
				let idx = k * DPC as u32 + j as u32;
				if let Some(x) = f(OsStr::from_bytes(e.name_bytes()), e.inode, idx) {
					return Ok(Some(x));
				}
			}
		}
		Ok(None)
	}

	/// Write `{name, ne}` into slot `idx`, extending the directory by one
	/// cluster when the slot lies past the allocated content. The new
	/// cluster is persisted before the entry becomes visible.
	fn put_dir_entry(&mut self, nd: InodeNum, idx: u32, name: &[u8], ne: InodeNum) -> Result<()> {
		let k = idx / DPC as u32;
		let j = idx as usize % DPC;
		let mut dino = self.read_inode_raw(nd)?;
		let c = match self.lookup_ref(&dino, k)? {
			Some(c) => c,
			None => {
				let grown = idx >= dir_capacity(dino.size);
				let c = self.alloc_file_cluster(nd, k)?;
				let mut buf = self.read_cluster(c)?;
				set_dirents(&mut buf, &[DirEntry::EMPTY; DPC])?;
				self.write_cluster(c, &buf)?;
				if grown {
					let mut dino = self.read_inode_raw(nd)?;
					dino.size += (DPC * DIR_ENTRY_SIZE) as u32;
					self.write_inode(nd, IStatus::InUse, &mut dino)?;
				}
				c
			}
		};
		let mut buf = self.read_cluster(c)?;
		set_dirent(&mut buf, j, &DirEntry::new(name, ne))?;
		self.write_cluster(c, &buf)?;
		// the parent's times move on any content change
		dino = self.read_inode_raw(nd)?;
		self.write_inode(nd, IStatus::InUse, &mut dino)
	}

	/// Give a brand-new directory its first cluster with `.` and `..`.
	fn init_directory(&mut self, ne: InodeNum, tino: &mut Inode, parent: InodeNum) -> Result<()> {
		let c = self.alloc_file_cluster(ne, 0)?;
		let mut buf = self.read_cluster(c)?;
		let mut ents = [DirEntry::EMPTY; DPC];
		ents[0] = DirEntry::new(b".", ne);
		ents[1] = DirEntry::new(b"..", parent);
		set_dirents(&mut buf, &ents)?;
		self.write_cluster(c, &buf)?;
		*tino = self.read_inode_raw(ne)?;
		tino.size = (DPC * DIR_ENTRY_SIZE) as u32;
		tino.ref_count = 2;
		Ok(())
	}

	/// Bind `ne` under `name` in directory `nd`.
	pub(crate) fn add_attach_dir_entry(
		&mut self,
		nd: InodeNum,
		name: &[u8],
		ne: InodeNum,
		op: AddOp,
	) -> Result<()> {
		log::trace!(
			"add_attach_dir_entry({nd}, {:?}, {ne}, {op:?});",
			String::from_utf8_lossy(name)
		);
		name_ok(name)?;
		if name == b"." || name == b".." {
			return Err(Error::InvalidArgument);
		}
		self.valid_inum(ne)?;

		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&dino, PERM_W | PERM_X)?;

		let idx = match self.scan_dir(&dino, name)? {
			Slot::Found { .. } => return Err(Error::AlreadyExists),
			Slot::Missing { free, end } => free.unwrap_or(end),
		};

		let mut tino = self.read_inode(ne, IStatus::InUse)?;
		if tino.ref_count == REF_COUNT_MAX {
			return Err(Error::HardlinkLimit);
		}
		let child_dir = tino.kind() == InodeType::Directory;
		if child_dir && dino.ref_count == REF_COUNT_MAX {
			return Err(Error::HardlinkLimit);
		}

		match op {
			AddOp::Add => {
				if child_dir && tino.clu_count == 0 {
					self.init_directory(ne, &mut tino, nd)?;
				} else {
					tino.ref_count += 1;
				}
			}
			AddOp::Attach => {
				if !child_dir {
					return Err(Error::NotADirectory);
				}
				if tino.clu_count == 0 {
					return Err(Error::DirectoryInvalid);
				}
				let Some(c0) = self.lookup_ref(&tino, 0)? else {
					return Err(Error::DirectoryInvalid);
				};
				let mut buf = self.read_cluster(c0)?;
				let ents = dirents_of(&buf)?;
				if ents[1].name_bytes() != b".." {
					return Err(Error::DirectoryInvalid);
				}
				set_dirent(&mut buf, 1, &DirEntry::new(b"..", nd))?;
				self.write_cluster(c0, &buf)?;
				tino.ref_count += 1;
			}
		}

		self.put_dir_entry(nd, idx, name, ne)?;
		self.write_inode(ne, IStatus::InUse, &mut tino)?;

		if child_dir {
			let mut dino = self.read_inode_raw(nd)?;
			dino.ref_count += 1;
			self.write_inode(nd, IStatus::InUse, &mut dino)?;
		}
		Ok(())
	}

	/// Take `name` out of directory `nd`; returns the inode it bound.
	pub(crate) fn rem_detach_dir_entry(
		&mut self,
		nd: InodeNum,
		name: &[u8],
		op: RemOp,
	) -> Result<InodeNum> {
		log::trace!(
			"rem_detach_dir_entry({nd}, {:?}, {op:?});",
			String::from_utf8_lossy(name)
		);
		name_ok(name)?;
		if name == b"." || name == b".." {
			return Err(Error::InvalidArgument);
		}

		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&dino, PERM_W | PERM_X)?;

		let Slot::Found { inr: ne, idx } = self.scan_dir(&dino, name)? else {
			return Err(Error::DoesNotExist);
		};
		let mut tino = self.read_inode(ne, IStatus::InUse)?;
		let child_dir = tino.kind() == InodeType::Directory;

		// wipe the slot, then release the cluster if nothing is left in it
		let k = idx / DPC as u32;
		let j = idx as usize % DPC;
		let Some(c) = self.lookup_ref(&dino, k)? else {
			return Err(Error::DirectoryEntryInvalid);
		};
		let mut buf = self.read_cluster(c)?;
		set_dirent(&mut buf, j, &DirEntry::EMPTY)?;
		self.write_cluster(c, &buf)?;
		let ents = dirents_of(&buf)?;
		if k > 0 && ents.iter().all(|e| e.is_free()) {
			self.free_clean_file_cluster(nd, k)?;
		}

		match op {
			RemOp::Remove => {
				tino.ref_count -= if child_dir { 2 } else { 1 };
				self.write_inode(ne, IStatus::InUse, &mut tino)?;
				if tino.ref_count == 0 {
					self.free_all_clusters(ne)?;
					self.free_inode(ne)?;
				}
			}
			RemOp::Detach => {
				tino.ref_count -= 1;
				self.write_inode(ne, IStatus::InUse, &mut tino)?;
			}
		}

		let mut dino = self.read_inode_raw(nd)?;
		if child_dir {
			dino.ref_count -= 1;
		}
		self.write_inode(nd, IStatus::InUse, &mut dino)?;
		Ok(ne)
	}

	/// Overwrite an entry's name in place.
	pub(crate) fn rename_dir_entry(&mut self, nd: InodeNum, old: &[u8], new: &[u8]) -> Result<()> {
		log::trace!(
			"rename_dir_entry({nd}, {:?}, {:?});",
			String::from_utf8_lossy(old),
			String::from_utf8_lossy(new)
		);
		name_ok(old)?;
		name_ok(new)?;
		if old == b"." || old == b".." || new == b"." || new == b".." {
			return Err(Error::InvalidArgument);
		}

		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&dino, PERM_W | PERM_X)?;

		let Slot::Found { inr, idx } = self.scan_dir(&dino, old)? else {
			return Err(Error::DoesNotExist);
		};
		if let Slot::Found { .. } = self.scan_dir(&dino, new)? {
			return Err(Error::AlreadyExists);
		}

		let k = idx / DPC as u32;
		let Some(c) = self.lookup_ref(&dino, k)? else {
			return Err(Error::DirectoryEntryInvalid);
		};
		let mut buf = self.read_cluster(c)?;
		set_dirent(&mut buf, idx as usize % DPC, &DirEntry::new(new, inr))?;
		self.write_cluster(c, &buf)?;

		let mut dino = self.read_inode_raw(nd)?;
		self.write_inode(nd, IStatus::InUse, &mut dino)
	}

	/// Succeeds only when every slot besides `.` and `..` is free.
	pub(crate) fn check_directory_emptiness(&mut self, nd: InodeNum) -> Result<()> {
		log::trace!("check_directory_emptiness({nd});");
		let dino = self.read_inode(nd, IStatus::InUse)?;
		if dino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		let found = self.dir_iter(nd, |name, _, _| {
			if name.as_bytes() != b"." && name.as_bytes() != b".." {
				Some(())
			} else {
				None
			}
		})?;
		if found.is_some() {
			Err(Error::NotEmpty)
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod t {
	use super::*;

	#[test]
	fn name_validation() {
		assert!(name_ok(b"hello").is_ok());
		assert!(name_ok(&[b'a'; MAX_NAME]).is_ok());
		assert!(matches!(name_ok(b""), Err(Error::InvalidArgument)));
		assert!(matches!(name_ok(b"a/b"), Err(Error::InvalidArgument)));
		assert!(matches!(name_ok(b"a\0b"), Err(Error::InvalidArgument)));
		assert!(matches!(
			name_ok(&[b'a'; MAX_NAME + 1]),
			Err(Error::NameTooLong)
		));
	}

	#[test]
	fn capacity() {
		assert_eq!(dir_capacity(0), 0);
		assert_eq!(dir_capacity((DPC * DIR_ENTRY_SIZE) as u32), DPC as u32);
		assert_eq!(
			dir_capacity((2 * DPC * DIR_ENTRY_SIZE) as u32),
			2 * DPC as u32
		);
	}

	#[test]
	fn refcount_saturation_hits_the_hardlink_limit() {
		use std::io::Cursor;

		let mut bytes = vec![0u8; 1024 * BLOCK_SIZE];
		let len = bytes.len() as u64;
		let dev = RawDevice::new(Cursor::new(&mut bytes), len).unwrap();
		format_device(BlockCache::unbuffered(dev), &FormatOpts::default()).unwrap();
		let dev = RawDevice::new(Cursor::new(&mut bytes), len).unwrap();
		let mut fs = Sofs::new(BlockCache::new(dev)).unwrap();

		let n = fs
			.create_at(InodeNum::ROOT, b"target", InodeType::RegularFile, 0o644)
			.unwrap();

		// exactly the saturated value trips the limit
		let mut ino = fs.read_inode_raw(n).unwrap();
		ino.ref_count = REF_COUNT_MAX;
		fs.write_inode_raw(n, &ino).unwrap();
		assert!(matches!(
			fs.link_at(n, InodeNum::ROOT, b"again"),
			Err(Error::HardlinkLimit)
		));

		// one below still links, landing on the saturated value
		let mut ino = fs.read_inode_raw(n).unwrap();
		ino.ref_count = REF_COUNT_MAX - 1;
		fs.write_inode_raw(n, &ino).unwrap();
		fs.link_at(n, InodeNum::ROOT, b"again").unwrap();
		assert_eq!(fs.read_inode_raw(n).unwrap().ref_count, REF_COUNT_MAX);

		// a saturated parent cannot take another directory child
		let mut root = fs.read_inode_raw(InodeNum::ROOT).unwrap();
		let old = root.ref_count;
		root.ref_count = REF_COUNT_MAX;
		fs.write_inode_raw(InodeNum::ROOT, &root).unwrap();
		assert!(matches!(
			fs.create_at(InodeNum::ROOT, b"subdir", InodeType::Directory, 0o755),
			Err(Error::HardlinkLimit)
		));

		let mut root = fs.read_inode_raw(InodeNum::ROOT).unwrap();
		root.ref_count = old;
		fs.write_inode_raw(InodeNum::ROOT, &root).unwrap();
		assert!(fs
			.create_at(InodeNum::ROOT, b"subdir", InodeType::Directory, 0o755)
			.is_ok());
	}
}
