use super::*;
use crate::sofs::{
	dir::name_ok,
	inode::{PERM_R, PERM_W},
	path::validate_path,
};

impl<R: Backend> Sofs<R> {
	// -- inode-addressed workers, shared by the path API and the adapter --

	/// Allocate an inode of `kind` with `perm` and bind it under `name`.
	pub fn create_at(
		&mut self,
		nd: InodeNum,
		name: &[u8],
		kind: InodeType,
		perm: u16,
	) -> Result<InodeNum> {
		log::trace!(
			"create_at({nd}, {:?}, {kind:?}, {perm:o});",
			String::from_utf8_lossy(name)
		);
		name_ok(name)?;
		match self.get_dir_entry_by_name(nd, name) {
			Ok(_) => return Err(Error::AlreadyExists),
			Err(Error::DoesNotExist) => {}
			Err(e) => return Err(e),
		}
		let n = self.alloc_inode(kind)?;
		let mut ino = self.read_inode_raw(n)?;
		ino.mode |= perm & S_IPERM;
		self.write_inode_raw(n, &ino)?;
		if let Err(e) = self.add_attach_dir_entry(nd, name, n, AddOp::Add) {
			// put the fresh inode back rather than leak it
			if let Err(e2) = self.free_inode(n) {
				log::warn!("create_at({nd}): rollback of inode {n} failed: {e2}");
			}
			return Err(e);
		}
		Ok(n)
	}

	/// Drop a non-directory entry, reclaiming the inode on last unlink.
	pub fn unlink_at(&mut self, nd: InodeNum, name: &[u8]) -> Result<()> {
		log::trace!("unlink_at({nd}, {:?});", String::from_utf8_lossy(name));
		let (ne, _) = self.get_dir_entry_by_name(nd, name)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() == InodeType::Directory {
			return Err(Error::IsADirectory);
		}
		self.rem_detach_dir_entry(nd, name, RemOp::Remove)?;
		Ok(())
	}

	/// Drop an empty directory.
	pub fn rmdir_at(&mut self, nd: InodeNum, name: &[u8]) -> Result<()> {
		log::trace!("rmdir_at({nd}, {:?});", String::from_utf8_lossy(name));
		let (ne, _) = self.get_dir_entry_by_name(nd, name)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_directory_emptiness(ne)?;
		self.rem_detach_dir_entry(nd, name, RemOp::Remove)?;
		Ok(())
	}

	/// Bind an existing inode under one more name.
	pub fn link_at(&mut self, src: InodeNum, nd: InodeNum, name: &[u8]) -> Result<()> {
		log::trace!("link_at({src}, {nd}, {:?});", String::from_utf8_lossy(name));
		let ino = self.read_inode(src, IStatus::InUse)?;
		if ino.kind() == InodeType::Directory {
			return Err(Error::OperationNotPermitted);
		}
		self.add_attach_dir_entry(nd, name, src, AddOp::Add)
	}

	/// Create a symbolic link carrying `target`.
	pub fn symlink_at(&mut self, nd: InodeNum, name: &[u8], target: &str) -> Result<InodeNum> {
		log::trace!(
			"symlink_at({nd}, {:?}, {target:?});",
			String::from_utf8_lossy(name)
		);
		if target.is_empty() {
			return Err(Error::InvalidArgument);
		}
		if target.len() > MAX_PATH {
			return Err(Error::NameTooLong);
		}
		let n = self.create_at(nd, name, InodeType::Symlink, 0o777)?;
		// the stored path lives NUL-terminated in the first cluster
		let mut body = [0u8; BSLPC];
		body[..target.len()].copy_from_slice(target.as_bytes());
		self.write_file_cluster(n, 0, &body)?;
		let mut ino = self.read_inode_raw(n)?;
		ino.size = target.len() as u32;
		self.write_inode(n, IStatus::InUse, &mut ino)?;
		Ok(n)
	}

	/// Read the path stored in a symlink.
	pub fn readlink_inode(&mut self, inr: InodeNum) -> Result<String> {
		log::trace!("readlink_inode({inr});");
		let ino = self.read_inode(inr, IStatus::InUse)?;
		if ino.kind() != InodeType::Symlink {
			return Err(Error::InvalidArgument);
		}
		self.check_access(&ino, PERM_R)?;
		self.symlink_target(inr, &ino)
	}

	/// Move `fname` in `fd` to `tname` in `td`, replacing a compatible
	/// existing target.
	pub fn rename_at(
		&mut self,
		fd: InodeNum,
		fname: &[u8],
		td: InodeNum,
		tname: &[u8],
	) -> Result<()> {
		log::trace!(
			"rename_at({fd}, {:?}, {td}, {:?});",
			String::from_utf8_lossy(fname),
			String::from_utf8_lossy(tname)
		);
		let (fe, _) = self.get_dir_entry_by_name(fd, fname)?;
		let fino = self.read_inode(fe, IStatus::InUse)?;
		let moving_dir = fino.kind() == InodeType::Directory;

		let existing = match self.get_dir_entry_by_name(td, tname) {
			Ok((e, _)) => Some(e),
			Err(Error::DoesNotExist) => None,
			Err(e) => return Err(e),
		};
		if existing == Some(fe) {
			return Ok(());
		}

		if let Some(te) = existing {
			let tino = self.read_inode(te, IStatus::InUse)?;
			match (moving_dir, tino.kind() == InodeType::Directory) {
				(false, true) => return Err(Error::IsADirectory),
				(true, false) => return Err(Error::NotADirectory),
				(true, true) => {
					self.check_directory_emptiness(te)?;
					self.rmdir_at(td, tname)?;
				}
				(false, false) => self.unlink_at(td, tname)?,
			}
		}

		if moving_dir {
			self.ensure_not_ancestor(fe, td)?;
		}

		if fd == td {
			return self.rename_dir_entry(fd, fname, tname);
		}

		self.rem_detach_dir_entry(fd, fname, RemOp::Detach)?;
		let op = if moving_dir { AddOp::Attach } else { AddOp::Add };
		self.add_attach_dir_entry(td, tname, fe, op)
	}

	/// Refuse to move a directory underneath itself.
	fn ensure_not_ancestor(&mut self, node: InodeNum, mut d: InodeNum) -> Result<()> {
		let mut steps = 0u32;
		loop {
			if d == node {
				return Err(Error::InvalidArgument);
			}
			if d == InodeNum::ROOT {
				return Ok(());
			}
			steps += 1;
			if steps > self.sb.itotal {
				return Err(Error::DirectoryInvalid);
			}
			let (p, _) = self.get_dir_entry_by_name(d, b"..")?;
			d = p;
		}
	}

	// -- the path-addressed API --

	/// Get filesystem statistics; `path` only has to resolve.
	pub fn statfs(&mut self, path: &str) -> Result<Info> {
		log::trace!("statfs({path:?});");
		self.get_dir_entry_by_path(path)?;
		Ok(self.info())
	}

	/// Get the attributes of the entry a path names (the link itself for a
	/// symlink).
	pub fn stat(&mut self, path: &str) -> Result<InodeAttr> {
		log::trace!("stat({path:?});");
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		self.inode_attr(ne)
	}

	/// Check real-user permissions on a path; a zero mask tests existence.
	pub fn access(&mut self, path: &str, want: u8) -> Result<()> {
		log::trace!("access({path:?}, {want});");
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if want == 0 {
			return Ok(());
		}
		self.check_access(&ino, want)
	}

	pub fn chmod(&mut self, path: &str, perm: u16) -> Result<()> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		self.chmod_inode(ne, perm)
	}

	pub fn chown(&mut self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		self.chown_inode(ne, uid, gid)
	}

	pub fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> Result<()> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		self.utime_inode(ne, atime, mtime)
	}

	/// Create a regular file.
	pub fn mknod(&mut self, path: &str, perm: u16) -> Result<()> {
		log::trace!("mknod({path:?}, {perm:o});");
		let (nd, base) = self.resolve_parent(path)?;
		self.create_at(nd, base.as_bytes(), InodeType::RegularFile, perm)?;
		Ok(())
	}

	/// Validate that a file may be opened with the wanted access.
	pub fn open(&mut self, path: &str, want: u8) -> Result<()> {
		log::trace!("open({path:?}, {want});");
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() == InodeType::Directory && want & PERM_W != 0 {
			return Err(Error::IsADirectory);
		}
		self.check_access(&ino, want)
	}

	pub fn close(&mut self, path: &str) -> Result<()> {
		self.get_dir_entry_by_path(path)?;
		Ok(())
	}

	/// Push all pending state of the volume to the device.
	pub fn fsync(&mut self, path: &str) -> Result<()> {
		self.get_dir_entry_by_path(path)?;
		self.sync()
	}

	pub fn read(&mut self, path: &str, buf: &mut [u8], pos: u64) -> Result<usize> {
		let ne = self.regular_file_at(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		self.check_access(&ino, PERM_R)?;
		self.inode_read(ne, pos, buf)
	}

	pub fn write(&mut self, path: &str, buf: &[u8], pos: u64) -> Result<usize> {
		let ne = self.regular_file_at(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		self.check_access(&ino, PERM_W)?;
		self.inode_write(ne, pos, buf)
	}

	pub fn truncate(&mut self, path: &str, length: u64) -> Result<()> {
		let ne = self.regular_file_at(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		self.check_access(&ino, PERM_W)?;
		self.inode_truncate(ne, length)
	}

	fn regular_file_at(&mut self, path: &str) -> Result<InodeNum> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		match ino.kind() {
			InodeType::RegularFile => Ok(ne),
			InodeType::Directory => Err(Error::IsADirectory),
			InodeType::Symlink => Err(Error::InvalidArgument),
		}
	}

	pub fn mkdir(&mut self, path: &str, perm: u16) -> Result<()> {
		log::trace!("mkdir({path:?}, {perm:o});");
		let (nd, base) = self.resolve_parent(path)?;
		self.create_at(nd, base.as_bytes(), InodeType::Directory, perm)?;
		Ok(())
	}

	pub fn rmdir(&mut self, path: &str) -> Result<()> {
		log::trace!("rmdir({path:?});");
		let (nd, base) = self.resolve_parent(path)?;
		self.rmdir_at(nd, base.as_bytes())
	}

	pub fn opendir(&mut self, path: &str) -> Result<()> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&ino, PERM_R)
	}

	pub fn closedir(&mut self, path: &str) -> Result<()> {
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		Ok(())
	}

	/// The first occupied entry at or after slot `pos`, with the position
	/// to continue from; `None` past the end.
	pub fn readdir(&mut self, path: &str, pos: u32) -> Result<Option<(String, InodeNum, u32)>> {
		log::trace!("readdir({path:?}, {pos});");
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		if ino.kind() != InodeType::Directory {
			return Err(Error::NotADirectory);
		}
		self.check_access(&ino, PERM_R)?;
		self.dir_iter(ne, |name, inr, idx| {
			if idx >= pos {
				Some((
					String::from_utf8_lossy(name.as_encoded_bytes()).into_owned(),
					inr,
					idx + 1,
				))
			} else {
				None
			}
		})
	}

	pub fn link(&mut self, old: &str, new: &str) -> Result<()> {
		log::trace!("link({old:?}, {new:?});");
		let (_, fe) = self.get_dir_entry_by_path(old)?;
		let (td, base) = self.resolve_parent(new)?;
		self.link_at(fe, td, base.as_bytes())
	}

	pub fn unlink(&mut self, path: &str) -> Result<()> {
		log::trace!("unlink({path:?});");
		let (nd, base) = self.resolve_parent(path)?;
		self.unlink_at(nd, base.as_bytes())
	}

	pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
		log::trace!("rename({from:?}, {to:?});");
		let (fd, fbase) = self.resolve_parent(from)?;
		let (td, tbase) = self.resolve_parent(to)?;
		self.rename_at(fd, fbase.as_bytes(), td, tbase.as_bytes())
	}

	pub fn symlink(&mut self, target: &str, path: &str) -> Result<()> {
		log::trace!("symlink({target:?}, {path:?});");
		validate_path(target)?;
		let (nd, base) = self.resolve_parent(path)?;
		self.symlink_at(nd, base.as_bytes(), target)?;
		Ok(())
	}

	pub fn readlink(&mut self, path: &str) -> Result<String> {
		log::trace!("readlink({path:?});");
		let (_, ne) = self.get_dir_entry_by_path(path)?;
		self.readlink_inode(ne)
	}
}
