use std::{
	ffi::{c_int, OsStr},
	path::Path,
	time::{Duration, SystemTime},
};

use fuser::{FileAttr, Filesystem, KernelConfig, Request, TimeOrNow};
use rsofs::{Error, InodeNum, Result as SofsResult, PERM_R, PERM_W, PERM_X};

use crate::fs::Fs;

const TTL: Duration = Duration::from_secs(1);

fn run<T>(f: impl FnOnce() -> SofsResult<T>) -> Result<T, c_int> {
	f().map_err(|e| {
		if e.is_consistency() {
			log::error!("halting error: {e}");
		} else {
			log::debug!("{e}");
		}
		e.errno()
	})
}

/// FUSE inode numbers are the engine's shifted by one, so that
/// `FUSE_ROOT_ID` (1) lands on the root inode (0).
fn transino(ino: u64) -> SofsResult<InodeNum> {
	if ino == 0 || ino > u32::MAX as u64 {
		return Err(Error::InvalidArgument);
	}
	Ok(InodeNum::new((ino - 1) as u32))
}

fn timespec(t: TimeOrNow) -> u32 {
	let t = match t {
		TimeOrNow::SpecificTime(t) => t,
		TimeOrNow::Now => SystemTime::now(),
	};
	t.duration_since(SystemTime::UNIX_EPOCH)
		.map(|d| d.as_secs() as u32)
		.unwrap_or(0)
}

impl Fs {
	fn assert_rw(&self) -> SofsResult<()> {
		if self.ro {
			Err(Error::Io(std::io::Error::from_raw_os_error(libc::EROFS)))
		} else {
			Ok(())
		}
	}
}

impl Filesystem for Fs {
	fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
		Ok(())
	}

	fn destroy(&mut self) {
		if let Err(e) = self.sofs.unmount() {
			log::error!("unmount failed: {e}");
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: fuser::ReplyAttr) {
		let f = || {
			let inr = transino(ino)?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(x) => reply.attr(&TTL, &x),
			Err(e) => reply.error(e),
		}
	}

	fn lookup(&mut self, _req: &Request<'_>, pinr: u64, name: &OsStr, reply: fuser::ReplyEntry) {
		let f = || {
			let pinr = transino(pinr)?;
			let inr = self.sofs.dir_lookup(pinr, name)?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.entry(&TTL, &st, 0),
			Err(e) => reply.error(e),
		}
	}

	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		mode: Option<u32>,
		uid: Option<u32>,
		gid: Option<u32>,
		size: Option<u64>,
		atime: Option<TimeOrNow>,
		mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: fuser::ReplyAttr,
	) {
		let f = || {
			self.assert_rw()?;
			let inr = transino(ino)?;
			if let Some(mode) = mode {
				self.sofs.chmod_inode(inr, mode as u16)?;
			}
			if uid.is_some() || gid.is_some() {
				self.sofs.chown_inode(inr, uid, gid)?;
			}
			if let Some(size) = size {
				self.sofs.inode_truncate(inr, size)?;
			}
			if atime.is_some() || mtime.is_some() {
				let attr = self.sofs.inode_attr(inr)?;
				let old = |t: SystemTime| {
					t.duration_since(SystemTime::UNIX_EPOCH)
						.map(|d| d.as_secs() as u32)
						.unwrap_or(0)
				};
				let a = atime.map(timespec).unwrap_or(old(attr.atime));
				let m = mtime.map(timespec).unwrap_or(old(attr.mtime));
				self.sofs.utime_inode(inr, a, m)?;
			}
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.attr(&TTL, &st),
			Err(e) => reply.error(e),
		}
	}

	fn readdir(
		&mut self,
		_req: &Request<'_>,
		inr: u64,
		_fh: u64,
		offset: i64,
		mut reply: fuser::ReplyDirectory,
	) {
		let f = || {
			let inr = transino(inr)?;
			let mut entries = Vec::new();
			self.sofs.dir_iter(inr, |name, einr, _idx| {
				entries.push((name.to_owned(), einr));
				None::<()>
			})?;
			let mut i = offset;
			for (name, einr) in entries.into_iter().skip(offset as usize) {
				i += 1;
				let kind: fuser::FileType = self.sofs.inode_attr(einr)?.kind.into();
				if reply.add(einr.get64() + 1, i, kind, &name) {
					break;
				}
			}
			Ok(())
		};
		match run(f) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
		let _ = transino(ino);
		reply.opened(0, 0);
	}

	fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
		let _ = transino(ino);
		reply.opened(0, 0);
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: fuser::ReplyData,
	) {
		let f = || {
			let inr = transino(ino)?;
			let mut buffer = vec![0u8; size as usize];
			let n = self.sofs.inode_read(inr, offset as u64, &mut buffer)?;
			buffer.truncate(n);
			Ok(buffer)
		};
		match run(f) {
			Ok(buf) => reply.data(&buf),
			Err(e) => reply.error(e),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: fuser::ReplyWrite,
	) {
		let f = || {
			self.assert_rw()?;
			let inr = transino(ino)?;
			let n = self.sofs.inode_write(inr, offset as u64, data)?;
			Ok(n as u32)
		};
		match run(f) {
			Ok(n) => reply.written(n),
			Err(e) => reply.error(e),
		}
	}

	fn mknod(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_rdev: u32,
		reply: fuser::ReplyEntry,
	) {
		let f = || {
			self.assert_rw()?;
			if mode & libc::S_IFMT as u32 != libc::S_IFREG as u32 {
				return Err(Error::OperationNotPermitted);
			}
			let pinr = transino(parent)?;
			let inr = self.sofs.create_at(
				pinr,
				name.as_encoded_bytes(),
				rsofs::InodeType::RegularFile,
				mode as u16,
			)?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.entry(&TTL, &st, 0),
			Err(e) => reply.error(e),
		}
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		reply: fuser::ReplyEntry,
	) {
		let f = || {
			self.assert_rw()?;
			let pinr = transino(parent)?;
			let inr = self.sofs.create_at(
				pinr,
				name.as_encoded_bytes(),
				rsofs::InodeType::Directory,
				mode as u16,
			)?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.entry(&TTL, &st, 0),
			Err(e) => reply.error(e),
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: fuser::ReplyEmpty) {
		let f = || {
			self.assert_rw()?;
			let pinr = transino(parent)?;
			self.sofs.unlink_at(pinr, name.as_encoded_bytes())
		};
		match run(f) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: fuser::ReplyEmpty) {
		let f = || {
			self.assert_rw()?;
			let pinr = transino(parent)?;
			self.sofs.rmdir_at(pinr, name.as_encoded_bytes())
		};
		match run(f) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn rename(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		newparent: u64,
		newname: &OsStr,
		_flags: u32,
		reply: fuser::ReplyEmpty,
	) {
		let f = || {
			self.assert_rw()?;
			let fd = transino(parent)?;
			let td = transino(newparent)?;
			self.sofs
				.rename_at(fd, name.as_encoded_bytes(), td, newname.as_encoded_bytes())
		};
		match run(f) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn link(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		newparent: u64,
		newname: &OsStr,
		reply: fuser::ReplyEntry,
	) {
		let f = || {
			self.assert_rw()?;
			let inr = transino(ino)?;
			let td = transino(newparent)?;
			self.sofs.link_at(inr, td, newname.as_encoded_bytes())?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.entry(&TTL, &st, 0),
			Err(e) => reply.error(e),
		}
	}

	fn symlink(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		link_name: &OsStr,
		target: &Path,
		reply: fuser::ReplyEntry,
	) {
		let f = || {
			self.assert_rw()?;
			let pinr = transino(parent)?;
			let target = target.to_str().ok_or(Error::InvalidArgument)?;
			let inr = self
				.sofs
				.symlink_at(pinr, link_name.as_encoded_bytes(), target)?;
			let st: FileAttr = self.sofs.inode_attr(inr)?.into();
			Ok(st)
		};
		match run(f) {
			Ok(st) => reply.entry(&TTL, &st, 0),
			Err(e) => reply.error(e),
		}
	}

	fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: fuser::ReplyData) {
		let f = || {
			let inr = transino(ino)?;
			self.sofs.readlink_inode(inr)
		};
		match run(f) {
			Ok(target) => reply.data(target.as_bytes()),
			Err(e) => reply.error(e),
		}
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
		let info = self.sofs.info();
		reply.statfs(
			info.clusters,
			info.cfree,
			info.cfree,
			info.files,
			info.ffree,
			info.csize,
			rsofs::MAX_NAME as u32,
			info.csize,
		);
	}

	fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: fuser::ReplyEmpty) {
		let f = || {
			let inr = transino(ino)?;
			if mask == libc::F_OK {
				self.sofs.inode_attr(inr)?;
				return Ok(());
			}
			let mut want = 0u8;
			if mask & libc::R_OK != 0 {
				want |= PERM_R;
			}
			if mask & libc::W_OK != 0 {
				want |= PERM_W;
			}
			if mask & libc::X_OK != 0 {
				want |= PERM_X;
			}
			self.sofs.access_inode(inr, want)
		};
		match run(f) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _ds: bool, reply: fuser::ReplyEmpty) {
		match run(|| self.sofs.sync()) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}

	fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lo: u64, reply: fuser::ReplyEmpty) {
		match run(|| self.sofs.sync()) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e),
		}
	}
}
