use super::*;
use crate::sofs::inode::{PERM_R, PERM_X};

/// Split an absolute path into (dirname, basename), POSIX style.
/// The input must start with '/' and must not be just "/".
fn split_path(path: &str) -> (&str, &str) {
	let trimmed = path.trim_end_matches('/');
	let cut = trimmed.rfind('/').unwrap();
	let base = &trimmed[cut + 1..];
	let dir = if cut == 0 { "/" } else { &trimmed[..cut] };
	(dir, base)
}

impl<R: Backend> Sofs<R> {
	/// Resolve an absolute path to `(parent directory inode, entry inode)`.
	///
	/// The final component is returned as-is; a symlink encountered while
	/// descending through the directories is followed, once. A second
	/// symlink in the same resolution fails with `TooManyLinks`.
	pub fn get_dir_entry_by_path(&mut self, path: &str) -> Result<(InodeNum, InodeNum)> {
		log::trace!("get_dir_entry_by_path({path:?});");
		validate_path(path)?;
		let mut budget = 1u32;
		self.traverse(path, &mut budget)
	}

	/// Resolve the parent directory of `path` and hand back the basename,
	/// whether or not the entry itself exists.
	pub(crate) fn resolve_parent<'a>(&mut self, path: &'a str) -> Result<(InodeNum, &'a str)> {
		validate_path(path)?;
		if path.trim_end_matches('/').is_empty() {
			// the root has no parent entry to speak of
			return Err(Error::InvalidArgument);
		}
		let (dir, base) = split_path(path);
		let mut budget = 1u32;
		let dinr = self.resolve_dir(dir, &mut budget)?;
		Ok((dinr, base))
	}

	fn traverse(&mut self, path: &str, budget: &mut u32) -> Result<(InodeNum, InodeNum)> {
		if path.trim_end_matches('/').is_empty() {
			return Ok((InodeNum::ROOT, InodeNum::ROOT));
		}
		let (dir, base) = split_path(path);
		let dinr = self.resolve_dir(dir, budget)?;
		let (ne, _) = self.get_dir_entry_by_name(dinr, base.as_bytes())?;
		Ok((dinr, ne))
	}

	/// Resolve `path` to a directory inode, dereferencing a trailing
	/// symlink against the indirection budget.
	fn resolve_dir(&mut self, path: &str, budget: &mut u32) -> Result<InodeNum> {
		let (_, ne) = self.traverse(path, budget)?;
		let ino = self.read_inode(ne, IStatus::InUse)?;
		match ino.kind() {
			InodeType::Directory => Ok(ne),
			InodeType::RegularFile => Err(Error::NotADirectory),
			InodeType::Symlink => {
				if *budget == 0 {
					return Err(Error::TooManyLinks);
				}
				*budget -= 1;
				self.check_access(&ino, PERM_R | PERM_X)?;
				let target = self.symlink_target(ne, &ino)?;
				validate_path(&target)?;
				self.resolve_dir(&target, budget)
			}
		}
	}

	/// The stored path of a symlink: the body of its first cluster up to
	/// the terminating NUL.
	pub(crate) fn symlink_target(&mut self, ne: InodeNum, ino: &Inode) -> Result<String> {
		let Some(c) = self.lookup_ref(ino, 0)? else {
			return Err(Error::DirectoryEntryInvalid);
		};
		let buf = self.read_cluster(c)?;
		let body = body_of(&buf);
		let len = (ino.size as usize).min(body.len());
		let bytes = &body[..len];
		let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
		String::from_utf8(bytes[..end].to_vec()).map_err(|_| Error::DirectoryEntryInvalid)
	}
}

pub(crate) fn validate_path(path: &str) -> Result<()> {
	if path.is_empty() {
		return Err(Error::InvalidArgument);
	}
	if path.len() > MAX_PATH {
		return Err(Error::NameTooLong);
	}
	if !path.starts_with('/') {
		return Err(Error::RelativePath);
	}
	Ok(())
}
