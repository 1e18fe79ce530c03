use std::{fmt, io};

/// Closed error taxonomy of the engine.
///
/// Argument and permission errors are recoverable by the caller; the
/// consistency family indicates on-disk state incompatible with continuation
/// and should halt the adapter.
#[derive(Debug)]
pub enum Error {
	// argument
	InvalidArgument,
	NameTooLong,
	RelativePath,
	NotADirectory,
	IsADirectory,
	NotEmpty,
	TooManyLinks,
	FileTooLarge,
	AlreadyExists,
	DoesNotExist,

	// permission
	AccessDenied,
	OperationNotPermitted,

	// resource
	NoSpaceOnDevice,
	NoInodes,
	HardlinkLimit,

	// consistency
	InUseInodeInvalid,
	FreeDirtyInodeInvalid,
	FreeCleanInodeInvalid,
	ReferenceListInvalid,
	ClusterHeaderInvalid,
	ClusterAlreadyInList,
	ClusterNotInList,
	WrongOwnerInode,
	DirectoryInvalid,
	DirectoryEntryInvalid,
	ClusterMappingInvalid,
	LowerLevelInconsistency,

	// device
	DeviceNotOpen,
	DeviceBusy,
	BadFileSize,
	Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// The errno the user-space adapter replies with.
	pub fn errno(&self) -> i32 {
		match self {
			Self::InvalidArgument => libc::EINVAL,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::RelativePath => libc::EINVAL,
			Self::NotADirectory => libc::ENOTDIR,
			Self::IsADirectory => libc::EISDIR,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::TooManyLinks => libc::ELOOP,
			Self::FileTooLarge => libc::EFBIG,
			Self::AlreadyExists => libc::EEXIST,
			Self::DoesNotExist => libc::ENOENT,
			Self::AccessDenied => libc::EACCES,
			Self::OperationNotPermitted => libc::EPERM,
			Self::NoSpaceOnDevice | Self::NoInodes => libc::ENOSPC,
			Self::HardlinkLimit => libc::EMLINK,
			Self::DeviceNotOpen => libc::EBADF,
			Self::DeviceBusy => libc::EBUSY,
			Self::BadFileSize => libc::EINVAL,
			Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
			_ => libc::EIO,
		}
	}

	/// Consistency errors mean the image can no longer be trusted.
	pub fn is_consistency(&self) -> bool {
		matches!(
			self,
			Self::InUseInodeInvalid
				| Self::FreeDirtyInodeInvalid
				| Self::FreeCleanInodeInvalid
				| Self::ReferenceListInvalid
				| Self::ClusterHeaderInvalid
				| Self::ClusterAlreadyInList
				| Self::ClusterNotInList
				| Self::WrongOwnerInode
				| Self::DirectoryInvalid
				| Self::DirectoryEntryInvalid
				| Self::ClusterMappingInvalid
				| Self::LowerLevelInconsistency
		)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::InvalidArgument => "invalid argument",
			Self::NameTooLong => "name too long",
			Self::RelativePath => "path is not absolute",
			Self::NotADirectory => "not a directory",
			Self::IsADirectory => "is a directory",
			Self::NotEmpty => "directory not empty",
			Self::TooManyLinks => "too many levels of symbolic links",
			Self::FileTooLarge => "file too large",
			Self::AlreadyExists => "entry already exists",
			Self::DoesNotExist => "no such entry",
			Self::AccessDenied => "access denied",
			Self::OperationNotPermitted => "operation not permitted",
			Self::NoSpaceOnDevice => "no free data clusters",
			Self::NoInodes => "no free inodes",
			Self::HardlinkLimit => "hard link limit reached",
			Self::InUseInodeInvalid => "in-use inode is invalid",
			Self::FreeDirtyInodeInvalid => "free dirty inode is invalid",
			Self::FreeCleanInodeInvalid => "free clean inode is invalid",
			Self::ReferenceListInvalid => "free reference list is invalid",
			Self::ClusterHeaderInvalid => "cluster header is invalid",
			Self::ClusterAlreadyInList => "cluster is already free",
			Self::ClusterNotInList => "cluster is not mapped",
			Self::WrongOwnerInode => "cluster owned by another inode",
			Self::DirectoryInvalid => "directory content is invalid",
			Self::DirectoryEntryInvalid => "directory entry is invalid",
			Self::ClusterMappingInvalid => "cluster mapping is invalid",
			Self::LowerLevelInconsistency => "on-disk metadata is inconsistent",
			Self::DeviceNotOpen => "device is not open",
			Self::DeviceBusy => "device is busy",
			Self::BadFileSize => "backing file size is not a multiple of the block size",
			Self::Io(e) => return write!(f, "i/o error: {e}"),
		};
		f.write_str(msg)
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}
