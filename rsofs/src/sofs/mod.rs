use std::{fs::File, path::Path};

mod calloc;
mod cmap;
mod dir;
mod fileio;
mod format;
mod ialloc;
mod inode;
mod ops;
mod path;

pub use dir::{AddOp, RemOp};
pub use format::{format, format_device, FormatOpts, Geometry};
pub use inode::{IStatus, PERM_R, PERM_W, PERM_X};

use crate::{
	cache::BlockCache,
	check,
	device::{Backend, RawDevice},
	error::{Error, Result},
	layout::*,
};

/// Summary of filesystem statistics.
#[derive(Debug, Clone)]
#[doc(alias = "Statfs")]
pub struct Info {
	/// Number of blocks on the device.
	pub blocks: u64,

	/// Number of data clusters.
	pub clusters: u64,

	/// Number of free data clusters.
	pub cfree: u64,

	/// Number of inodes.
	pub files: u64,

	/// Number of free inodes.
	pub ffree: u64,

	/// Block size.
	pub bsize: u32,

	/// Cluster size.
	pub csize: u32,

	/// Volume name.
	pub volume: String,
}

/// A mounted SOFS volume.
///
/// Every public operation assumes exclusive access; the user-space adapter
/// serializes calls into the engine.
pub struct Sofs<R: Backend> {
	disk: BlockCache<R>,
	sb:   Superblock,
	uid:  u32,
	gid:  u32,

	unmounted: bool,
}

impl Sofs<File> {
	pub fn mount(path: &Path) -> Result<Self> {
		let dev = RawDevice::open(path)?;
		Self::new(BlockCache::new(dev))
	}
}

impl<R: Backend> Sofs<R> {
	pub fn new(mut disk: BlockCache<R>) -> Result<Self> {
		let buf = disk.read_block(0)?;
		let sb: Superblock = decode_at(&buf, 0)?;
		if sb.magic != SOFS_MAGIC || sb.version != SOFS_VERSION {
			log::error!(
				"bad superblock: magic={:#x}, version={:#x}",
				sb.magic,
				sb.version
			);
			return Err(Error::LowerLevelInconsistency);
		}

		let mut s = Self {
			disk,
			sb,
			uid: unsafe { libc::getuid() },
			gid: unsafe { libc::getgid() },
			unmounted: false,
		};

		check::superblock_ok(&s.sb, s.disk.nblocks())?;
		if s.sb.mstat != MSTAT_PROPERLY_UNMOUNTED {
			log::warn!("volume was not cleanly unmounted, running structural checks");
			s.check_structure()?;
		}

		log::info!(
			"mounted {:?}: {} blocks, {} inodes ({} free), {} clusters ({} free)",
			s.sb.volume_name(),
			s.sb.ntotal,
			s.sb.itotal,
			s.sb.ifree,
			s.sb.dzone_total,
			s.sb.dzone_free
		);

		s.sb.mstat = MSTAT_IN_USE;
		s.store_sb()?;
		// the in-use flag must reach the device now, not at eviction time
		s.disk.flush(0)?;
		Ok(s)
	}

	/// Mark the volume cleanly unmounted and push everything to the device.
	pub fn unmount(&mut self) -> Result<()> {
		if self.unmounted {
			return Ok(());
		}
		self.sb.mstat = MSTAT_PROPERLY_UNMOUNTED;
		self.store_sb()?;
		self.disk.close()?;
		self.unmounted = true;
		Ok(())
	}

	/// Write every dirty cache node back without unmounting.
	pub fn sync(&mut self) -> Result<()> {
		self.store_sb()?;
		self.disk.sync_all()
	}

	/// Get filesystem metadata.
	#[doc(alias("statfs", "statvfs"))]
	pub fn info(&self) -> Info {
		let sb = &self.sb;
		Info {
			blocks: sb.ntotal as u64,
			clusters: sb.dzone_total as u64,
			cfree: sb.dzone_free as u64,
			files: sb.itotal as u64,
			ffree: sb.ifree as u64,
			bsize: BLOCK_SIZE as u32,
			csize: CLUSTER_SIZE as u32,
			volume: sb.volume_name(),
		}
	}

	/// Raw view of the superblock, for inspection tools and tests.
	pub fn superblock(&self) -> &Superblock {
		&self.sb
	}

	fn check_structure(&mut self) -> Result<()> {
		let root = self.read_inode_raw(InodeNum::ROOT)?;
		check::inode_in_use_ok(&root)?;
		if root.kind() != InodeType::Directory || root.clu_count == 0 {
			return Err(Error::InUseInodeInvalid);
		}
		if root.direct[0] != ClusterNum::new(0) {
			return Err(Error::ClusterMappingInvalid);
		}
		let buf = self.read_cluster(ClusterNum::new(0))?;
		let hdr = header_of(&buf)?;
		if hdr.stat != InodeNum::ROOT {
			return Err(Error::WrongOwnerInode);
		}
		let ents = dirents_of(&buf)?;
		check::dir_first_cluster_ok(&ents, InodeNum::ROOT)?;
		if ents[1].inode != InodeNum::ROOT {
			return Err(Error::DirectoryInvalid);
		}
		Ok(())
	}

	pub(crate) fn store_sb(&mut self) -> Result<()> {
		let mut buf = [0u8; BLOCK_SIZE];
		encode_at(&mut buf, 0, &self.sb)?;
		self.disk.write_block(0, &buf)
	}

	pub(crate) fn valid_inum(&self, n: InodeNum) -> Result<()> {
		if n.is_null() || n.get() >= self.sb.itotal {
			Err(Error::InvalidArgument)
		} else {
			Ok(())
		}
	}

	pub(crate) fn valid_cnum(&self, c: ClusterNum) -> Result<()> {
		if c.is_null() || c.get() >= self.sb.dzone_total {
			Err(Error::InvalidArgument)
		} else {
			Ok(())
		}
	}

	pub(crate) fn read_cluster(&mut self, c: ClusterNum) -> Result<[u8; CLUSTER_SIZE]> {
		self.valid_cnum(c)?;
		let first = c.first_block(self.sb.dzone_start);
		self.disk.read_cluster(first)
	}

	pub(crate) fn write_cluster(&mut self, c: ClusterNum, buf: &[u8; CLUSTER_SIZE]) -> Result<()> {
		self.valid_cnum(c)?;
		let first = c.first_block(self.sb.dzone_start);
		self.disk.write_cluster(first, buf)
	}

	/// Run everything as a given user; tests use this to exercise permission
	/// checks without switching real credentials.
	pub fn set_credentials(&mut self, uid: u32, gid: u32) {
		self.uid = uid;
		self.gid = gid;
	}
}
