use std::path::Path;

use crate::{
	cache::BlockCache,
	device::{Backend, RawDevice},
	error::{Error, Result},
	layout::*,
};

/// Options for [`format`].
#[derive(Debug, Clone)]
pub struct FormatOpts {
	/// Volume name recorded in the superblock.
	pub name: String,

	/// Total number of inodes; one per eight blocks when not given.
	pub inodes: Option<u32>,

	/// Zero-fill the body of every free data cluster.
	pub zero: bool,
}

impl Default for FormatOpts {
	fn default() -> Self {
		Self {
			name:   "SOFS".to_string(),
			inodes: None,
			zero:   false,
		}
	}
}

/// Resulting on-disk geometry of a format.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
	pub blocks:   u32,
	pub inodes:   u32,
	pub clusters: u32,
}

/// Lay a fresh SOFS image onto the backing file at `path`.
pub fn format(path: &Path, opts: &FormatOpts) -> Result<Geometry> {
	let dev = RawDevice::open(path)?;
	format_device(BlockCache::unbuffered(dev), opts)
}

/// Same as [`format`], over an already-open device.
pub fn format_device<R: Backend>(mut disk: BlockCache<R>, opts: &FormatOpts) -> Result<Geometry> {
	let nblocks = disk.nblocks();

	// geometry: superblock, inode table, data zone; the inode count is
	// rounded up to fill whole table blocks, and up to three trailing
	// blocks may be left outside the data zone
	let want = opts.inodes.unwrap_or(nblocks / 8).max(1);
	let itotal = want.div_ceil(IPB as u32) * IPB as u32;
	let iblk = itotal / IPB as u32;
	if nblocks < 1 + iblk + BLOCKS_PER_CLUSTER as u32 {
		log::error!("device too small: {nblocks} blocks, {itotal} inodes");
		return Err(Error::InvalidArgument);
	}
	let nclusters = (nblocks - 1 - iblk) / BLOCKS_PER_CLUSTER as u32;
	let dzone_start = 1 + iblk;

	log::info!(
		"formatting: {nblocks} blocks, {itotal} inodes in {iblk} blocks, {nclusters} clusters"
	);

	let mut name = [0u8; VOLUME_NAME_LEN];
	let n = opts.name.len().min(VOLUME_NAME_LEN - 1);
	name[..n].copy_from_slice(&opts.name.as_bytes()[..n]);

	let mut sb = Superblock {
		magic: PROVISIONAL_MAGIC,
		version: SOFS_VERSION,
		name,
		ntotal: nblocks,
		mstat: MSTAT_PROPERLY_UNMOUNTED,
		itable_start: 1,
		itable_size: iblk,
		itotal,
		ifree: itotal - 1,
		ihead: if itotal > 1 { InodeNum::new(1) } else { InodeNum::NULL },
		itail: if itotal > 1 { InodeNum::new(itotal - 1) } else { InodeNum::NULL },
		dzone_start,
		dzone_total: nclusters,
		dzone_free: nclusters - 1,
		retrieval_idx: DZC as u32,
		retrieval: [ClusterNum::NULL; DZC],
		insertion_idx: 0,
		insertion: [ClusterNum::NULL; DZC],
		dhead: if nclusters > 1 { ClusterNum::new(1) } else { ClusterNum::NULL },
		dtail: if nclusters > 1 { ClusterNum::new(nclusters - 1) } else { ClusterNum::NULL },
		reserved: [0; SB_RESERVED],
	};

	// the wrong magic stays on disk until the format has fully completed
	let mut buf = [0u8; BLOCK_SIZE];
	encode_at(&mut buf, 0, &sb)?;
	disk.write_block(0, &buf)?;

	// inode table: inode 0 is the root, the rest are free, clean and
	// threaded into the free-inode list
	let uid = unsafe { libc::getuid() };
	let gid = unsafe { libc::getgid() };
	let now = unix_now();
	for blk in 0..iblk {
		let mut buf = [0u8; BLOCK_SIZE];
		for slot in 0..IPB as u32 {
			let n = blk * IPB as u32 + slot;
			let ino = if n == 0 {
				let mut direct = [ClusterNum::NULL; N_DIRECT];
				direct[0] = ClusterNum::new(0);
				Inode {
					mode: S_IFDIR | 0o755,
					ref_count: 2,
					owner: uid,
					group: gid,
					size: (DPC * DIR_ENTRY_SIZE) as u32,
					clu_count: 1,
					meta: InodeMeta::Times { atime: now, mtime: now },
					direct,
					i1: ClusterNum::NULL,
					i2: ClusterNum::NULL,
				}
			} else {
				Inode {
					mode: S_IFREE,
					ref_count: 0,
					owner: 0,
					group: 0,
					size: 0,
					clu_count: 0,
					meta: InodeMeta::FreeLink {
						prev: if n == 1 { InodeNum::NULL } else { InodeNum::new(n - 1) },
						next: if n + 1 < itotal { InodeNum::new(n + 1) } else { InodeNum::NULL },
					},
					direct: [ClusterNum::NULL; N_DIRECT],
					i1: ClusterNum::NULL,
					i2: ClusterNum::NULL,
				}
			};
			encode_at(&mut buf, slot as usize * INODE_SIZE, &ino)?;
		}
		disk.write_block(1 + blk, &buf)?;
	}

	// cluster 0: the root directory
	let mut buf = [0u8; CLUSTER_SIZE];
	set_header(
		&mut buf,
		&ClusterHeader {
			prev: ClusterNum::NULL,
			next: ClusterNum::NULL,
			stat: InodeNum::ROOT,
		},
	)?;
	let mut ents = [DirEntry::EMPTY; DPC];
	ents[0] = DirEntry::new(b".", InodeNum::ROOT);
	ents[1] = DirEntry::new(b"..", InodeNum::ROOT);
	set_dirents(&mut buf, &ents)?;
	disk.write_cluster(dzone_start, &buf)?;

	// clusters 1..nclusters-1: the general repository, chained in order
	for c in 1..nclusters {
		let hdr = ClusterHeader {
			prev: if c == 1 { ClusterNum::NULL } else { ClusterNum::new(c - 1) },
			next: if c + 1 < nclusters { ClusterNum::new(c + 1) } else { ClusterNum::NULL },
			stat: InodeNum::NULL,
		};
		let first = ClusterNum::new(c).first_block(dzone_start);
		if opts.zero {
			let mut buf = [0u8; CLUSTER_SIZE];
			set_header(&mut buf, &hdr)?;
			disk.write_cluster(first, &buf)?;
		} else {
			// only the header block needs to hit the device
			let mut buf = [0u8; BLOCK_SIZE];
			encode_at(&mut buf, 0, &hdr)?;
			disk.write_block(first, &buf)?;
		}
		if c % 4096 == 0 {
			log::debug!("chained {c}/{nclusters} clusters");
		}
	}

	// the canonical magic goes in last
	sb.magic = SOFS_MAGIC;
	let mut buf = [0u8; BLOCK_SIZE];
	encode_at(&mut buf, 0, &sb)?;
	disk.write_block(0, &buf)?;
	disk.close()?;

	Ok(Geometry {
		blocks:   nblocks,
		inodes:   itotal,
		clusters: nclusters,
	})
}
