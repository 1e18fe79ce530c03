use std::{
	fmt,
	time::{Duration, SystemTime},
};

use bincode::{
	config::{Configuration, Fixint, LittleEndian, NoLimit},
	de::Decoder,
	enc::Encoder,
	error::{DecodeError, EncodeError},
	Decode, Encode,
};

use crate::error::{Error, Result};

/// Size of a device block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Contiguous blocks forming one allocation cluster.
pub const BLOCKS_PER_CLUSTER: usize = 4;

/// Size of a data cluster in bytes.
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * BLOCKS_PER_CLUSTER;

/// Size of an on-disk inode.
pub const INODE_SIZE: usize = 64;

/// Inodes per inode-table block.
pub const IPB: usize = BLOCK_SIZE / INODE_SIZE;

/// Size of the cluster header (prev, next, stat).
pub const CLUSTER_HEADER_SIZE: usize = 12;

/// Bytes of body per cluster.
pub const BSLPC: usize = CLUSTER_SIZE - CLUSTER_HEADER_SIZE;

/// Cluster references per reference cluster.
pub const RPC: usize = CLUSTER_SIZE / 4 - 3;

/// Maximum length of a directory-entry name.
pub const MAX_NAME: usize = 59;

/// Size of an on-disk directory entry.
pub const DIR_ENTRY_SIZE: usize = MAX_NAME + 1 + 4;

/// Directory entries per cluster.
pub const DPC: usize = BSLPC / DIR_ENTRY_SIZE;

/// Maximum length of a path handed to the resolver.
pub const MAX_PATH: usize = 512;

/// Direct references in an inode.
pub const N_DIRECT: usize = 7;

/// Capacity of each of the two free-cluster caches in the superblock.
pub const DZC: usize = 50;

/// Upper bound on the number of data clusters mapped by one file.
pub const MAX_FILE_CLUSTERS: u32 = N_DIRECT as u32 + RPC as u32 + (RPC * RPC) as u32;

/// Largest representable file, in bytes.
pub const MAX_FILE_SIZE: u64 = MAX_FILE_CLUSTERS as u64 * BSLPC as u64;

/// Superblock magic number.
pub const SOFS_MAGIC: u32 = 0x50F5_0F50;

/// Magic value carried while a format is in flight.
pub const PROVISIONAL_MAGIC: u32 = 0xFFFF;

/// On-disk format version.
pub const SOFS_VERSION: u32 = 0x2014;

/// Volume name capacity in the superblock.
pub const VOLUME_NAME_LEN: usize = 32;

/// Trailing reserved area padding the superblock to one block.
pub const SB_RESERVED: usize = 12;

/// Mount status: the image was cleanly unmounted.
pub const MSTAT_PROPERLY_UNMOUNTED: u32 = 1;

/// Mount status: the image is (or was left) in use.
pub const MSTAT_IN_USE: u32 = 0;

/// `refCount` value treated as saturated.
pub const REF_COUNT_MAX: u16 = 0xFFFF;

// The mode word combines a type code, the free flag and nine permission bits.
pub const S_IFMT: u16 = 0o160000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFLNK: u16 = 0o120000;
pub const S_IFREE: u16 = 0o010000;
pub const S_IPERM: u16 = 0o000777;

const _: () = assert!(DPC == 31);
const _: () = assert!(RPC == 509);
const _: () = assert!(BSLPC == 2036);

pub(crate) const fn disk_codec() -> Configuration<LittleEndian, Fixint, NoLimit> {
	bincode::config::standard()
		.with_fixed_int_encoding()
		.with_little_endian()
}

pub(crate) fn decode_at<T: Decode<()>>(buf: &[u8], off: usize) -> Result<T> {
	match bincode::decode_from_slice(&buf[off..], disk_codec()) {
		Ok((v, _)) => Ok(v),
		Err(_) => Err(Error::LowerLevelInconsistency),
	}
}

pub(crate) fn encode_at<T: Encode>(buf: &mut [u8], off: usize, v: &T) -> Result<()> {
	match bincode::encode_into_slice(v, &mut buf[off..], disk_codec()) {
		Ok(_) => Ok(()),
		Err(_) => Err(Error::LowerLevelInconsistency),
	}
}

/// Inode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct InodeNum(u32);

impl InodeNum {
	pub const NULL: Self = Self(0xFFFF_FFFF);
	pub const ROOT: Self = Self(0);

	pub const fn new(n: u32) -> Self {
		Self(n)
	}

	pub const fn get(self) -> u32 {
		self.0
	}

	pub const fn get64(self) -> u64 {
		self.0 as u64
	}

	pub const fn is_null(self) -> bool {
		self.0 == Self::NULL.0
	}
}

impl fmt::Display for InodeNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_null() {
			f.write_str("nil")
		} else {
			write!(f, "{}", self.0)
		}
	}
}

/// Index of a cluster within the data zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct ClusterNum(u32);

impl ClusterNum {
	pub const NULL: Self = Self(0xFFFF_FFFF);

	pub const fn new(n: u32) -> Self {
		Self(n)
	}

	pub const fn get(self) -> u32 {
		self.0
	}

	pub const fn is_null(self) -> bool {
		self.0 == Self::NULL.0
	}

	/// Physical number of the cluster's first block.
	pub const fn first_block(self, dzone_start: u32) -> u32 {
		dzone_start + self.0 * BLOCKS_PER_CLUSTER as u32
	}
}

impl fmt::Display for ClusterNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_null() {
			f.write_str("nil")
		} else {
			write!(f, "{}", self.0)
		}
	}
}

/// The three kinds of object an inode can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
	Directory,
	RegularFile,
	Symlink,
}

impl InodeType {
	pub const fn as_mode(self) -> u16 {
		match self {
			Self::Directory => S_IFDIR,
			Self::RegularFile => S_IFREG,
			Self::Symlink => S_IFLNK,
		}
	}

	pub const fn from_mode(mode: u16) -> Option<Self> {
		match mode & S_IFMT {
			S_IFDIR => Some(Self::Directory),
			S_IFREG => Some(Self::RegularFile),
			S_IFLNK => Some(Self::Symlink),
			_ => None,
		}
	}
}

/// Superblock, block 0 of the device.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Superblock {
	pub magic:   u32,
	pub version: u32,
	pub name:    [u8; VOLUME_NAME_LEN],
	pub ntotal:  u32,
	pub mstat:   u32,

	// inode-table descriptor
	pub itable_start: u32,
	pub itable_size:  u32,
	pub itotal:       u32,
	pub ifree:        u32,
	pub ihead:        InodeNum,
	pub itail:        InodeNum,

	// data-zone descriptor
	pub dzone_start: u32,
	pub dzone_total: u32,
	pub dzone_free:  u32,

	// free-cluster caches
	pub retrieval_idx: u32,
	pub retrieval:     [ClusterNum; DZC],
	pub insertion_idx: u32,
	pub insertion:     [ClusterNum; DZC],

	// general repository of free clusters
	pub dhead: ClusterNum,
	pub dtail: ClusterNum,

	pub reserved: [u8; SB_RESERVED],
}

impl Superblock {
	/// Volume name as text, up to the first NUL.
	pub fn volume_name(&self) -> String {
		let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
		String::from_utf8_lossy(&self.name[..end]).into_owned()
	}

	/// Absolute block and byte offset of an inode within the table.
	pub fn inode_block(&self, n: InodeNum) -> (u32, usize) {
		let (blk, off) = inode_location(n);
		(self.itable_start + blk, off)
	}
}

/// Inode number to (block within the table, byte offset within that block).
pub fn inode_location(n: InodeNum) -> (u32, usize) {
	(n.get() / IPB as u32, (n.get() as usize % IPB) * INODE_SIZE)
}

/// Byte position of a file to (logical cluster index, offset within the body).
pub fn byte_location(pos: u32) -> (u32, usize) {
	(pos / BSLPC as u32, pos as usize % BSLPC)
}

/// What the inode's two union words currently hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeMeta {
	/// The inode is in use: access and modification times.
	Times { atime: u32, mtime: u32 },
	/// The inode is free: linkage in the free-inode list.
	FreeLink { prev: InodeNum, next: InodeNum },
}

/// On-disk inode.
#[derive(Debug, Clone)]
pub struct Inode {
	pub mode:      u16,
	pub ref_count: u16,
	pub owner:     u32,
	pub group:     u32,
	pub size:      u32,
	pub clu_count: u32,
	pub meta:      InodeMeta,
	pub direct:    [ClusterNum; N_DIRECT],
	pub i1:        ClusterNum,
	pub i2:        ClusterNum,
}

impl Inode {
	pub fn is_free(&self) -> bool {
		self.mode & S_IFREE != 0
	}

	pub fn perm(&self) -> u16 {
		self.mode & S_IPERM
	}

	pub fn kind(&self) -> InodeType {
		match InodeType::from_mode(self.mode) {
			Some(t) => t,
			None => unreachable!("invalid file mode: {:o}", self.mode),
		}
	}

	/// Access and modification times; the inode must be in use.
	pub fn times(&self) -> (u32, u32) {
		match self.meta {
			InodeMeta::Times { atime, mtime } => (atime, mtime),
			InodeMeta::FreeLink { .. } => unreachable!("times of a free inode"),
		}
	}

	pub fn as_attr(&self, inr: InodeNum) -> InodeAttr {
		let (atime, mtime) = self.times();
		InodeAttr {
			inr,
			kind: self.kind(),
			perm: self.perm(),
			nlink: self.ref_count,
			uid: self.owner,
			gid: self.group,
			size: self.size as u64,
			clusters: self.clu_count as u64,
			atime: systime(atime),
			mtime: systime(mtime),
		}
	}
}

impl Decode<()> for Inode {
	fn decode<D: Decoder>(d: &mut D) -> std::result::Result<Self, DecodeError> {
		let mode = u16::decode(d)?;
		let ref_count = u16::decode(d)?;
		let owner = u32::decode(d)?;
		let group = u32::decode(d)?;
		let size = u32::decode(d)?;
		let clu_count = u32::decode(d)?;
		let v1 = u32::decode(d)?;
		let v2 = u32::decode(d)?;
		let direct = <[ClusterNum; N_DIRECT]>::decode(d)?;
		let i1 = ClusterNum::decode(d)?;
		let i2 = ClusterNum::decode(d)?;

		let meta = if mode & S_IFREE != 0 {
			InodeMeta::FreeLink {
				prev: InodeNum::new(v1),
				next: InodeNum::new(v2),
			}
		} else {
			InodeMeta::Times {
				atime: v1,
				mtime: v2,
			}
		};

		Ok(Self {
			mode,
			ref_count,
			owner,
			group,
			size,
			clu_count,
			meta,
			direct,
			i1,
			i2,
		})
	}
}

impl Encode for Inode {
	fn encode<E: Encoder>(&self, e: &mut E) -> std::result::Result<(), EncodeError> {
		self.mode.encode(e)?;
		self.ref_count.encode(e)?;
		self.owner.encode(e)?;
		self.group.encode(e)?;
		self.size.encode(e)?;
		self.clu_count.encode(e)?;
		let (v1, v2) = match self.meta {
			InodeMeta::Times { atime, mtime } => (atime, mtime),
			InodeMeta::FreeLink { prev, next } => (prev.get(), next.get()),
		};
		v1.encode(e)?;
		v2.encode(e)?;
		self.direct.encode(e)?;
		self.i1.encode(e)?;
		self.i2.encode(e)
	}
}

/// Snapshot of an inode's metadata handed to the adapter.
#[derive(Debug, Clone)]
pub struct InodeAttr {
	pub inr:      InodeNum,
	pub kind:     InodeType,
	pub perm:     u16,
	pub nlink:    u16,
	pub uid:      u32,
	pub gid:      u32,
	pub size:     u64,
	pub clusters: u64,
	pub atime:    SystemTime,
	pub mtime:    SystemTime,
}

/// Header of every data-zone cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ClusterHeader {
	pub prev: ClusterNum,
	pub next: ClusterNum,
	pub stat: InodeNum,
}

/// On-disk directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DirEntry {
	pub name:  [u8; MAX_NAME + 1],
	pub inode: InodeNum,
}

impl DirEntry {
	pub const EMPTY: Self = Self {
		name:  [0; MAX_NAME + 1],
		inode: InodeNum::NULL,
	};

	/// `name` must already have been validated against [`MAX_NAME`].
	pub fn new(name: &[u8], inode: InodeNum) -> Self {
		let mut e = Self::EMPTY;
		e.name[..name.len()].copy_from_slice(name);
		e.inode = inode;
		e
	}

	pub fn is_free(&self) -> bool {
		self.inode.is_null()
	}

	pub fn is_clean(&self) -> bool {
		self.is_free() && self.name.iter().all(|b| *b == 0)
	}

	pub fn name_bytes(&self) -> &[u8] {
		let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
		&self.name[..end]
	}
}

// Typed views over a raw cluster buffer.

pub(crate) fn header_of(buf: &[u8]) -> Result<ClusterHeader> {
	decode_at(buf, 0)
}

pub(crate) fn set_header(buf: &mut [u8], hdr: &ClusterHeader) -> Result<()> {
	encode_at(buf, 0, hdr)
}

pub(crate) fn refs_of(buf: &[u8]) -> Result<[ClusterNum; RPC]> {
	decode_at(buf, CLUSTER_HEADER_SIZE)
}

pub(crate) fn set_refs(buf: &mut [u8], refs: &[ClusterNum; RPC]) -> Result<()> {
	encode_at(buf, CLUSTER_HEADER_SIZE, refs)
}

pub(crate) fn dirents_of(buf: &[u8]) -> Result<[DirEntry; DPC]> {
	decode_at(buf, CLUSTER_HEADER_SIZE)
}

pub(crate) fn set_dirents(buf: &mut [u8], ents: &[DirEntry; DPC]) -> Result<()> {
	encode_at(buf, CLUSTER_HEADER_SIZE, ents)
}

pub(crate) fn set_dirent(buf: &mut [u8], slot: usize, e: &DirEntry) -> Result<()> {
	encode_at(buf, CLUSTER_HEADER_SIZE + slot * DIR_ENTRY_SIZE, e)
}

pub(crate) fn body_of(buf: &[u8]) -> &[u8] {
	&buf[CLUSTER_HEADER_SIZE..]
}

pub(crate) fn body_mut(buf: &mut [u8]) -> &mut [u8] {
	&mut buf[CLUSTER_HEADER_SIZE..]
}

pub(crate) fn unix_now() -> u32 {
	SystemTime::now()
		.duration_since(SystemTime::UNIX_EPOCH)
		.map(|d| d.as_secs() as u32)
		.unwrap_or(0)
}

pub(crate) fn systime(secs: u32) -> SystemTime {
	SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64)
}
