use std::{
	fs::File,
	io::{Read, Seek, SeekFrom, Write},
	path::Path,
};

use crate::{
	error::{Error, Result},
	layout::{BLOCK_SIZE, BLOCKS_PER_CLUSTER, CLUSTER_SIZE},
};

/// Anything a SOFS image can live on.
pub trait Backend: Read + Write + Seek {}

impl<T: Read + Write + Seek> Backend for T {}

/// Fixed-size block and cluster I/O against the backing store.
#[derive(Debug)]
pub struct RawDevice<B: Backend> {
	inner:   B,
	nblocks: u32,
}

impl RawDevice<File> {
	pub fn open(path: &Path) -> Result<Self> {
		let file = File::options().read(true).write(true).open(path)?;
		let len = file.metadata()?.len();
		Self::new(file, len)
	}
}

impl<B: Backend> RawDevice<B> {
	/// Wrap an arbitrary backend spanning `nbytes` bytes.
	pub fn new(inner: B, nbytes: u64) -> Result<Self> {
		if nbytes == 0 || nbytes % BLOCK_SIZE as u64 != 0 {
			return Err(Error::BadFileSize);
		}
		Ok(Self {
			inner,
			nblocks: (nbytes / BLOCK_SIZE as u64) as u32,
		})
	}

	pub fn nblocks(&self) -> u32 {
		self.nblocks
	}

	fn seek_block(&mut self, n: u32, span: usize) -> Result<()> {
		if n as u64 + span as u64 > self.nblocks as u64 {
			return Err(Error::InvalidArgument);
		}
		self.inner.seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))?;
		Ok(())
	}

	pub fn read_block(&mut self, n: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
		self.seek_block(n, 1)?;
		self.inner.read_exact(buf)?;
		Ok(())
	}

	pub fn write_block(&mut self, n: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		self.seek_block(n, 1)?;
		self.inner.write_all(buf)?;
		Ok(())
	}

	/// `first` is the physical number of the cluster's first block.
	pub fn read_cluster(&mut self, first: u32, buf: &mut [u8; CLUSTER_SIZE]) -> Result<()> {
		self.seek_block(first, BLOCKS_PER_CLUSTER)?;
		self.inner.read_exact(buf)?;
		Ok(())
	}

	pub fn write_cluster(&mut self, first: u32, buf: &[u8; CLUSTER_SIZE]) -> Result<()> {
		self.seek_block(first, BLOCKS_PER_CLUSTER)?;
		self.inner.write_all(buf)?;
		Ok(())
	}

	pub fn flush(&mut self) -> Result<()> {
		self.inner.flush()?;
		Ok(())
	}
}
