use lru::LruCache;

use crate::{
	device::{Backend, RawDevice},
	error::Result,
	layout::{BLOCK_SIZE, BLOCKS_PER_CLUSTER, CLUSTER_SIZE},
};

struct CacheNode {
	data:  [u8; BLOCK_SIZE],
	dirty: bool,
}

/// Write-back cache over the raw device.
///
/// Holds a fixed pool of block-sized nodes keyed on the physical block
/// number; the least recently accessed node is evicted (and written back if
/// dirty) to make room. Cluster I/O decomposes into block I/O so both
/// granularities share the pool. In unbuffered mode no node is retained and
/// every call goes straight through.
pub struct BlockCache<B: Backend> {
	dev:  RawDevice<B>,
	pool: Option<LruCache<u32, CacheNode>>,
}

impl<B: Backend> BlockCache<B> {
	pub fn new(dev: RawDevice<B>) -> Self {
		Self {
			dev,
			pool: Some(crate::new_lru(crate::BCACHE_SIZE)),
		}
	}

	pub fn unbuffered(dev: RawDevice<B>) -> Self {
		Self {
			dev,
			pool: None,
		}
	}

	pub fn nblocks(&self) -> u32 {
		self.dev.nblocks()
	}

	fn push(
		pool: &mut LruCache<u32, CacheNode>,
		dev: &mut RawDevice<B>,
		n: u32,
		node: CacheNode,
	) -> Result<()> {
		if let Some((old_n, old)) = pool.push(n, node) {
			if old_n != n && old.dirty {
				dev.write_block(old_n, &old.data)?;
			}
		}
		Ok(())
	}

	pub fn read_block(&mut self, n: u32) -> Result<[u8; BLOCK_SIZE]> {
		let mut buf = [0u8; BLOCK_SIZE];
		let Some(pool) = self.pool.as_mut() else {
			self.dev.read_block(n, &mut buf)?;
			return Ok(buf);
		};
		if let Some(node) = pool.get(&n) {
			buf.copy_from_slice(&node.data);
			return Ok(buf);
		}
		self.dev.read_block(n, &mut buf)?;
		Self::push(pool, &mut self.dev, n, CacheNode { data: buf, dirty: false })?;
		Ok(buf)
	}

	pub fn write_block(&mut self, n: u32, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
		let Some(pool) = self.pool.as_mut() else {
			return self.dev.write_block(n, buf);
		};
		if let Some(node) = pool.get_mut(&n) {
			node.data.copy_from_slice(buf);
			node.dirty = true;
			return Ok(());
		}
		Self::push(pool, &mut self.dev, n, CacheNode { data: *buf, dirty: true })
	}

	pub fn read_cluster(&mut self, first: u32) -> Result<[u8; CLUSTER_SIZE]> {
		let mut buf = [0u8; CLUSTER_SIZE];
		if self.pool.is_none() {
			self.dev.read_cluster(first, &mut buf)?;
			return Ok(buf);
		}
		for i in 0..BLOCKS_PER_CLUSTER {
			let blk = self.read_block(first + i as u32)?;
			buf[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE].copy_from_slice(&blk);
		}
		Ok(buf)
	}

	pub fn write_cluster(&mut self, first: u32, buf: &[u8; CLUSTER_SIZE]) -> Result<()> {
		if self.pool.is_none() {
			return self.dev.write_cluster(first, buf);
		}
		for i in 0..BLOCKS_PER_CLUSTER {
			let mut blk = [0u8; BLOCK_SIZE];
			blk.copy_from_slice(&buf[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE]);
			self.write_block(first + i as u32, &blk)?;
		}
		Ok(())
	}

	/// Force node `n` through to the raw device, dirty or not.
	pub fn flush(&mut self, n: u32) -> Result<()> {
		let Some(pool) = self.pool.as_mut() else {
			return Ok(());
		};
		if let Some(node) = pool.peek_mut(&n) {
			self.dev.write_block(n, &node.data)?;
			node.dirty = false;
		}
		Ok(())
	}

	/// Write node `n` back if it is dirty.
	pub fn sync(&mut self, n: u32) -> Result<()> {
		let Some(pool) = self.pool.as_mut() else {
			return Ok(());
		};
		if let Some(node) = pool.peek_mut(&n) {
			if node.dirty {
				self.dev.write_block(n, &node.data)?;
				node.dirty = false;
			}
		}
		Ok(())
	}

	/// Write every dirty node back.
	pub fn sync_all(&mut self) -> Result<()> {
		if let Some(pool) = self.pool.as_mut() {
			for (n, node) in pool.iter_mut() {
				if node.dirty {
					self.dev.write_block(*n, &node.data)?;
					node.dirty = false;
				}
			}
		}
		self.dev.flush()
	}

	/// Flush every dirty node and empty the pool.
	pub fn close(&mut self) -> Result<()> {
		self.sync_all()?;
		if let Some(pool) = self.pool.as_mut() {
			pool.clear();
		}
		Ok(())
	}
}
