use super::*;
use crate::check;

impl<R: Backend> Sofs<R> {
	/// Hand out a free cluster for inode `n`, cleaning it first if its
	/// previous owner never dissociated it.
	pub(crate) fn alloc_cluster(&mut self, n: InodeNum) -> Result<ClusterNum> {
		log::trace!("alloc_cluster({n});");
		if self.sb.dzone_free == 0 {
			return Err(Error::NoSpaceOnDevice);
		}
		let owner = self.read_inode_raw(n)?;
		check::inode_in_use_ok(&owner)?;

		if self.sb.retrieval_idx as usize == DZC {
			self.replenish()?;
		}
		let idx = self.sb.retrieval_idx as usize;
		let c = self.sb.retrieval[idx];
		self.valid_cnum(c).map_err(|_| Error::ReferenceListInvalid)?;
		self.sb.retrieval[idx] = ClusterNum::NULL;
		self.sb.retrieval_idx += 1;
		self.sb.dzone_free -= 1;

		let mut buf = self.read_cluster(c)?;
		let hdr = header_of(&buf)?;
		if !hdr.stat.is_null() {
			// dirty: the prior owner still maps it
			self.clean_data_cluster(hdr.stat, c)?;
			buf = self.read_cluster(c)?;
		}
		set_header(
			&mut buf,
			&ClusterHeader {
				prev: ClusterNum::NULL,
				next: ClusterNum::NULL,
				stat: n,
			},
		)?;
		self.write_cluster(c, &buf)?;
		self.store_sb()?;
		Ok(c)
	}

	/// Return an allocated cluster to the free pool.
	///
	/// The header's `stat` keeps naming the owner, so the cluster enters
	/// the pool dirty and is cleaned when it comes back out.
	pub(crate) fn free_cluster(&mut self, c: ClusterNum) -> Result<()> {
		log::trace!("free_cluster({c});");
		if c.get() == 0 {
			// the root directory's first cluster is permanent
			return Err(Error::InvalidArgument);
		}
		self.valid_cnum(c)?;
		if self.cluster_is_free(c)? {
			return Err(Error::ClusterAlreadyInList);
		}

		let mut buf = self.read_cluster(c)?;
		let hdr = header_of(&buf)?;
		set_header(
			&mut buf,
			&ClusterHeader {
				prev: ClusterNum::NULL,
				next: ClusterNum::NULL,
				stat: hdr.stat,
			},
		)?;
		self.write_cluster(c, &buf)?;

		if self.sb.insertion_idx as usize == DZC {
			self.deplete()?;
		}
		let idx = self.sb.insertion_idx as usize;
		self.sb.insertion[idx] = c;
		self.sb.insertion_idx += 1;
		self.sb.dzone_free += 1;
		self.store_sb()
	}

	/// Whether `c` currently sits in one of the caches or the repository.
	fn cluster_is_free(&mut self, c: ClusterNum) -> Result<bool> {
		for i in self.sb.retrieval_idx as usize..DZC {
			if self.sb.retrieval[i] == c {
				return Ok(true);
			}
		}
		for i in 0..self.sb.insertion_idx as usize {
			if self.sb.insertion[i] == c {
				return Ok(true);
			}
		}
		let mut cur = self.sb.dhead;
		let mut steps = 0u32;
		while !cur.is_null() {
			if cur == c {
				return Ok(true);
			}
			steps += 1;
			if steps > self.sb.dzone_total {
				log::error!("free-cluster repository does not terminate");
				return Err(Error::ReferenceListInvalid);
			}
			let buf = self.read_cluster(cur)?;
			cur = header_of(&buf)?.next;
		}
		Ok(false)
	}

	/// Move up to `DZC` references from the head of the repository into the
	/// retrieval cache, draining the insertion cache if it underflows.
	fn replenish(&mut self) -> Result<()> {
		log::trace!("replenish();");
		let mut got: Vec<ClusterNum> = Vec::with_capacity(DZC);
		while got.len() < DZC {
			if self.sb.dhead.is_null() {
				if self.sb.insertion_idx == 0 {
					break;
				}
				self.deplete()?;
				continue;
			}
			let c = self.sb.dhead;
			let mut buf = self.read_cluster(c)?;
			let hdr = header_of(&buf)?;

			self.sb.dhead = hdr.next;
			if hdr.next.is_null() {
				self.sb.dtail = ClusterNum::NULL;
			} else {
				let mut nb = self.read_cluster(hdr.next)?;
				let nh = header_of(&nb)?;
				set_header(
					&mut nb,
					&ClusterHeader {
						prev: ClusterNum::NULL,
						next: nh.next,
						stat: nh.stat,
					},
				)?;
				self.write_cluster(hdr.next, &nb)?;
			}

			set_header(
				&mut buf,
				&ClusterHeader {
					prev: ClusterNum::NULL,
					next: ClusterNum::NULL,
					stat: hdr.stat,
				},
			)?;
			self.write_cluster(c, &buf)?;
			got.push(c);
		}
		if got.is_empty() {
			// the caller saw a non-zero free count
			return Err(Error::ReferenceListInvalid);
		}

		// newest-of-batch is consumed first; aging stays FIFO only across
		// replenish generations
		let base = DZC - got.len();
		for (j, c) in got.iter().rev().enumerate() {
			self.sb.retrieval[base + j] = *c;
		}
		self.sb.retrieval_idx = base as u32;
		self.store_sb()
	}

	/// Append the insertion cache, in arrival order, as a chain at the tail
	/// of the repository.
	fn deplete(&mut self) -> Result<()> {
		log::trace!("deplete();");
		let cnt = self.sb.insertion_idx as usize;
		if cnt == 0 {
			return Ok(());
		}

		for i in 0..cnt {
			let c = self.sb.insertion[i];
			let prev = if i == 0 { self.sb.dtail } else { self.sb.insertion[i - 1] };
			let next = if i + 1 < cnt { self.sb.insertion[i + 1] } else { ClusterNum::NULL };
			let mut buf = self.read_cluster(c)?;
			let hdr = header_of(&buf)?;
			set_header(&mut buf, &ClusterHeader { prev, next, stat: hdr.stat })?;
			self.write_cluster(c, &buf)?;
		}

		let first = self.sb.insertion[0];
		if self.sb.dtail.is_null() {
			self.sb.dhead = first;
		} else {
			let tail = self.sb.dtail;
			let mut buf = self.read_cluster(tail)?;
			let hdr = header_of(&buf)?;
			set_header(
				&mut buf,
				&ClusterHeader {
					prev: hdr.prev,
					next: first,
					stat: hdr.stat,
				},
			)?;
			self.write_cluster(tail, &buf)?;
		}
		self.sb.dtail = self.sb.insertion[cnt - 1];

		self.sb.insertion = [ClusterNum::NULL; DZC];
		self.sb.insertion_idx = 0;
		self.store_sb()
	}
}
