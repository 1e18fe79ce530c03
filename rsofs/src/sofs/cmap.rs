use super::*;
use crate::check;

/// Which bucket of the reference tree a logical cluster index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefPath {
	Direct(usize),
	Single(usize),
	Double(usize, usize),
}

pub(crate) fn ref_path(k: u32) -> Result<RefPath> {
	let nd = N_DIRECT as u32;
	let rpc = RPC as u32;
	if k < nd {
		Ok(RefPath::Direct(k as usize))
	} else if k < nd + rpc {
		Ok(RefPath::Single((k - nd) as usize))
	} else if k < MAX_FILE_CLUSTERS {
		let x = k - nd - rpc;
		Ok(RefPath::Double((x / rpc) as usize, (x % rpc) as usize))
	} else {
		Err(Error::FileTooLarge)
	}
}

impl<R: Backend> Sofs<R> {
	fn read_refs(&mut self, c: ClusterNum) -> Result<[ClusterNum; RPC]> {
		let buf = self.read_cluster(c)?;
		refs_of(&buf)
	}

	fn write_refs(&mut self, c: ClusterNum, refs: &[ClusterNum; RPC]) -> Result<()> {
		let mut buf = self.read_cluster(c)?;
		set_refs(&mut buf, refs)?;
		self.write_cluster(c, &buf)
	}

	/// Pure mapping lookup against an inode snapshot.
	pub(crate) fn lookup_ref(&mut self, ino: &Inode, k: u32) -> Result<Option<ClusterNum>> {
		let r = match ref_path(k)? {
			RefPath::Direct(i) => ino.direct[i],
			RefPath::Single(i) => {
				if ino.i1.is_null() {
					return Ok(None);
				}
				self.read_refs(ino.i1)?[i]
			}
			RefPath::Double(o, i) => {
				if ino.i2.is_null() {
					return Ok(None);
				}
				let outer = self.read_refs(ino.i2)?;
				if outer[o].is_null() {
					return Ok(None);
				}
				self.read_refs(outer[o])?[i]
			}
		};
		Ok(if r.is_null() { None } else { Some(r) })
	}

	/// GET: the physical cluster mapped at logical index `k`, if any.
	pub fn get_file_cluster(&mut self, n: InodeNum, k: u32) -> Result<Option<ClusterNum>> {
		log::trace!("get_file_cluster({n}, {k});");
		let ino = self.read_inode(n, IStatus::InUse)?;
		self.lookup_ref(&ino, k)
	}

	/// ALLOC: map a fresh cluster at logical index `k`, creating any missing
	/// reference pages on the way down.
	pub fn alloc_file_cluster(&mut self, n: InodeNum, k: u32) -> Result<ClusterNum> {
		log::trace!("alloc_file_cluster({n}, {k});");
		let mut ino = self.read_inode(n, IStatus::InUse)?;
		if self.lookup_ref(&ino, k)?.is_some() {
			return Err(Error::ClusterAlreadyInList);
		}

		let path = ref_path(k)?;
		match path {
			RefPath::Direct(_) => {}
			RefPath::Single(_) => {
				if ino.i1.is_null() {
					ino.i1 = self.alloc_ref_cluster(n)?;
					ino.clu_count += 1;
					self.write_inode(n, IStatus::InUse, &mut ino)?;
				}
			}
			RefPath::Double(o, _) => {
				if ino.i2.is_null() {
					ino.i2 = self.alloc_ref_cluster(n)?;
					ino.clu_count += 1;
					self.write_inode(n, IStatus::InUse, &mut ino)?;
				}
				let mut outer = self.read_refs(ino.i2)?;
				if outer[o].is_null() {
					outer[o] = self.alloc_ref_cluster(n)?;
					self.write_refs(ino.i2, &outer)?;
					ino.clu_count += 1;
					self.write_inode(n, IStatus::InUse, &mut ino)?;
				}
			}
		}

		let c = self.alloc_cluster(n)?;
		match path {
			RefPath::Direct(i) => ino.direct[i] = c,
			RefPath::Single(i) => {
				let mut refs = self.read_refs(ino.i1)?;
				refs[i] = c;
				self.write_refs(ino.i1, &refs)?;
			}
			RefPath::Double(o, i) => {
				let outer = self.read_refs(ino.i2)?;
				let mut inner = self.read_refs(outer[o])?;
				inner[i] = c;
				self.write_refs(outer[o], &inner)?;
			}
		}
		ino.clu_count += 1;
		self.attach_logical_cluster(&ino, k, c)?;
		self.write_inode(n, IStatus::InUse, &mut ino)?;
		Ok(c)
	}

	/// A reference page starts out with every entry null.
	fn alloc_ref_cluster(&mut self, n: InodeNum) -> Result<ClusterNum> {
		let c = self.alloc_cluster(n)?;
		let mut buf = self.read_cluster(c)?;
		set_refs(&mut buf, &[ClusterNum::NULL; RPC])?;
		self.write_cluster(c, &buf)?;
		Ok(c)
	}

	fn relink(&mut self, c: ClusterNum, f: impl FnOnce(&mut ClusterHeader)) -> Result<()> {
		let mut buf = self.read_cluster(c)?;
		let mut hdr = header_of(&buf)?;
		f(&mut hdr);
		set_header(&mut buf, &hdr)?;
		self.write_cluster(c, &buf)
	}

	/// Stitch `c` into the sibling chain between its logical neighbours.
	fn attach_logical_cluster(&mut self, ino: &Inode, k: u32, c: ClusterNum) -> Result<()> {
		let prev = if k > 0 { self.lookup_ref(ino, k - 1)? } else { None };
		let next = if k + 1 < MAX_FILE_CLUSTERS {
			self.lookup_ref(ino, k + 1)?
		} else {
			None
		};
		let mut buf = self.read_cluster(c)?;
		let hdr = header_of(&buf)?;
		set_header(
			&mut buf,
			&ClusterHeader {
				prev: prev.unwrap_or(ClusterNum::NULL),
				next: next.unwrap_or(ClusterNum::NULL),
				stat: hdr.stat,
			},
		)?;
		self.write_cluster(c, &buf)?;
		if let Some(p) = prev {
			self.relink(p, |h| h.next = c)?;
		}
		if let Some(x) = next {
			self.relink(x, |h| h.prev = c)?;
		}
		Ok(())
	}

	/// The departing cluster's logical neighbours stop pointing at it.
	fn detach_logical_cluster(&mut self, ino: &Inode, k: u32) -> Result<()> {
		if k > 0 {
			if let Some(p) = self.lookup_ref(ino, k - 1)? {
				self.relink(p, |h| h.next = ClusterNum::NULL)?;
			}
		}
		if k + 1 < MAX_FILE_CLUSTERS {
			if let Some(x) = self.lookup_ref(ino, k + 1)? {
				self.relink(x, |h| h.prev = ClusterNum::NULL)?;
			}
		}
		Ok(())
	}

	/// FREE: hand the cluster at `k` to the free pool, keeping the mapping.
	pub fn free_file_cluster(&mut self, n: InodeNum, k: u32) -> Result<()> {
		log::trace!("free_file_cluster({n}, {k});");
		let ino = self.read_inode(n, IStatus::InUse)?;
		let Some(c) = self.lookup_ref(&ino, k)? else {
			return Err(Error::ClusterNotInList);
		};
		self.free_cluster(c)
	}

	/// FREE_CLEAN: free the cluster at `k` and dissociate it immediately.
	pub fn free_clean_file_cluster(&mut self, n: InodeNum, k: u32) -> Result<()> {
		log::trace!("free_clean_file_cluster({n}, {k});");
		let mut ino = self.read_inode(n, IStatus::InUse)?;
		let Some(c) = self.lookup_ref(&ino, k)? else {
			return Err(Error::ClusterNotInList);
		};
		self.free_cluster(c)?;
		self.dissociate(n, &mut ino, k, c)?;
		self.write_inode(n, IStatus::InUse, &mut ino)
	}

	/// CLEAN: dissociate the cluster at `k` of a dirty free inode.
	pub fn clean_file_cluster(&mut self, n: InodeNum, k: u32) -> Result<()> {
		log::trace!("clean_file_cluster({n}, {k});");
		let mut ino = self.read_inode(n, IStatus::FreeDirty)?;
		let Some(c) = self.lookup_ref(&ino, k)? else {
			return Err(Error::ClusterNotInList);
		};
		self.dissociate(n, &mut ino, k, c)?;
		self.write_inode(n, IStatus::FreeDirty, &mut ino)
	}

	/// Break the association between inode `n` and the cluster mapped at
	/// `k`: clear the cluster's owner and body, unstitch its siblings,
	/// null the mapping slot, and collapse reference pages that emptied.
	///
	/// Free-cluster bookkeeping is not touched for the leaf; an emptied
	/// reference page, which is still allocated, is freed on the way out.
	fn dissociate(&mut self, n: InodeNum, ino: &mut Inode, k: u32, c: ClusterNum) -> Result<()> {
		let mut buf = self.read_cluster(c)?;
		let hdr = header_of(&buf)?;
		if hdr.stat != n {
			log::error!("dissociate({n}, {k}): cluster {c} is owned by {}", hdr.stat);
			return Err(Error::WrongOwnerInode);
		}
		// a dirty free inode's clusters are all in the free pool already,
		// where prev/next carry repository linkage, not sibling linkage
		if !ino.is_free() {
			self.detach_logical_cluster(ino, k)?;
		}
		body_mut(&mut buf).fill(0);
		set_header(
			&mut buf,
			&ClusterHeader {
				prev: hdr.prev,
				next: hdr.next,
				stat: InodeNum::NULL,
			},
		)?;
		self.write_cluster(c, &buf)?;
		ino.clu_count -= 1;

		match ref_path(k)? {
			RefPath::Direct(i) => ino.direct[i] = ClusterNum::NULL,
			RefPath::Single(i) => {
				let mut refs = self.read_refs(ino.i1)?;
				refs[i] = ClusterNum::NULL;
				self.write_refs(ino.i1, &refs)?;
				if refs.iter().all(|r| r.is_null()) {
					self.drop_ref_cluster(n, ino.i1)?;
					ino.i1 = ClusterNum::NULL;
					ino.clu_count -= 1;
				}
			}
			RefPath::Double(o, i) => {
				let mut outer = self.read_refs(ino.i2)?;
				let mut inner = self.read_refs(outer[o])?;
				inner[i] = ClusterNum::NULL;
				self.write_refs(outer[o], &inner)?;
				if inner.iter().all(|r| r.is_null()) {
					self.drop_ref_cluster(n, outer[o])?;
					ino.clu_count -= 1;
					outer[o] = ClusterNum::NULL;
					self.write_refs(ino.i2, &outer)?;
					if outer.iter().all(|r| r.is_null()) {
						self.drop_ref_cluster(n, ino.i2)?;
						ino.i2 = ClusterNum::NULL;
						ino.clu_count -= 1;
					}
				}
			}
		}
		Ok(())
	}

	/// An emptied reference page goes back to the free pool already clean.
	fn drop_ref_cluster(&mut self, n: InodeNum, c: ClusterNum) -> Result<()> {
		let mut buf = self.read_cluster(c)?;
		let hdr = header_of(&buf)?;
		if hdr.stat != n {
			return Err(Error::WrongOwnerInode);
		}
		body_mut(&mut buf).fill(0);
		set_header(
			&mut buf,
			&ClusterHeader {
				prev: ClusterNum::NULL,
				next: ClusterNum::NULL,
				stat: InodeNum::NULL,
			},
		)?;
		self.write_cluster(c, &buf)?;
		self.free_cluster(c)
	}

	/// Locate the cluster `c` in `ino`'s reference tree.
	fn find_ref(&mut self, ino: &Inode, c: ClusterNum) -> Result<Option<u32>> {
		for i in 0..N_DIRECT {
			if ino.direct[i] == c {
				return Ok(Some(i as u32));
			}
		}
		if !ino.i1.is_null() {
			let refs = self.read_refs(ino.i1)?;
			for (i, r) in refs.iter().enumerate() {
				if *r == c {
					return Ok(Some((N_DIRECT + i) as u32));
				}
			}
		}
		if !ino.i2.is_null() {
			let outer = self.read_refs(ino.i2)?;
			for (o, oc) in outer.iter().enumerate() {
				if oc.is_null() {
					continue;
				}
				let inner = self.read_refs(*oc)?;
				for (i, r) in inner.iter().enumerate() {
					if *r == c {
						return Ok(Some((N_DIRECT + RPC + o * RPC + i) as u32));
					}
				}
			}
		}
		Ok(None)
	}

	/// Dissociate a dirty free cluster from the inode its `stat` names.
	///
	/// The owner may be in use (it released the cluster with FREE and kept
	/// the mapping) or free dirty (it was unlinked wholesale).
	pub(crate) fn clean_data_cluster(&mut self, owner: InodeNum, c: ClusterNum) -> Result<()> {
		log::trace!("clean_data_cluster({owner}, {c});");
		self.valid_inum(owner).map_err(|_| Error::WrongOwnerInode)?;
		let mut ino = self.read_inode_raw(owner)?;
		if ino.is_free() {
			check::inode_free_dirty_ok(&ino)?;
		} else {
			check::inode_in_use_ok(&ino)?;
		}
		let Some(k) = self.find_ref(&ino, c)? else {
			log::error!("clean_data_cluster({owner}, {c}): not mapped by its stat inode");
			return Err(Error::WrongOwnerInode);
		};
		self.dissociate(owner, &mut ino, k, c)?;
		self.write_inode_raw(owner, &ino)
	}

	/// FREE every mapped leaf of `n`, leaving the mappings in place for the
	/// lazy clean. Used when a file's storage is reclaimed at last unlink.
	///
	/// A leaf the caller already released with FREE is skipped; re-freeing
	/// is idempotent here.
	pub(crate) fn free_all_clusters(&mut self, n: InodeNum) -> Result<()> {
		log::trace!("free_all_clusters({n});");
		let ino = self.read_inode_raw(n)?;
		check::inode_in_use_ok(&ino)?;
		for i in 0..N_DIRECT {
			if !ino.direct[i].is_null() {
				self.free_cluster_lenient(ino.direct[i])?;
			}
		}
		if !ino.i1.is_null() {
			let refs = self.read_refs(ino.i1)?;
			for r in refs.iter().filter(|r| !r.is_null()) {
				self.free_cluster_lenient(*r)?;
			}
		}
		if !ino.i2.is_null() {
			let outer = self.read_refs(ino.i2)?;
			for oc in outer.iter().filter(|c| !c.is_null()) {
				let inner = self.read_refs(*oc)?;
				for r in inner.iter().filter(|r| !r.is_null()) {
					self.free_cluster_lenient(*r)?;
				}
			}
		}
		Ok(())
	}

	fn free_cluster_lenient(&mut self, c: ClusterNum) -> Result<()> {
		match self.free_cluster(c) {
			Ok(()) | Err(Error::ClusterAlreadyInList) => Ok(()),
			Err(e) => Err(e),
		}
	}

	/// Dissociate everything a dirty free inode still references,
	/// reference pages included.
	pub(crate) fn clean_all_clusters(&mut self, n: InodeNum) -> Result<()> {
		log::trace!("clean_all_clusters({n});");
		let mut ino = self.read_inode(n, IStatus::FreeDirty)?;

		for i in 0..N_DIRECT {
			let c = ino.direct[i];
			if !c.is_null() {
				self.dissociate(n, &mut ino, i as u32, c)?;
			}
		}
		if !ino.i1.is_null() {
			let refs = self.read_refs(ino.i1)?;
			for (i, r) in refs.iter().enumerate() {
				if !r.is_null() {
					self.dissociate(n, &mut ino, (N_DIRECT + i) as u32, *r)?;
				}
			}
		}
		if !ino.i2.is_null() {
			let outer = self.read_refs(ino.i2)?;
			for (o, oc) in outer.iter().enumerate() {
				if oc.is_null() {
					continue;
				}
				let inner = self.read_refs(*oc)?;
				for (i, r) in inner.iter().enumerate() {
					if !r.is_null() {
						let k = (N_DIRECT + RPC + o * RPC + i) as u32;
						self.dissociate(n, &mut ino, k, *r)?;
					}
				}
			}
		}

		// pages that were created but never filled have no entry to clean
		// and are dropped here
		if !ino.i1.is_null() {
			let refs = self.read_refs(ino.i1)?;
			if refs.iter().all(|r| r.is_null()) {
				self.drop_ref_cluster(n, ino.i1)?;
				ino.i1 = ClusterNum::NULL;
				ino.clu_count -= 1;
			}
		}
		if !ino.i2.is_null() {
			let mut outer = self.read_refs(ino.i2)?;
			let mut changed = false;
			for o in 0..RPC {
				if outer[o].is_null() {
					continue;
				}
				let inner = self.read_refs(outer[o])?;
				if inner.iter().all(|r| r.is_null()) {
					self.drop_ref_cluster(n, outer[o])?;
					outer[o] = ClusterNum::NULL;
					ino.clu_count -= 1;
					changed = true;
				}
			}
			if changed {
				self.write_refs(ino.i2, &outer)?;
			}
			if outer.iter().all(|r| r.is_null()) {
				self.drop_ref_cluster(n, ino.i2)?;
				ino.i2 = ClusterNum::NULL;
				ino.clu_count -= 1;
			}
		}

		if ino.clu_count != 0
			|| ino.direct.iter().any(|c| !c.is_null())
			|| !ino.i1.is_null()
			|| !ino.i2.is_null()
		{
			log::error!("clean_all_clusters({n}): residue, cluCount={}", ino.clu_count);
			return Err(Error::ClusterMappingInvalid);
		}
		self.write_inode(n, IStatus::FreeDirty, &mut ino)
	}
}

#[cfg(test)]
mod t {
	use super::*;

	#[test]
	fn bucket_boundaries() {
		let nd = N_DIRECT as u32;
		let rpc = RPC as u32;
		assert_eq!(ref_path(0).unwrap(), RefPath::Direct(0));
		assert_eq!(ref_path(nd - 1).unwrap(), RefPath::Direct(N_DIRECT - 1));
		assert_eq!(ref_path(nd).unwrap(), RefPath::Single(0));
		assert_eq!(ref_path(nd + rpc - 1).unwrap(), RefPath::Single(RPC - 1));
		assert_eq!(ref_path(nd + rpc).unwrap(), RefPath::Double(0, 0));
		assert_eq!(
			ref_path(nd + rpc + rpc).unwrap(),
			RefPath::Double(1, 0)
		);
		assert_eq!(
			ref_path(MAX_FILE_CLUSTERS - 1).unwrap(),
			RefPath::Double(RPC - 1, RPC - 1)
		);
		assert!(matches!(
			ref_path(MAX_FILE_CLUSTERS),
			Err(Error::FileTooLarge)
		));
	}
}
