use std::{fs::File, path::Path};

use anyhow::Result;
use rsofs::Sofs;

/// The mounted volume plus mount-level policy.
pub struct Fs {
	pub sofs: Sofs<File>,
	pub ro:   bool,
}

impl Fs {
	pub fn open(device: &Path, ro: bool) -> Result<Self> {
		let sofs = Sofs::mount(device)?;
		Ok(Self { sofs, ro })
	}
}
