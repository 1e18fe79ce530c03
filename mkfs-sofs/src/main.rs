use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rsofs::{format, FormatOpts};

/// Format a backing file as an empty SOFS volume.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
	/// Volume name
	#[arg(short = 'n', long = "name", default_value = "SOFS")]
	name: String,

	/// Number of inodes (default: one per eight blocks)
	#[arg(short = 'i', long = "inodes")]
	inodes: Option<u32>,

	/// Zero-fill the free data clusters
	#[arg(short = 'z', long = "zero")]
	zero: bool,

	/// Suppress progress messages
	#[arg(short = 'q', long = "quiet")]
	quiet: bool,

	/// Path to the device image
	device: PathBuf,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::builder()
		.filter_level(if cli.quiet {
			log::LevelFilter::Error
		} else {
			log::LevelFilter::Info
		})
		.parse_default_env()
		.init();

	let opts = FormatOpts {
		name:   cli.name,
		inodes: cli.inodes,
		zero:   cli.zero,
	};
	let geo = format(&cli.device, &opts)?;

	if !cli.quiet {
		println!(
			"{}: {} blocks, {} inodes, {} clusters",
			cli.device.display(),
			geo.blocks,
			geo.inodes,
			geo.clusters
		);
	}
	Ok(())
}

#[cfg(test)]
mod t {
	use clap::Parser;

	use super::Cli;

	#[test]
	fn parse_flags() {
		let cli = Cli::parse_from(["mkfs-sofs", "-n", "VOL", "-i", "128", "-z", "-q", "disk.img"]);
		assert_eq!(cli.name, "VOL");
		assert_eq!(cli.inodes, Some(128));
		assert!(cli.zero);
		assert!(cli.quiet);
	}

	#[test]
	fn defaults() {
		let cli = Cli::parse_from(["mkfs-sofs", "disk.img"]);
		assert_eq!(cli.name, "SOFS");
		assert_eq!(cli.inodes, None);
		assert!(!cli.zero);
	}
}
