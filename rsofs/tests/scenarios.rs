use std::fs::File;

use rsofs::*;
use rstest::rstest;
use tempfile::NamedTempFile;

const DIR_SZ: u64 = (DPC * DIR_ENTRY_SIZE) as u64;

fn image(nblocks: u64) -> NamedTempFile {
	let f = NamedTempFile::new().unwrap();
	f.as_file().set_len(nblocks * BLOCK_SIZE as u64).unwrap();
	f
}

fn harness(nblocks: u64) -> (NamedTempFile, Sofs<File>) {
	let img = image(nblocks);
	format(img.path(), &FormatOpts::default()).unwrap();
	let fs = Sofs::mount(img.path()).unwrap();
	(img, fs)
}

#[test]
fn fresh_format() {
	let img = image(4096);
	let geo = format(img.path(), &FormatOpts::default()).unwrap();
	assert_eq!(geo.blocks, 4096);
	assert_eq!(geo.inodes, 512);
	assert_eq!(geo.clusters, 1007);

	let mut fs = Sofs::mount(img.path()).unwrap();
	let info = fs.info();
	assert_eq!(info.files, 512);
	assert_eq!(info.ffree, 511);
	assert_eq!(info.clusters, 1007);
	assert_eq!(info.cfree, 1006);
	assert_eq!(info.volume, "SOFS");
	assert_eq!(info.bsize, 512);
	assert_eq!(info.csize, 2048);

	let st = fs.stat("/").unwrap();
	assert_eq!(st.inr, InodeNum::ROOT);
	assert_eq!(st.kind, InodeType::Directory);
	assert_eq!(st.perm & 0o111, 0o111);
	assert_eq!(st.size, DIR_SZ);
	assert_eq!(st.nlink, 2);
	assert_eq!(st.clusters, 1);

	// an empty directory yields `.`, `..` and then end-of-entries
	let (name, inr, pos) = fs.readdir("/", 0).unwrap().unwrap();
	assert_eq!((name.as_str(), inr), (".", InodeNum::ROOT));
	let (name, inr, pos) = fs.readdir("/", pos).unwrap().unwrap();
	assert_eq!((name.as_str(), inr), ("..", InodeNum::ROOT));
	assert_eq!(pos, 2);
	assert!(fs.readdir("/", pos).unwrap().is_none());

	fs.unmount().unwrap();
}

#[test]
fn zero_filled_format_mounts() {
	let img = image(1024);
	let opts = FormatOpts {
		name: "ZEROED".into(),
		zero: true,
		..FormatOpts::default()
	};
	format(img.path(), &opts).unwrap();
	let mut fs = Sofs::mount(img.path()).unwrap();
	assert_eq!(fs.info().volume, "ZEROED");
	fs.unmount().unwrap();
}

#[test]
fn remount_after_crash_runs_checks() {
	let (img, fs) = harness(1024);
	// dropping without unmount leaves the in-use flag on disk
	drop(fs);
	let mut fs = Sofs::mount(img.path()).unwrap();
	assert_eq!(fs.superblock().mstat, MSTAT_IN_USE);
	assert!(fs.stat("/").is_ok());
	fs.unmount().unwrap();

	let mut fs = Sofs::mount(img.path()).unwrap();
	fs.unmount().unwrap();
}

#[test]
fn single_file_round_trip() {
	let (_img, mut fs) = harness(1024);
	let ifree0 = fs.info().ffree;
	let cfree0 = fs.info().cfree;

	fs.mknod("/a", 0o644).unwrap();
	assert_eq!(fs.info().ffree, ifree0 - 1);
	assert_eq!(fs.stat("/a").unwrap().inr, InodeNum::new(1));

	assert_eq!(fs.write("/a", b"hello", 0).unwrap(), 5);
	assert_eq!(fs.info().cfree, cfree0 - 1);

	let mut buf = [0u8; 16];
	assert_eq!(fs.read("/a", &mut buf, 0).unwrap(), 5);
	assert_eq!(&buf[..5], b"hello");

	let st = fs.stat("/a").unwrap();
	assert_eq!(st.size, 5);
	assert_eq!(st.clusters, 1);
	assert_eq!(st.perm, 0o644);
	assert_eq!(st.kind, InodeType::RegularFile);

	// writing the same bytes twice is idempotent
	fs.write("/a", b"hello", 0).unwrap();
	assert_eq!(fs.stat("/a").unwrap().size, 5);
	assert_eq!(fs.info().cfree, cfree0 - 1);

	fs.unlink("/a").unwrap();
	assert_eq!(fs.info().ffree, ifree0);
	assert_eq!(fs.info().cfree, cfree0);
	assert!(matches!(fs.stat("/a"), Err(Error::DoesNotExist)));
}

#[test]
fn payload_survives_remount() {
	let (img, mut fs) = harness(1024);
	fs.mkdir("/docs", 0o755).unwrap();
	fs.mknod("/docs/note", 0o644).unwrap();
	let payload: Vec<u8> = (0..6000u32).map(|i| (i % 251) as u8).collect();
	fs.write("/docs/note", &payload, 0).unwrap();
	fs.unmount().unwrap();
	drop(fs);

	let mut fs = Sofs::mount(img.path()).unwrap();
	let st = fs.stat("/docs/note").unwrap();
	assert_eq!(st.size, payload.len() as u64);
	assert_eq!(st.clusters, 3);
	let mut back = vec![0u8; payload.len()];
	assert_eq!(fs.read("/docs/note", &mut back, 0).unwrap(), payload.len());
	assert_eq!(back, payload);
	fs.unmount().unwrap();
}

#[test]
fn directory_growth() {
	let (_img, mut fs) = harness(4096);
	// `.` and `..` occupy two slots, so DPC-2 creates still fit
	for i in 0..DPC - 2 {
		fs.mknod(&format!("/f{i:02}"), 0o644).unwrap();
	}
	assert_eq!(fs.stat("/").unwrap().size, DIR_SZ);
	assert_eq!(fs.stat("/").unwrap().clusters, 1);

	fs.mknod("/overflow", 0o644).unwrap();
	let st = fs.stat("/").unwrap();
	assert_eq!(st.size, 2 * DIR_SZ);
	assert_eq!(st.clusters, 2);

	assert!(fs.stat("/f00").is_ok());
	assert!(fs.stat(&format!("/f{:02}", DPC - 3)).is_ok());
	assert!(fs.stat("/overflow").is_ok());

	// removing the overflow entry releases the extension cluster again
	let cfree = fs.info().cfree;
	fs.unlink("/overflow").unwrap();
	assert_eq!(fs.info().cfree, cfree + 1);
	assert_eq!(fs.stat("/").unwrap().clusters, 1);
}

#[test]
fn freed_slots_are_reused() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/a", 0o644).unwrap();
	fs.mknod("/b", 0o644).unwrap();
	fs.mknod("/c", 0o644).unwrap();
	fs.unlink("/b").unwrap();
	// the hole left by /b takes the next entry; the directory must not grow
	fs.mknod("/d", 0o644).unwrap();
	assert_eq!(fs.stat("/").unwrap().size, DIR_SZ);
	assert!(fs.stat("/a").is_ok());
	assert!(fs.stat("/c").is_ok());
	assert!(fs.stat("/d").is_ok());
}

#[test]
fn cache_boundary() {
	let (_img, mut fs) = harness(4096);
	fs.mknod("/big", 0o644).unwrap();
	let inr = fs.stat("/big").unwrap().inr;
	let cfree0 = fs.info().cfree;
	assert_eq!(fs.superblock().retrieval_idx, DZC as u32);

	// DZC+1 data clusters plus one single-indirect page: the retrieval
	// cache drains exactly once along the way
	let body = [0x42u8; BSLPC];
	for k in 0..=DZC as u32 {
		fs.write_file_cluster(inr, k, &body).unwrap();
	}
	assert_eq!(fs.info().cfree, cfree0 - DZC as u64 - 2);
	assert_eq!(fs.superblock().retrieval_idx, 2);
	assert_eq!(fs.stat("/big").unwrap().clusters, DZC as u64 + 2);

	// freeing in reverse overflows the insertion cache exactly once
	for k in (0..=DZC as u32).rev() {
		fs.free_clean_file_cluster(inr, k).unwrap();
	}
	assert_eq!(fs.info().cfree, cfree0);
	assert_eq!(fs.superblock().insertion_idx, 2);
	assert_eq!(fs.stat("/big").unwrap().clusters, 0);

	fs.unlink("/big").unwrap();
}

#[test]
fn mapper_rejects_double_alloc_and_missing_free() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/m", 0o644).unwrap();
	let inr = fs.stat("/m").unwrap().inr;

	assert!(fs.get_file_cluster(inr, 3).unwrap().is_none());
	fs.alloc_file_cluster(inr, 3).unwrap();
	assert!(fs.get_file_cluster(inr, 3).unwrap().is_some());
	assert!(matches!(
		fs.alloc_file_cluster(inr, 3),
		Err(Error::ClusterAlreadyInList)
	));
	assert!(matches!(
		fs.free_file_cluster(inr, 4),
		Err(Error::ClusterNotInList)
	));

	// FREE leaves the mapping in place and rejects a second free
	fs.free_file_cluster(inr, 3).unwrap();
	assert!(fs.get_file_cluster(inr, 3).unwrap().is_some());
	assert!(matches!(
		fs.free_file_cluster(inr, 3),
		Err(Error::ClusterAlreadyInList)
	));
}

#[rstest]
#[case(N_DIRECT as u32 - 1)]
#[case(N_DIRECT as u32)]
#[case(N_DIRECT as u32 + RPC as u32 - 1)]
#[case(N_DIRECT as u32 + RPC as u32)]
fn boundary_alloc(#[case] k: u32) {
	let (_img, mut fs) = harness(8192);
	fs.mknod("/sparse", 0o644).unwrap();
	let inr = fs.stat("/sparse").unwrap().inr;

	let pos = k as u64 * BSLPC as u64;
	assert_eq!(fs.write("/sparse", b"x", pos).unwrap(), 1);
	assert_eq!(fs.stat("/sparse").unwrap().size, pos + 1);

	let mut buf = [0u8; 1];
	assert_eq!(fs.read("/sparse", &mut buf, pos).unwrap(), 1);
	assert_eq!(&buf, b"x");

	assert!(fs.get_file_cluster(inr, k).unwrap().is_some());
	if k > 0 {
		// everything below the written cluster is a hole and reads zero
		assert!(fs.get_file_cluster(inr, k - 1).unwrap().is_none());
		assert_eq!(fs.read("/sparse", &mut buf, pos - 1).unwrap(), 1);
		assert_eq!(buf[0], 0);
	}
}

#[test]
fn sibling_chain_is_stitched() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/chain", 0o644).unwrap();
	let inr = fs.stat("/chain").unwrap().inr;
	let c0 = fs.alloc_file_cluster(inr, 0).unwrap();
	let c2 = fs.alloc_file_cluster(inr, 2).unwrap();
	// filling the gap links both neighbours to the newcomer
	let c1 = fs.alloc_file_cluster(inr, 1).unwrap();
	assert_ne!(c0, c1);
	assert_ne!(c1, c2);
	assert!(fs.get_file_cluster(inr, 1).unwrap() == Some(c1));
}

#[test]
fn truncate_shrinks_and_grows() {
	let (_img, mut fs) = harness(1024);
	let cfree0 = fs.info().cfree;
	fs.mknod("/t", 0o644).unwrap();

	let payload: Vec<u8> = (0..3 * BSLPC).map(|i| (i % 199) as u8 + 1).collect();
	fs.write("/t", &payload, 0).unwrap();
	assert_eq!(fs.info().cfree, cfree0 - 3);

	let keep = BSLPC as u64 + 10;
	fs.truncate("/t", keep).unwrap();
	assert_eq!(fs.stat("/t").unwrap().size, keep);
	assert_eq!(fs.info().cfree, cfree0 - 2);

	// reads stop at the new end
	let mut buf = vec![0u8; 4 * BSLPC];
	assert_eq!(fs.read("/t", &mut buf, 0).unwrap(), keep as usize);
	assert_eq!(buf[..keep as usize], payload[..keep as usize]);

	// growing back leaves a zero hole where cluster 2 used to be
	fs.truncate("/t", 3 * BSLPC as u64).unwrap();
	assert_eq!(fs.stat("/t").unwrap().size, 3 * BSLPC as u64);
	assert_eq!(fs.info().cfree, cfree0 - 2);
	let mut one = [0xFFu8; 1];
	fs.read("/t", &mut one, 2 * BSLPC as u64 + 100).unwrap();
	assert_eq!(one[0], 0);
	// and the tail of the kept cluster was zeroed on the way down
	fs.read("/t", &mut one, keep).unwrap();
	assert_eq!(one[0], 0);

	fs.truncate("/t", 0).unwrap();
	assert_eq!(fs.info().cfree, cfree0);
}

#[test]
fn symlink_resolution() {
	let (_img, mut fs) = harness(1024);
	fs.mkdir("/d", 0o755).unwrap();
	fs.symlink("/d", "/l").unwrap();
	assert_eq!(fs.readlink("/l").unwrap(), "/d");
	assert_eq!(fs.stat("/l").unwrap().kind, InodeType::Symlink);

	// one indirection is followed when the link is used as a directory
	fs.mkdir("/l/sub", 0o755).unwrap();
	assert!(fs.stat("/d/sub").is_ok());
	fs.mknod("/l/sub/file", 0o644).unwrap();
	fs.write("/d/sub/file", b"via the link", 0).unwrap();
	let mut buf = [0u8; 12];
	fs.read("/l/sub/file", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"via the link");

	// a second indirection in the same resolution is refused
	fs.symlink("/l", "/l2").unwrap();
	assert!(matches!(fs.stat("/l2/x"), Err(Error::TooManyLinks)));
	assert!(matches!(
		fs.mknod("/l2/y", 0o644),
		Err(Error::TooManyLinks)
	));

	// readlink on anything else is refused
	assert!(matches!(fs.readlink("/d"), Err(Error::InvalidArgument)));
}

#[test]
fn rename_across_types() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/a", 0o644).unwrap();
	fs.mkdir("/b", 0o755).unwrap();
	fs.mknod("/b/x", 0o644).unwrap();
	assert!(matches!(fs.rename("/a", "/b"), Err(Error::IsADirectory)));

	fs.mkdir("/c", 0o755).unwrap();
	assert!(matches!(fs.rename("/c", "/b"), Err(Error::NotEmpty)));
	assert!(matches!(fs.rename("/b", "/a"), Err(Error::NotADirectory)));

	// an empty directory may replace an empty directory
	fs.mkdir("/e", 0o755).unwrap();
	fs.rename("/c", "/e").unwrap();
	assert!(fs.stat("/c").is_err());
	assert!(fs.stat("/e").is_ok());
}

#[test]
fn rename_back_and_forth() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/a", 0o644).unwrap();
	fs.write("/a", b"payload", 0).unwrap();
	let inr = fs.stat("/a").unwrap().inr;

	fs.rename("/a", "/b").unwrap();
	assert!(matches!(fs.stat("/a"), Err(Error::DoesNotExist)));
	assert_eq!(fs.stat("/b").unwrap().inr, inr);

	fs.rename("/b", "/a").unwrap();
	assert!(matches!(fs.stat("/b"), Err(Error::DoesNotExist)));
	let mut buf = [0u8; 7];
	fs.read("/a", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"payload");
	assert_eq!(fs.stat("/a").unwrap().nlink, 1);
}

#[test]
fn rename_directory_across_parents() {
	let (_img, mut fs) = harness(1024);
	fs.mkdir("/p1", 0o755).unwrap();
	fs.mkdir("/p2", 0o755).unwrap();
	fs.mkdir("/p1/c", 0o755).unwrap();
	fs.mknod("/p1/c/file", 0o644).unwrap();
	assert_eq!(fs.stat("/p1").unwrap().nlink, 3);
	assert_eq!(fs.stat("/p2").unwrap().nlink, 2);

	fs.rename("/p1/c", "/p2/c2").unwrap();
	assert!(fs.stat("/p1/c").is_err());
	assert!(fs.stat("/p2/c2/file").is_ok());
	assert_eq!(fs.stat("/p1").unwrap().nlink, 2);
	assert_eq!(fs.stat("/p2").unwrap().nlink, 3);
	// the moved directory's `..` now names the new parent
	assert_eq!(
		fs.stat("/p2/c2/..").unwrap().inr,
		fs.stat("/p2").unwrap().inr
	);

	// a directory cannot move underneath itself
	assert!(matches!(
		fs.rename("/p2", "/p2/c2/inside"),
		Err(Error::InvalidArgument)
	));

	// renaming to itself is a no-op
	fs.rename("/p2/c2", "/p2/c2").unwrap();
	assert!(fs.stat("/p2/c2").is_ok());
}

#[test]
fn hard_links() {
	let (_img, mut fs) = harness(1024);
	let cfree0 = fs.info().cfree;
	let ifree0 = fs.info().ffree;

	fs.mknod("/a", 0o644).unwrap();
	fs.write("/a", b"shared", 0).unwrap();
	fs.link("/a", "/b").unwrap();

	let sa = fs.stat("/a").unwrap();
	let sb = fs.stat("/b").unwrap();
	assert_eq!(sa.inr, sb.inr);
	assert_eq!(sa.nlink, 2);
	assert_eq!(fs.info().ffree, ifree0 - 1);

	// the data stays while one name remains
	fs.unlink("/a").unwrap();
	assert_eq!(fs.stat("/b").unwrap().nlink, 1);
	let mut buf = [0u8; 6];
	fs.read("/b", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"shared");
	assert_eq!(fs.info().cfree, cfree0 - 1);

	fs.unlink("/b").unwrap();
	assert_eq!(fs.info().ffree, ifree0);
	assert_eq!(fs.info().cfree, cfree0);

	// directories may not be hard linked
	fs.mkdir("/d", 0o755).unwrap();
	assert!(matches!(
		fs.link("/d", "/d2"),
		Err(Error::OperationNotPermitted)
	));
}

#[test]
fn mkdir_rmdir_restores_the_parent() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/keep", 0o644).unwrap();
	let before = fs.stat("/").unwrap();
	let cfree0 = fs.info().cfree;
	let ifree0 = fs.info().ffree;

	fs.mkdir("/d", 0o700).unwrap();
	assert_eq!(fs.stat("/").unwrap().nlink, before.nlink + 1);
	assert_eq!(fs.stat("/d").unwrap().nlink, 2);

	fs.rmdir("/d").unwrap();
	let after = fs.stat("/").unwrap();
	assert_eq!(after.nlink, before.nlink);
	assert_eq!(after.size, before.size);
	assert_eq!(fs.info().cfree, cfree0);
	assert_eq!(fs.info().ffree, ifree0);

	let mut names = Vec::new();
	let mut pos = 0;
	while let Some((name, _, next)) = fs.readdir("/", pos).unwrap() {
		names.push(name);
		pos = next;
	}
	assert_eq!(names, vec![".", "..", "keep"]);
}

#[test]
fn rmdir_and_unlink_type_rules() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/f", 0o644).unwrap();
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/x", 0o644).unwrap();

	assert!(matches!(fs.rmdir("/f"), Err(Error::NotADirectory)));
	assert!(matches!(fs.unlink("/d"), Err(Error::IsADirectory)));
	assert!(matches!(fs.rmdir("/d"), Err(Error::NotEmpty)));

	fs.unlink("/d/x").unwrap();
	fs.rmdir("/d").unwrap();
	assert!(fs.stat("/d").is_err());
}

#[test]
fn lazy_cleaning_recycles_inodes_and_clusters() {
	let img = image(512);
	let opts = FormatOpts {
		inodes: Some(8),
		..FormatOpts::default()
	};
	format(img.path(), &opts).unwrap();
	let mut fs = Sofs::mount(img.path()).unwrap();
	let ifree0 = fs.info().ffree;
	let cfree0 = fs.info().cfree;
	assert_eq!(ifree0, 7);

	// enough rounds to force every free inode through a dirty recycle and
	// the freed clusters back out of the caches
	for round in 0u32..20 {
		let payload = vec![round as u8 + 1; 2 * BSLPC + 17];
		fs.mknod("/scratch", 0o644).unwrap();
		fs.write("/scratch", &payload, 0).unwrap();
		let mut back = vec![0u8; payload.len()];
		assert_eq!(fs.read("/scratch", &mut back, 0).unwrap(), payload.len());
		assert_eq!(back, payload, "round {round}");
		fs.unlink("/scratch").unwrap();
		assert_eq!(fs.info().ffree, ifree0, "round {round}");
		assert_eq!(fs.info().cfree, cfree0, "round {round}");
	}
	fs.unmount().unwrap();
}

#[test]
fn resource_exhaustion() {
	let img = image(256);
	let opts = FormatOpts {
		inodes: Some(8),
		..FormatOpts::default()
	};
	format(img.path(), &opts).unwrap();
	let mut fs = Sofs::mount(img.path()).unwrap();

	// 7 free inodes
	for i in 0..7 {
		fs.mknod(&format!("/f{i}"), 0o644).unwrap();
	}
	assert!(matches!(fs.mknod("/one-too-many", 0o644), Err(Error::NoInodes)));

	// fill the data zone through one file
	let mut k = 0u32;
	let err = loop {
		match fs.write("/f0", &[7u8; BSLPC], k as u64 * BSLPC as u64) {
			Ok(_) => k += 1,
			Err(e) => break e,
		}
	};
	assert!(matches!(err, Error::NoSpaceOnDevice));
	assert_eq!(fs.info().cfree, 0);

	// freeing space makes writes possible again
	fs.truncate("/f0", 0).unwrap();
	assert!(fs.write("/f1", b"fits again", 0).is_ok());
}

#[test]
fn permission_checks() {
	let (_img, mut fs) = harness(1024);
	fs.chmod("/", 0o777).unwrap();

	fs.set_credentials(1000, 1000);
	fs.mknod("/secret", 0o600).unwrap();
	fs.write("/secret", b"mine", 0).unwrap();

	fs.set_credentials(2000, 2000);
	let mut buf = [0u8; 4];
	assert!(matches!(
		fs.read("/secret", &mut buf, 0),
		Err(Error::AccessDenied)
	));
	assert!(matches!(
		fs.write("/secret", b"x", 0),
		Err(Error::AccessDenied)
	));
	assert!(matches!(
		fs.chmod("/secret", 0o777),
		Err(Error::OperationNotPermitted)
	));
	assert!(fs.access("/secret", 0).is_ok());
	assert!(matches!(
		fs.access("/secret", PERM_R),
		Err(Error::AccessDenied)
	));

	fs.set_credentials(1000, 1000);
	assert_eq!(fs.read("/secret", &mut buf, 0).unwrap(), 4);
	fs.chmod("/secret", 0o644).unwrap();

	// group bits apply to group members
	fs.set_credentials(2000, 1000);
	fs.chmod("/", 0o770).unwrap_err();
	assert_eq!(fs.read("/secret", &mut buf, 0).unwrap(), 4);
}

#[test]
fn path_argument_errors() {
	let (_img, mut fs) = harness(1024);
	assert!(matches!(fs.stat("relative"), Err(Error::RelativePath)));
	assert!(matches!(fs.stat(""), Err(Error::InvalidArgument)));
	assert!(matches!(fs.stat("/nope"), Err(Error::DoesNotExist)));
	assert!(matches!(fs.mknod("/no/such", 0o644), Err(Error::DoesNotExist)));

	let long_name = format!("/{}", "n".repeat(MAX_NAME + 1));
	assert!(matches!(fs.mknod(&long_name, 0o644), Err(Error::NameTooLong)));

	let long_path = format!("/{}", "p".repeat(MAX_PATH));
	assert!(matches!(fs.stat(&long_path), Err(Error::NameTooLong)));

	fs.mknod("/dup", 0o644).unwrap();
	assert!(matches!(fs.mknod("/dup", 0o644), Err(Error::AlreadyExists)));
	assert!(matches!(fs.mkdir("/dup", 0o755), Err(Error::AlreadyExists)));

	// reads through a file as a directory are refused
	assert!(matches!(fs.stat("/dup/x"), Err(Error::NotADirectory)));

	assert!(matches!(
		fs.write("/", b"x", 0),
		Err(Error::IsADirectory)
	));
}

#[test]
fn times_and_utime() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/t", 0o644).unwrap();
	fs.utime("/t", 1000, 2000).unwrap();
	let st = fs.stat("/t").unwrap();
	// stat itself refreshes the access time, mtime stays put
	assert_eq!(
		st.mtime,
		std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(2000)
	);
	assert!(st.atime >= st.mtime);

	// a write moves mtime forward again
	fs.write("/t", b"x", 0).unwrap();
	assert!(fs.stat("/t").unwrap().mtime > st.mtime);
}

#[test]
fn chown_rules() {
	let (_img, mut fs) = harness(1024);
	fs.chmod("/", 0o777).unwrap();
	fs.set_credentials(1000, 1000);
	fs.mknod("/mine", 0o644).unwrap();

	// the owner may change the group but not give the file away
	fs.chown("/mine", None, Some(1001)).unwrap();
	assert_eq!(fs.stat("/mine").unwrap().gid, 1001);
	assert!(matches!(
		fs.chown("/mine", Some(2000), None),
		Err(Error::OperationNotPermitted)
	));

	fs.set_credentials(0, 0);
	fs.chown("/mine", Some(2000), Some(2000)).unwrap();
	let st = fs.stat("/mine").unwrap();
	assert_eq!((st.uid, st.gid), (2000, 2000));
}

#[test]
fn file_too_large() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/huge", 0o644).unwrap();
	assert!(matches!(
		fs.write("/huge", b"x", MAX_FILE_SIZE),
		Err(Error::FileTooLarge)
	));
	assert!(matches!(
		fs.truncate("/huge", MAX_FILE_SIZE + 1),
		Err(Error::FileTooLarge)
	));
}

#[test]
fn open_close_fsync() {
	let (_img, mut fs) = harness(1024);
	fs.mknod("/f", 0o600).unwrap();
	fs.open("/f", PERM_R | PERM_W).unwrap();
	fs.close("/f").unwrap();
	fs.opendir("/").unwrap();
	fs.closedir("/").unwrap();
	assert!(matches!(fs.opendir("/f"), Err(Error::NotADirectory)));
	assert!(matches!(fs.open("/", PERM_W), Err(Error::IsADirectory)));
	fs.fsync("/f").unwrap();
	assert_eq!(fs.statfs("/f").unwrap().files, fs.info().files);
}
