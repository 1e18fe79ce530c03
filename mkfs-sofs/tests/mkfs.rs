use std::process::Command;

use assert_cmd::cargo::CommandCargoExt;

fn image(blocks: u64) -> tempfile::NamedTempFile {
	let f = tempfile::NamedTempFile::new().unwrap();
	f.as_file().set_len(blocks * 512).unwrap();
	f
}

#[test]
fn formats_an_image() {
	let img = image(4096);
	let out = Command::cargo_bin("mkfs-sofs")
		.unwrap()
		.arg("-q")
		.arg(img.path())
		.output()
		.unwrap();
	assert!(out.status.success(), "stderr: {:?}", out.stderr);

	// the image must now mount
	let mut fs = rsofs::Sofs::mount(img.path()).unwrap();
	let info = fs.info();
	assert_eq!(info.files, 512);
	assert_eq!(info.ffree, 511);
	assert_eq!(info.clusters, 1007);
	assert_eq!(info.cfree, 1006);
	fs.unmount().unwrap();
}

#[test]
fn volume_name_and_inode_count() {
	let img = image(2048);
	let out = Command::cargo_bin("mkfs-sofs")
		.unwrap()
		.args(["-q", "-n", "SCRATCH", "-i", "64"])
		.arg(img.path())
		.output()
		.unwrap();
	assert!(out.status.success());

	let mut fs = rsofs::Sofs::mount(img.path()).unwrap();
	let info = fs.info();
	assert_eq!(info.volume, "SCRATCH");
	assert_eq!(info.files, 64);
	fs.unmount().unwrap();
}

#[test]
fn rejects_a_missing_device() {
	let out = Command::cargo_bin("mkfs-sofs")
		.unwrap()
		.arg("/nonexistent/disk.img")
		.output()
		.unwrap();
	assert!(!out.status.success());
}
