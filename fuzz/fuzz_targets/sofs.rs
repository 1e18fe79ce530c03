#![no_main]

use std::io::{Cursor, Read, Seek, Write};

use libfuzzer_sys::fuzz_target;
use rsofs::*;

fuzz_target!(|data: Vec<u8>| {
	let len = data.len() as u64;
	let Ok(dev) = RawDevice::new(Cursor::new(data), len) else {
		return;
	};
	let Ok(mut fs) = Sofs::new(BlockCache::new(dev)) else {
		// malformed images are detected and rejected cleanly
		return;
	};
	traverse(&mut fs, InodeNum::ROOT, 0);
});

fn traverse<R: Read + Write + Seek>(fs: &mut Sofs<R>, inr: InodeNum, depth: u32) {
	if depth > 8 {
		return;
	}
	let mut children = Vec::new();
	let _ = fs.dir_iter(inr, |name, inr, _idx| {
		if name != "." && name != ".." {
			children.push(inr);
		}
		None::<()>
	});
	for cinr in children {
		let _ = fs.inode_attr(cinr);
		let mut buf = [0u8; 4096];
		let _ = fs.inode_read(cinr, 0, &mut buf);
		traverse(fs, cinr, depth + 1);
	}
}
