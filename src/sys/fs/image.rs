//! ImageBuilder — assembles boot filesystem images for tests

use super::{FileType, BLOCK_SIZE, BOOT_HEADER, DENTRY_SIZE, FILENAME_MAX};
use std::vec::Vec;

pub struct ImageBuilder {
    entries: Vec<(Vec<u8>, FileType, Vec<u8>)>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Directory, Vec::new()));
        self
    }

    pub fn rtc(mut self, name: &str) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Rtc, Vec::new()));
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.as_bytes().to_vec(), FileType::Regular, data.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let files: Vec<&Vec<u8>> = self
            .entries
            .iter()
            .filter(|(_, kind, _)| *kind == FileType::Regular)
            .map(|(_, _, data)| data)
            .collect();

        let inode_count = files.len();
        let data_count: usize = files.iter().map(|d| d.len().div_ceil(BLOCK_SIZE)).sum();
        let mut img = vec![0u8; (1 + inode_count + data_count) * BLOCK_SIZE];

        put(&mut img, 0, self.entries.len() as u32);
        put(&mut img, 4, inode_count as u32);
        put(&mut img, 8, data_count as u32);

        let mut inode = 0usize;
        let mut next_block = 0usize;
        for (index, (name, kind, data)) in self.entries.iter().enumerate() {
            let base = BOOT_HEADER + index * DENTRY_SIZE;
            let n = name.len().min(FILENAME_MAX);
            img[base..base + n].copy_from_slice(&name[..n]);
            put(&mut img, base + 32, *kind as u32);

            if *kind != FileType::Regular {
                continue;
            }
            put(&mut img, base + 36, inode as u32);

            let inode_base = (1 + inode) * BLOCK_SIZE;
            put(&mut img, inode_base, data.len() as u32);
            for (slot, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                put(&mut img, inode_base + 4 + slot * 4, next_block as u32);
                let start = (1 + inode_count + next_block) * BLOCK_SIZE;
                img[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            inode += 1;
        }
        img
    }
}

fn put(img: &mut [u8], offset: usize, value: u32) {
    img[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
