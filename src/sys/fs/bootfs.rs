//! BootFs — reader over an in-memory boot filesystem image

use super::{
    Dentry, FileType, FsError, BLOCK_SIZE, BOOT_HEADER, DENTRY_SIZE, FILENAME_MAX, INODE_BLOCKS,
    MAX_DENTRIES,
};

#[derive(Clone, Copy)]
pub struct BootFs<'a> {
    image:       &'a [u8],
    dir_count:   u32,
    inode_count: u32,
    data_count:  u32,
}

impl<'a> BootFs<'a> {
    /// Check the header against the image size. Nothing is copied.
    pub fn mount(image: &'a [u8]) -> Result<Self, FsError> {
        let dir_count = read_u32(image, 0)?;
        let inode_count = read_u32(image, 4)?;
        let data_count = read_u32(image, 8)?;

        let blocks = 1 + inode_count as usize + data_count as usize;
        if image.len() < blocks * BLOCK_SIZE {
            return Err(FsError::Truncated);
        }

        let fs = Self {
            image,
            dir_count: dir_count.min(MAX_DENTRIES as u32),
            inode_count,
            data_count,
        };
        klog!("bootfs: {} entries, {} inodes, {} data blocks", fs.dir_count, inode_count, data_count);
        Ok(fs)
    }

    pub fn dir_count(&self) -> u32 {
        self.dir_count
    }

    /// Entry `index` of the root directory
    pub fn dentry(&self, index: u32) -> Result<Dentry, FsError> {
        if index >= self.dir_count {
            return Err(FsError::BadIndex(index));
        }
        let base = BOOT_HEADER + index as usize * DENTRY_SIZE;
        let raw = self.image.get(base..base + FILENAME_MAX).ok_or(FsError::Truncated)?;
        let kind_raw = read_u32(self.image, base + 32)?;
        let kind = FileType::from_raw(kind_raw).ok_or(FsError::BadType(kind_raw))?;
        let inode = read_u32(self.image, base + 36)?;
        Ok(Dentry::new(raw, kind, inode))
    }

    /// Look a name up in the root directory. Names compare on all 32 bytes.
    pub fn resolve(&self, name: &[u8]) -> Result<Dentry, FsError> {
        if name.is_empty() {
            return Err(FsError::NotFound);
        }
        if name.len() > FILENAME_MAX {
            return Err(FsError::NameTooLong);
        }
        for index in 0..self.dir_count {
            let dentry = self.dentry(index)?;
            if dentry.name() == name {
                return Ok(dentry);
            }
        }
        Err(FsError::NotFound)
    }

    /// File length in bytes
    pub fn size(&self, inode: u32) -> Result<u32, FsError> {
        read_u32(self.image, self.inode_base(inode)?)
    }

    /// Copy file bytes starting at `offset` into `buf`.
    /// Returns the number of bytes copied, 0 at end of file.
    pub fn read(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let base = self.inode_base(inode)?;
        let length = read_u32(self.image, base)? as usize;
        let offset = offset as usize;
        if offset >= length {
            return Ok(0);
        }

        let want = buf.len().min(length - offset);
        let mut done = 0;
        while done < want {
            let pos = offset + done;
            let slot = pos / BLOCK_SIZE;
            if slot >= INODE_BLOCKS {
                return Err(FsError::Truncated);
            }
            let block = read_u32(self.image, base + 4 + slot * 4)?;
            let data = self.data_block(block)?;

            let within = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - within).min(want - done);
            buf[done..done + n].copy_from_slice(&data[within..within + n]);
            done += n;
        }
        Ok(done)
    }

    fn inode_base(&self, inode: u32) -> Result<usize, FsError> {
        if inode >= self.inode_count {
            return Err(FsError::BadInode(inode));
        }
        Ok((1 + inode as usize) * BLOCK_SIZE)
    }

    fn data_block(&self, block: u32) -> Result<&'a [u8], FsError> {
        if block >= self.data_count {
            return Err(FsError::BadBlock(block));
        }
        let start = (1 + self.inode_count as usize + block as usize) * BLOCK_SIZE;
        self.image.get(start..start + BLOCK_SIZE).ok_or(FsError::Truncated)
    }
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32, FsError> {
    let bytes = image.get(offset..offset + 4).ok_or(FsError::Truncated)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::fs::image::ImageBuilder;

    fn sample() -> std::vec::Vec<u8> {
        let big: std::vec::Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        ImageBuilder::new()
            .directory(".")
            .rtc("rtc")
            .file("frame0.txt", b"fish")
            .file("big", &big)
            .file("verylargetextwithverylongname.tx", b"32")
            .build()
    }

    #[test]
    fn resolves_by_exact_name() {
        let img = sample();
        let fs = BootFs::mount(&img).unwrap();
        assert_eq!(fs.dir_count(), 5);
        assert_eq!(fs.resolve(b"rtc").unwrap().kind, FileType::Rtc);
        assert_eq!(fs.resolve(b".").unwrap().kind, FileType::Directory);
        assert_eq!(fs.resolve(b"frame0").err(), Some(FsError::NotFound));
        assert_eq!(fs.resolve(b"").err(), Some(FsError::NotFound));

        let long = fs.resolve(b"verylargetextwithverylongname.tx").unwrap();
        assert_eq!(long.name().len(), 32);
        assert_eq!(
            fs.resolve(b"verylargetextwithverylongname.txt").err(),
            Some(FsError::NameTooLong)
        );
    }

    #[test]
    fn reads_across_blocks_and_stops_at_end() {
        let img = sample();
        let fs = BootFs::mount(&img).unwrap();
        let big = fs.resolve(b"big").unwrap();
        assert_eq!(fs.size(big.inode).unwrap(), 10_000);

        let mut buf = [0u8; 200];
        assert_eq!(fs.read(big.inode, 4000, &mut buf).unwrap(), 200);
        assert!(buf.iter().enumerate().all(|(i, &b)| b == ((4000 + i as u32) % 251) as u8));

        assert_eq!(fs.read(big.inode, 9950, &mut buf).unwrap(), 50);
        assert_eq!(fs.read(big.inode, 10_000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn rejects_bad_inode_and_short_image() {
        let img = sample();
        let fs = BootFs::mount(&img).unwrap();
        assert_eq!(fs.size(99).err(), Some(FsError::BadInode(99)));
        assert_eq!(fs.dentry(5).err(), Some(FsError::BadIndex(5)));
        assert_eq!(BootFs::mount(&img[..4096]).err(), Some(FsError::Truncated));
    }
}
