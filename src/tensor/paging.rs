use crate::error::{KernelError, Result};
use crate::tensor::element::{decode_into, encode_slice, Element};
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One open page file. The handle is acquired once and released on drop;
/// `load`/`flush` only seek, read and write through it.
pub struct PageFile {
    file: File,
    path: PathBuf,
}

impl PageFile {
    /// Create (or truncate) `path` for a new paging session.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        Ok(Self { file, path: path.as_ref().to_path_buf() })
    }

    /// Open an existing page file for reading and writing without truncating it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { file, path: path.as_ref().to_path_buf() })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn len_bytes(&self) -> Result<u64> { Ok(self.file.metadata()?.len()) }

    /// Grow or shrink the file to hold exactly `count` elements of `T`.
    pub fn set_len_elements<T: Element>(&mut self, count: usize) -> Result<()> {
        self.file.set_len((count * T::SIZE) as u64)?;
        Ok(())
    }

    /// Read `min(cache_capacity, total_count)` elements starting at element
    /// `element_offset` into the front of `dst`. Returns the element count read.
    pub fn load<T: Element>(
        &mut self,
        element_offset: u64,
        cache_capacity: usize,
        total_count: usize,
        dst: &mut [T],
    ) -> Result<usize> {
        let n = cache_capacity.min(total_count);
        if dst.len() < n {
            return Err(KernelError::BufferTooSmall { needed: n, got: dst.len() });
        }
        trace!("page load {}: offset={} count={}", self.path.display(), element_offset, n);
        self.file.seek(SeekFrom::Start(element_offset * T::SIZE as u64))?;
        let mut bytes = vec![0u8; n * T::SIZE];
        let mut off = 0usize;
        while off < bytes.len() {
            match self.file.read(&mut bytes[off..]) {
                Ok(0) => break,
                Ok(k) => off += k,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if off < bytes.len() {
            return Err(KernelError::ShortTransfer { op: "read", expected: bytes.len(), got: off });
        }
        decode_into(&bytes, &mut dst[..n]);
        Ok(n)
    }

    /// Write `min(cache_capacity, total_count)` elements from the front of
    /// `src` starting at element `element_offset`, then flush. Regions of the
    /// file outside the window are left untouched.
    pub fn flush<T: Element>(
        &mut self,
        element_offset: u64,
        cache_capacity: usize,
        total_count: usize,
        src: &[T],
    ) -> Result<usize> {
        let n = cache_capacity.min(total_count);
        if src.len() < n {
            return Err(KernelError::BufferTooSmall { needed: n, got: src.len() });
        }
        trace!("page flush {}: offset={} count={}", self.path.display(), element_offset, n);
        self.file.seek(SeekFrom::Start(element_offset * T::SIZE as u64))?;
        self.file.write_all(&encode_slice(&src[..n]))?;
        self.file.flush()?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_at_offset_keeps_other_regions() {
        std::fs::create_dir_all("target").unwrap();
        let mut pf = PageFile::create("target/paging_unit_regions.bin").unwrap();
        pf.flush(0, 8, 4, &[1i32, 2, 3, 4]).unwrap();
        pf.flush(2, 8, 2, &[30i32, 40]).unwrap();
        let mut back = [0i32; 4];
        assert_eq!(pf.load(0, 8, 4, &mut back).unwrap(), 4);
        assert_eq!(back, [1, 2, 30, 40]);
    }

    #[test]
    fn load_past_end_is_short_transfer() {
        std::fs::create_dir_all("target").unwrap();
        let mut pf = PageFile::create("target/paging_unit_short.bin").unwrap();
        pf.flush(0, 4, 2, &[7i8, 8]).unwrap();
        let mut back = [0i8; 4];
        let err = pf.load(0, 4, 4, &mut back).unwrap_err();
        assert!(matches!(err, KernelError::ShortTransfer { expected: 4, got: 2, .. }));
    }

    #[test]
    fn small_destination_is_rejected() {
        std::fs::create_dir_all("target").unwrap();
        let mut pf = PageFile::create("target/paging_unit_small.bin").unwrap();
        let mut dst = [0i8; 1];
        assert!(matches!(pf.load(0, 4, 4, &mut dst), Err(KernelError::BufferTooSmall { needed: 4, got: 1 })));
    }
}
