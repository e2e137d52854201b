use crate::error::{DbError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Raw page I/O over one file: page `n` lives at byte offset `n * page_size`.
/// There is no file header; the page count is derived from the file length.
#[derive(Debug)]
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens an existing file, or creates an empty one if it is missing.
    pub fn open_or_create(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens an existing file; fails if it does not exist.
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()> {
        self.check_buffer(buf.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();
        if offset >= file_size {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {} lies past the end of the file", page_no),
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    /// Overwrites one page, extending the file if the page lies past its end.
    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> Result<()> {
        self.check_buffer(data.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();

        // sparse extension past the end
        if offset >= file_size {
            self.file.set_len(offset + self.page_size as u64)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;

        Ok(())
    }

    /// `ceil(file_len / page_size)`.
    pub fn num_pages(&self) -> Result<u32> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64) as u32)
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {} bytes, page size is {}", len, self.page_size),
            )));
        }
        Ok(())
    }

    fn page_offset(&self, page_no: u32) -> u64 {
        page_no as u64 * self.page_size as u64
    }
}
