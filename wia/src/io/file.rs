use std::{
    cmp::min,
    fs::File,
    io,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::{Error, Result, ResultContext};

/// A file stream that opens its file lazily, so that clones don't share a file handle.
#[derive(Debug)]
pub struct FileStream {
    path: PathBuf,
    size: u64,
    file: Option<BufReader<File>>,
    pos: u64,
}

impl FileStream {
    pub fn new(path: &Path) -> Result<Self> {
        let metadata =
            path.metadata().context(format!("Failed to stat file {}", path.display()))?;
        if !metadata.is_file() {
            return Err(Error::Other(format!("{} is not a file", path.display())));
        }
        Ok(Self { path: path.to_path_buf(), size: metadata.len(), file: None, pos: 0 })
    }

    fn file(&mut self) -> io::Result<&mut BufReader<File>> {
        if self.file.is_none() {
            let mut file = BufReader::new(File::open(&self.path)?);
            file.seek(SeekFrom::Start(self.pos))?;
            self.file = Some(file);
        }
        // Opened above
        Ok(self.file.as_mut().unwrap())
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size {
            return Ok(0);
        }
        let to_read = min(buf.len() as u64, self.size - self.pos) as usize;
        let read = self.file()?.read(&mut buf[..to_read])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let pos = match pos {
            SeekFrom::Start(pos) => pos,
            SeekFrom::Current(offset) => self.pos.saturating_add_signed(offset),
            SeekFrom::End(offset) => self.size.saturating_add_signed(offset),
        };
        if pos != self.pos {
            if let Some(file) = &mut self.file {
                // Keeps the read buffer when seeking nearby
                file.seek_relative(pos as i64 - self.pos as i64)?;
            }
            self.pos = pos;
        }
        Ok(self.pos)
    }
}

impl Clone for FileStream {
    fn clone(&self) -> Self {
        Self { path: self.path.clone(), size: self.size, file: None, pos: 0 }
    }
}
