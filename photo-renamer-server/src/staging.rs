//! Scoped temp storage for uploaded photos.
//!
//! A [`StagedFile`] owns its temp file; dropping it deletes the file. Records
//! move through the pipeline by value so each upload is released exactly once.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use tempfile::NamedTempFile;

pub struct StagedFile {
    original_name: String,
    size: u64,
    file: NamedTempFile,
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("original_name", &self.original_name)
            .field("size", &self.size)
            .finish()
    }
}

impl StagedFile {
    /// Start an empty staged file in `dir` that chunks can be appended to.
    pub fn create(dir: &Path, original_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(".part")
            .tempfile_in(dir)?;
        Ok(Self {
            original_name: original_name.to_string(),
            size: 0,
            file,
        })
    }

    /// Stage a complete buffer in one go.
    pub fn from_bytes(dir: &Path, original_name: &str, bytes: &[u8]) -> io::Result<Self> {
        let mut staged = Self::create(dir, original_name)?;
        staged.append(bytes)?;
        Ok(staged)
    }

    pub fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.as_file_mut().write_all(chunk)?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        let mut f = self.file.reopen()?;
        f.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(self.size as usize);
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Last-modified time of the staged file, if the filesystem reports one.
    pub fn modified(&self) -> Option<SystemTime> {
        self.file.as_file().metadata().and_then(|m| m.modified()).ok()
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
