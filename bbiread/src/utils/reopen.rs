use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

/// A helper trait that for things that implement `Read`, `Seek`, and `Send`
pub trait SeekableRead: Seek + Read + Send {}
impl<T> SeekableRead for T where T: Seek + Read + Send {}

/// Indicates something that can be *reopened*. Importantly, reopening should be independent
/// with respect to seeks and reads from the original object.
pub trait Reopen: Sized {
    fn reopen(&self) -> io::Result<Self>;
}

/// A file that remembers its path, so it can be opened again with an
/// independent cursor.
pub struct ReopenableFile {
    pub path: PathBuf,
    pub file: File,
}

impl Reopen for ReopenableFile {
    fn reopen(&self) -> io::Result<Self> {
        Ok(ReopenableFile {
            path: self.path.clone(),
            file: File::open(&self.path)?,
        })
    }
}

impl Seek for ReopenableFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Read for ReopenableFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// In-memory bytes shared between handles. Each reopened cursor starts at
/// the beginning.
impl Reopen for Cursor<Arc<[u8]>> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(Cursor::new(self.get_ref().clone()))
    }
}
