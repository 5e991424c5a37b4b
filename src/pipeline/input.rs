//! Re-openable conversion inputs.
//!
//! Every attempt must read its input from the first byte: a stream that a
//! failed attempt already half-consumed is useless to the next one. An
//! [`InputSource`] is therefore a *recipe* for a stream, and the retry loop
//! calls [`InputSource::open`] once per attempt.
//!
//! [`InputTap`] wraps the opened stream while the collaborator consumes it
//! and remembers the first read fault, so a broken local file is reported as
//! a local I/O error rather than blamed on the conversion service.

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something that can hand out a fresh reader positioned at the start.
pub trait InputSource: Send + Sync {
    /// Identity used in logs and error messages.
    fn name(&self) -> String;

    /// Open a new reader from the first byte.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A file on the local file system.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for FileSource {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        let file = std::fs::File::open(&self.path)?;
        Ok(Box::new(io::BufReader::new(file)))
    }
}

/// Bytes already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl InputSource for MemorySource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// Pass-through reader that records the first read error.
pub struct InputTap<R> {
    inner: R,
    fault: Option<io::Error>,
}

impl<R: Read> InputTap<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, fault: None }
    }

    /// The first read error seen, if any.
    pub fn take_fault(&mut self) -> Option<io::Error> {
        self.fault.take()
    }
}

impl<R: Read> Read for InputTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                if self.fault.is_none() {
                    self.fault = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
            ok => ok,
        }
    }
}
