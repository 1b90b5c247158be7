//! Message body byte stream.
//!
//! A [`Stream`] is either an in-memory buffer (the default body of every
//! message) or a file opened with an fopen-style mode. Cloning never shares a
//! cursor: memory buffers are copied and files are re-opened from their path
//! at the same position.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::http::error::{HttpError, Result};

trait Io: Read + Write + Seek {}
impl<T: Read + Write + Seek> Io for T {}

#[derive(Debug)]
enum Backing {
    Memory(Cursor<Vec<u8>>),
    File { file: File, path: PathBuf },
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamMode {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
}

impl StreamMode {
    const READ_WRITE: StreamMode = StreamMode {
        read: true,
        write: true,
        append: false,
        truncate: false,
        create: false,
        create_new: false,
    };

    /// `r`, `w`, `a`, `x` or `c`, optionally followed by `+` and `b`/`t`.
    fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let base = chars.next();
        let rest = chars.as_str();
        if !rest.chars().all(|c| matches!(c, '+' | 'b' | 't')) {
            return Err(HttpError::invalid(format!("invalid stream mode `{mode}`")));
        }
        let plus = rest.contains('+');
        let none = StreamMode {
            read: false,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
        };

        match base {
            Some('r') => Ok(StreamMode { read: true, write: plus, ..none }),
            Some('w') => Ok(StreamMode { read: plus, write: true, truncate: true, create: true, ..none }),
            Some('a') => Ok(StreamMode { read: plus, write: true, append: true, create: true, ..none }),
            Some('x') => Ok(StreamMode { read: plus, write: true, create_new: true, ..none }),
            Some('c') => Ok(StreamMode { read: plus, write: true, create: true, ..none }),
            _ => Err(HttpError::invalid(format!("invalid stream mode `{mode}`"))),
        }
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create)
            .create_new(self.create_new);
        options
    }

    /// Same access as the original open, without creating or truncating.
    fn reopen_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append);
        options
    }
}

#[derive(Debug)]
pub struct Stream {
    backing: Backing,
    mode: StreamMode,
}

impl Stream {
    /// Empty readable and writable in-memory stream.
    pub fn temp() -> Self {
        Self::memory(Vec::new())
    }

    /// In-memory stream over `data`, positioned at the start.
    pub fn memory(data: impl Into<Vec<u8>>) -> Self {
        Self {
            backing: Backing::Memory(Cursor::new(data.into())),
            mode: StreamMode::READ_WRITE,
        }
    }

    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let mode = StreamMode::parse(mode)?;
        let path = path.as_ref();
        let file = mode.open_options().open(path)?;
        Ok(Self {
            backing: Backing::File {
                file,
                path: path.to_path_buf(),
            },
            mode,
        })
    }

    pub fn is_attached(&self) -> bool {
        !matches!(self.backing, Backing::Detached)
    }

    pub fn is_readable(&self) -> bool {
        self.is_attached() && self.mode.read
    }

    pub fn is_writable(&self) -> bool {
        self.is_attached() && self.mode.write
    }

    pub fn is_seekable(&self) -> bool {
        self.is_attached()
    }

    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        if !self.is_readable() {
            return Err(HttpError::runtime("could not read from stream"));
        }
        let mut buf = Vec::new();
        self.io()?.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.is_writable() {
            return Err(HttpError::runtime("could not write to stream"));
        }
        self.io()?.write_all(data)?;
        Ok(data.len())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if !self.is_seekable() {
            return Err(HttpError::runtime("could not seek in stream"));
        }
        Ok(self.io()?.seek(pos)?)
    }

    pub fn rewind(&mut self) -> Result<()> {
        if !self.is_seekable() {
            return Err(HttpError::runtime("could not rewind stream"));
        }
        self.seek(SeekFrom::Start(0)).map(drop)
    }

    /// Current position of the read/write pointer.
    pub fn tell(&self) -> Result<u64> {
        match &self.backing {
            Backing::Memory(cursor) => Ok(cursor.position()),
            Backing::File { file, .. } => {
                let mut file: &File = file;
                Ok(file.stream_position()?)
            }
            Backing::Detached => Err(HttpError::runtime(
                "could not get the position of the pointer in stream",
            )),
        }
    }

    pub fn eof(&self) -> bool {
        match (self.tell(), self.size()) {
            (Ok(position), Some(size)) => position >= size,
            _ => true,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.backing {
            Backing::Memory(cursor) => Some(cursor.get_ref().len() as u64),
            Backing::File { file, .. } => file.metadata().ok().map(|meta| meta.len()),
            Backing::Detached => None,
        }
    }

    /// Everything from the current position to the end.
    pub fn contents(&mut self) -> Result<Vec<u8>> {
        if !self.is_readable() {
            return Err(HttpError::runtime("could not get contents of stream"));
        }
        let mut buf = Vec::new();
        self.io()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Rewinds, then reads everything; the pointer is left at the end.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.rewind()?;
        self.contents()
    }

    /// The whole stream without moving the pointer.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        if !self.is_readable() {
            return Err(HttpError::runtime("could not get contents of stream"));
        }
        match &self.backing {
            Backing::Memory(cursor) => Ok(cursor.get_ref().clone()),
            Backing::File { file, .. } => {
                let mut file: &File = file;
                let position = file.stream_position()?;
                file.seek(SeekFrom::Start(0))?;
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                file.seek(SeekFrom::Start(position))?;
                Ok(buf)
            }
            Backing::Detached => Err(HttpError::runtime("stream is detached")),
        }
    }

    /// Releases the underlying resource; every later I/O call fails.
    pub fn close(&mut self) {
        self.backing = Backing::Detached;
    }

    fn io(&mut self) -> Result<&mut dyn Io> {
        match &mut self.backing {
            Backing::Memory(cursor) => Ok(cursor),
            Backing::File { file, .. } => Ok(file),
            Backing::Detached => Err(HttpError::runtime("stream is detached")),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::temp()
    }
}

impl Clone for Stream {
    fn clone(&self) -> Self {
        let backing = match &self.backing {
            Backing::Memory(cursor) => Backing::Memory(cursor.clone()),
            Backing::File { file, path } => match reopen(file, path, self.mode) {
                Ok(reopened) => Backing::File {
                    file: reopened,
                    path: path.clone(),
                },
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Could not re-open stream, clone is detached");
                    Backing::Detached
                }
            },
            Backing::Detached => Backing::Detached,
        };

        Self {
            backing,
            mode: self.mode,
        }
    }
}

fn reopen(file: &File, path: &Path, mode: StreamMode) -> io::Result<File> {
    let mut current: &File = file;
    let position = current.stream_position()?;
    let mut reopened = mode.reopen_options().open(path)?;
    reopened.seek(SeekFrom::Start(position))?;
    Ok(reopened)
}
