//! Random access byte sources over an mzML file.
//!
//! A [`ByteSource`] owns the file's storage and is cheap to clone. Each reader, the
//! importer or a lazy decode call, takes its own [`SourceView`] with an independent
//! cursor, so decoding many records from one file in parallel needs no locking.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const BUFFER_SIZE: usize = 64 * 1024;

/// The operations the importer and the codec need from a seekable byte stream.
pub trait ByteSourceRead: BufRead + Seek {
    /// The absolute offset of the next byte to be read
    fn position(&self) -> u64;

    /// The total number of bytes in the source
    fn total_length(&self) -> u64;

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.fill_buf()?.first() {
            Some(b) => *b,
            None => return Ok(None),
        };
        self.consume(1);
        Ok(Some(byte))
    }

    /// Read at most `max_len` bytes into `buf`, returning the number read
    fn read_into(&mut self, buf: &mut [u8], max_len: usize) -> io::Result<usize> {
        let n = buf.len().min(max_len);
        self.read(&mut buf[..n])
    }

    /// Compute the 1-based line number of `offset`, leaving the cursor where it was.
    fn line_at(&mut self, offset: u64) -> io::Result<usize> {
        count_lines(self, offset)
    }
}

fn count_lines<R: ByteSourceRead + ?Sized>(reader: &mut R, offset: u64) -> io::Result<usize> {
    let restore = reader.position();
    reader.seek_to(0)?;
    let mut line = 1;
    let mut remaining = offset;
    while remaining > 0 {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let n = buf
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        line += memchr::memchr_iter(b'\n', &buf[..n]).count();
        reader.consume(n);
        remaining -= n as u64;
    }
    reader.seek_to(restore)?;
    Ok(line)
}

#[derive(Debug, Clone)]
enum SharedBytes {
    Mapped(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            SharedBytes::Mapped(m) => m,
            SharedBytes::Owned(b) => b,
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    Shared(SharedBytes),
    File(Arc<PathBuf>),
}

/// How to back a [`ByteSource`] opened from a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceMode {
    /// Memory-map the file, falling back to buffered reads if mapping fails
    #[default]
    Auto,
    Mapped,
    /// Re-open the file for every view
    Buffered,
}

fn detect_bom(head: &[u8]) -> u64 {
    if head.starts_with(UTF8_BOM) {
        UTF8_BOM.len() as u64
    } else {
        0
    }
}

/// The storage behind an mzML document, shared by the importer and every lazy decode.
#[derive(Debug, Clone)]
pub struct ByteSource {
    storage: Storage,
    length: u64,
    bom_length: u64,
}

impl ByteSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open_with(path, SourceMode::Auto)
    }

    pub fn open_with<P: AsRef<Path>>(path: P, mode: SourceMode) -> io::Result<Self> {
        let path = path.as_ref();
        match mode {
            SourceMode::Mapped => Self::map(path),
            SourceMode::Buffered => Self::buffered(path),
            SourceMode::Auto => match Self::map(path) {
                Ok(source) => Ok(source),
                Err(e) => {
                    log::debug!(
                        "Falling back to buffered reads for {}: {e}",
                        path.display()
                    );
                    Self::buffered(path)
                }
            },
        }
    }

    fn map(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only. Truncation of the file by another
        // process while mapped is not guarded against.
        let mmap = unsafe { Mmap::map(&file)? };
        let bom_length = detect_bom(&mmap);
        Ok(Self {
            length: mmap.len() as u64,
            bom_length,
            storage: Storage::Shared(SharedBytes::Mapped(Arc::new(mmap))),
        })
    }

    fn buffered(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        let mut head = Vec::with_capacity(UTF8_BOM.len());
        file.take(UTF8_BOM.len() as u64).read_to_end(&mut head)?;
        Ok(Self {
            length,
            bom_length: detect_bom(&head),
            storage: Storage::File(Arc::new(path.to_path_buf())),
        })
    }

    /// Wrap an in-memory document
    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        let bytes: Arc<[u8]> = bytes.into().into();
        Self {
            length: bytes.len() as u64,
            bom_length: detect_bom(&bytes),
            storage: Storage::Shared(SharedBytes::Owned(bytes)),
        }
    }

    /// Open an independent cursor over the source, positioned at the start.
    pub fn view(&self) -> io::Result<SourceView> {
        let inner = match &self.storage {
            Storage::Shared(bytes) => ViewInner::Shared(io::Cursor::new(bytes.clone())),
            Storage::File(path) => ViewInner::File {
                reader: BufReader::with_capacity(BUFFER_SIZE, File::open(path.as_path())?),
                position: 0,
            },
        };
        Ok(SourceView {
            inner,
            length: self.length,
        })
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of byte-order-mark bytes preceding the XML content
    pub fn bom_length(&self) -> u64 {
        self.bom_length
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Shared(SharedBytes::Mapped(_)))
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(p) => Some(p.as_path()),
            Storage::Shared(_) => None,
        }
    }

    pub fn line_number(&self, offset: u64) -> io::Result<usize> {
        self.view()?.line_at(offset)
    }
}

#[derive(Debug)]
enum ViewInner {
    Shared(io::Cursor<SharedBytes>),
    File {
        reader: BufReader<File>,
        position: u64,
    },
}

/// A cursor over a [`ByteSource`]. Views never share position state.
#[derive(Debug)]
pub struct SourceView {
    inner: ViewInner,
    length: u64,
}

impl Read for SourceView {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ViewInner::Shared(cursor) => cursor.read(buf),
            ViewInner::File { reader, position } => {
                let n = reader.read(buf)?;
                *position += n as u64;
                Ok(n)
            }
        }
    }
}

impl BufRead for SourceView {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.inner {
            ViewInner::Shared(cursor) => cursor.fill_buf(),
            ViewInner::File { reader, .. } => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match &mut self.inner {
            ViewInner::Shared(cursor) => cursor.consume(amt),
            ViewInner::File { reader, position } => {
                reader.consume(amt);
                *position += amt as u64;
            }
        }
    }
}

impl Seek for SourceView {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            ViewInner::Shared(cursor) => cursor.seek(pos),
            ViewInner::File { reader, position } => {
                let p = reader.seek(pos)?;
                *position = p;
                Ok(p)
            }
        }
    }
}

impl ByteSourceRead for SourceView {
    fn position(&self) -> u64 {
        match &self.inner {
            ViewInner::Shared(cursor) => cursor.position(),
            ViewInner::File { position, .. } => *position,
        }
    }

    fn total_length(&self) -> u64 {
        self.length
    }

    fn line_at(&mut self, offset: u64) -> io::Result<usize> {
        if let ViewInner::Shared(cursor) = &self.inner {
            let bytes = cursor.get_ref().as_ref();
            let end = bytes
                .len()
                .min(usize::try_from(offset).unwrap_or(usize::MAX));
            return Ok(memchr::memchr_iter(b'\n', &bytes[..end]).count() + 1);
        }
        count_lines(self, offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CONTENT: &[u8] = b"<a>\n  <b>hello</b>\n</a>\n";

    fn write_temp(content: &[u8]) -> io::Result<(tempfile::TempDir, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("source.xml");
        let mut fh = File::create(&path)?;
        fh.write_all(content)?;
        Ok((dir, path))
    }

    fn exercise(source: &ByteSource) -> io::Result<()> {
        assert_eq!(source.len(), CONTENT.len() as u64);
        let mut view = source.view()?;
        assert_eq!(view.position(), 0);
        assert_eq!(view.read_byte()?, Some(b'<'));
        assert_eq!(view.position(), 1);

        view.seek_to(9)?;
        let mut buf = [0u8; 16];
        let n = view.read_into(&mut buf, 5)?;
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(view.position(), 14);

        let mut other = source.view()?;
        assert_eq!(other.position(), 0);
        assert_eq!(other.read_byte()?, Some(b'<'));
        assert_eq!(view.position(), 14);

        assert_eq!(view.line_at(0)?, 1);
        assert_eq!(view.line_at(9)?, 2);
        assert_eq!(view.line_at(CONTENT.len() as u64)?, 4);
        assert_eq!(view.position(), 14);

        view.seek_to(CONTENT.len() as u64)?;
        assert_eq!(view.read_byte()?, None);
        Ok(())
    }

    #[test]
    fn test_mapped() -> io::Result<()> {
        let (_dir, path) = write_temp(CONTENT)?;
        let source = ByteSource::open_with(&path, SourceMode::Mapped)?;
        assert!(source.is_mapped());
        exercise(&source)
    }

    #[test]
    fn test_buffered() -> io::Result<()> {
        let (_dir, path) = write_temp(CONTENT)?;
        let source = ByteSource::open_with(&path, SourceMode::Buffered)?;
        assert!(!source.is_mapped());
        assert_eq!(source.path(), Some(path.as_path()));
        exercise(&source)
    }

    #[test]
    fn test_in_memory() -> io::Result<()> {
        exercise(&ByteSource::from_bytes(CONTENT))
    }

    #[test]
    fn test_bom() -> io::Result<()> {
        let mut content = UTF8_BOM.to_vec();
        content.extend_from_slice(CONTENT);
        let (_dir, path) = write_temp(&content)?;
        assert_eq!(ByteSource::open_with(&path, SourceMode::Buffered)?.bom_length(), 3);
        assert_eq!(ByteSource::open(&path)?.bom_length(), 3);
        assert_eq!(ByteSource::from_bytes(CONTENT).bom_length(), 0);
        Ok(())
    }
}
