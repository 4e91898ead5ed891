use std::io;

use md5::Context as MD5Context;
use md5::Digest;

/// A writable stream that keeps a running MD5 checksum and a count of all bytes
/// written through it.
///
/// The count is the offset of the next byte, which is how the writer learns where
/// each indexed element starts without needing `Seek`.
#[derive(Clone)]
pub(crate) struct MD5HashingStream<T: io::Write> {
    stream: T,
    context: MD5Context,
    bytes_written: u64,
}

impl<T: io::Write> MD5HashingStream<T> {
    pub fn new(stream: T) -> MD5HashingStream<T> {
        Self {
            stream,
            context: MD5Context::new(),
            bytes_written: 0,
        }
    }

    /// The digest of everything written so far. Writing may continue afterwards.
    pub fn compute(&self) -> Digest {
        self.context.clone().compute()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for MD5HashingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.consume(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::prelude::*;

    #[test]
    fn test_hash_and_count() -> io::Result<()> {
        let mut stream = MD5HashingStream::new(Vec::new());
        stream.write_all(b"foo")?;
        assert_eq!(stream.bytes_written(), 3);
        stream.write_all(b"bar")?;
        assert_eq!(stream.bytes_written(), 6);
        let digest = stream.compute();
        assert_eq!(digest, md5::compute(b"foobar"));
        assert_eq!(format!("{:x}", digest), "3858f62230ac3c915f300c664312c63f");
        assert_eq!(stream.into_inner(), b"foobar");
        Ok(())
    }
}
