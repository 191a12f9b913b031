//! Reading whole streams through transports that misbehave on large reads.

use std::io::{self, ErrorKind, Read};

use tracing::trace;

/// Largest single read acme survives; bigger requests can crash it.
pub const DEFAULT_CHUNK_SIZE: usize = 8000;

/// Read `reader` to the end without ever asking for more than `chunk_size` bytes at once.
///
/// A read returning `Ok(0)` marks the end of the stream. Short reads are normal and simply
/// lead to another request.
pub fn read_to_end_chunked<R: Read + ?Sized>(
    reader: &mut R,
    chunk_size: usize,
) -> io::Result<Vec<u8>> {
    if chunk_size == 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "chunk size must be greater than zero",
        ));
    }

    let mut out = Vec::new();
    let mut buf = vec![0; chunk_size];
    let mut chunks = 0usize;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                chunks += 1;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    trace!(chunks, bytes = out.len(), "read stream in chunks");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per call and records every requested size.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        requested: Vec<usize>,
        interrupt_once: bool,
    }

    impl Trickle {
        fn new(data: &[u8], step: usize) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
                step,
                requested: Vec::new(),
                interrupt_once: false,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.requested.push(buf.len());
            if self.interrupt_once {
                self.interrupt_once = false;
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn reassembles_short_reads() {
        let original: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = Trickle::new(&original, 7);

        let body = read_to_end_chunked(&mut reader, DEFAULT_CHUNK_SIZE).unwrap();

        assert_eq!(body, original);
        assert!(reader.requested.len() > 2000);
        assert!(reader.requested.iter().all(|&n| n <= DEFAULT_CHUNK_SIZE));
    }

    #[test]
    fn empty_stream_is_not_an_error() {
        let mut reader = Trickle::new(b"", 16);
        assert!(read_to_end_chunked(&mut reader, 4).unwrap().is_empty());
        assert_eq!(reader.requested, vec![4]);
    }

    #[test]
    fn retries_interrupted_reads() {
        let mut reader = Trickle::new("héllo\n".as_bytes(), 3);
        reader.interrupt_once = true;
        let body = read_to_end_chunked(&mut reader, 2).unwrap();
        assert_eq!(body, "héllo\n".as_bytes());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut reader = Trickle::new(b"abc", 1);
        let err = read_to_end_chunked(&mut reader, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
