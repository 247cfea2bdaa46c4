use std::io::{self, Read};

use bytes::Bytes;

use crate::collaborator::ChunkStream;

/// Adapts a pulled chunk stream to `Read` so it can back a streaming
/// request body. A failed chunk surfaces as an I/O error.
pub struct ChunkReader {
    chunks: ChunkStream,
    current: Bytes,
    done: bool,
}

impl ChunkReader {
    pub fn new(chunks: ChunkStream) -> Self {
        Self { chunks, current: Bytes::new(), done: false }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.current.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.chunks.next() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(io::Error::new(io::ErrorKind::Other, e));
                }
                None => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.current.len());
        let head = self.current.split_to(n);
        buf[..n].copy_from_slice(&head);
        Ok(n)
    }
}
