//! Streaming double-SHA-256, the hash used for block and transaction ids.

use std::io;

use sha2::{Digest, Sha256};

/// An `io::Write` sink that computes SHA-256(SHA-256(w)) of the bytes
/// written to it. Serializing a type into the writer hashes its canonical
/// encoding without an intermediate buffer.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the Writer and produce the hash result.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hash.finalize();
        let second = Sha256::digest(&first);
        let mut result = [0u8; 32];
        result.copy_from_slice(&second);
        result
    }
}

/// Double-SHA-256 of an in-memory byte string.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(&first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}

/// The four-byte checksum used by Base58Check: the first four bytes of the
/// double-SHA-256 of the payload.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let full = hash(data);
    let mut result = [0u8; 4];
    result.copy_from_slice(&full[0..4]);
    result
}
