//! OpenSubtitles content fingerprint
//!
//! The hash is the file size plus the sum of the first and last 64 KiB of
//! the file read as little-endian `i64` words, all modulo 2^64. It has to
//! match the server's own computation bit for bit.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::models::Fingerprint;

/// Size of the head and tail windows
pub const CHUNK_SIZE: u64 = 65536;

/// Smallest file that can be fingerprinted
pub const MIN_FILE_SIZE: u64 = CHUNK_SIZE * 2;

const WORD: usize = 8;

/// Fingerprint a readable, seekable source of `declared_size` bytes
pub fn fingerprint<R: Read + Seek>(reader: &mut R, declared_size: u64) -> Fingerprint {
    if declared_size < MIN_FILE_SIZE {
        return Fingerprint::TooSmall;
    }

    match checksum(reader, declared_size) {
        Ok(hash) => Fingerprint::Hash(hash),
        Err(e) => {
            debug!("Fingerprint failed: {}", e);
            Fingerprint::IoError
        }
    }
}

/// Open `path` and fingerprint it using its current size
pub fn fingerprint_path(path: &Path) -> Fingerprint {
    let opened = File::open(path).and_then(|f| f.metadata().map(|m| (f, m.len())));
    match opened {
        Ok((mut file, size)) => fingerprint(&mut file, size),
        Err(e) => {
            debug!("Could not open {} for hashing: {}", path.display(), e);
            Fingerprint::IoError
        }
    }
}

fn checksum<R: Read + Seek>(reader: &mut R, size: u64) -> io::Result<u64> {
    let mut hash = size;

    reader.seek(SeekFrom::Start(0))?;
    hash = add_block(reader, hash)?;

    reader.seek(SeekFrom::Start(size.saturating_sub(CHUNK_SIZE)))?;
    hash = add_block(reader, hash)?;

    Ok(hash)
}

fn add_block<R: Read>(reader: &mut R, mut hash: u64) -> io::Result<u64> {
    let mut block = vec![0u8; CHUNK_SIZE as usize];
    reader.read_exact(&mut block)?;

    for word in block.chunks_exact(WORD) {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(word);
        hash = hash.wrapping_add(i64::from_le_bytes(bytes) as u64);
    }

    Ok(hash)
}
