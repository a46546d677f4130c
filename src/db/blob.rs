// src/db/blob.rs

//! Coverage blob codec
//!
//! Coverage vectors are stored as a 4-byte big-endian length of their textual
//! representation followed by the zlib-compressed text. The text is each
//! entry in decimal followed by a single space (including after the last
//! entry). The same text feeds the coverage hash, which together with the
//! file path and content hash forms the identity of a `files` row.
//!
//! The format is shared with other readers of the database, so it must stay
//! bit-exact.

use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use std::io::{Read, Write};

/// Renders a coverage vector as its canonical text form.
fn coverage_text(coverage: &[i64]) -> String {
    let mut text = String::with_capacity(coverage.len() * 3);
    for hits in coverage {
        text.push_str(&hits.to_string());
        text.push(' ');
    }
    text
}

/// Encodes a coverage vector into the blob format.
pub fn encode(coverage: &[i64]) -> Result<Vec<u8>> {
    let text = coverage_text(coverage);

    let mut blob = Vec::with_capacity(4 + text.len() / 2);
    blob.extend_from_slice(&(text.len() as u32).to_be_bytes());

    let mut encoder = ZlibEncoder::new(blob, Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Decodes a blob back into the coverage vector.
pub fn decode(blob: &[u8]) -> Result<Vec<i64>> {
    if blob.len() < 4 {
        return Err(Error::input("coverage blob is truncated"));
    }

    let text_len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;

    let mut text = String::with_capacity(text_len);
    ZlibDecoder::new(&blob[4..]).read_to_string(&mut text)?;
    if text.len() != text_len {
        return Err(Error::input("coverage blob length mismatch"));
    }

    let mut coverage = Vec::new();
    for field in text.split_whitespace() {
        let hits = field
            .parse::<i64>()
            .map_err(|_| Error::input(format!("bad coverage entry: {field}")))?;
        coverage.push(hits);
    }
    Ok(coverage)
}

/// Hashes a coverage vector for deduplication.
///
/// MD5 of the same text the blob encoder compresses. Not a security
/// boundary.
pub fn hash_coverage(coverage: &[i64]) -> String {
    let mut hasher = Md5::new();
    hasher.update(coverage_text(coverage).as_bytes());
    hex::encode(hasher.finalize())
}

/// MD5 of raw bytes, rendered as lowercase hex.
///
/// Used for file contents; must match what the repository adapter computes
/// for blobs at a ref.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
