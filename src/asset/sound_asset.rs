//! Sound asset and its on-disk PCM cache (C4b). Resident assets are decoded
//! once and kept in memory; streaming assets keep only a decoder factory
//! and are read chunk-by-chunk by the emitter state machine (C7).

use crate::error::CacheCorruption;
use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

/// Prefix byte ahead of the bincode-encoded header, versioning the on-disk
/// layout itself (distinct from `CacheHeader::version`, which versions the
/// asset's format fingerprint).
pub const CACHE_FORMAT_VERSION: u8 = 1;

pub const USED_FLAG: u8 = 0b0000_0001;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub mtime: u64,
    pub version: u32,
    pub flags: u8,
    pub bytes_per_sample: u8,
    pub channels: u16,
    pub sample_count: u64,
    pub sample_rate: u32,
    pub format: u32,
    pub buffer_size: u64,
}

impl CacheHeader {
    pub fn is_used(&self) -> bool {
        self.flags & USED_FLAG != 0
    }

    pub fn set_used(&mut self, used: bool) {
        if used {
            self.flags |= USED_FLAG;
        } else {
            self.flags &= !USED_FLAG;
        }
    }

    /// Testable property: `sample_count * bytes_per_sample * channels ==
    /// buffer_size`, or `buffer_size == 0` for a header-only (not yet used)
    /// entry.
    pub fn is_consistent(&self) -> bool {
        self.buffer_size == 0
            || self.sample_count * self.bytes_per_sample as u64 * self.channels as u64 == self.buffer_size
    }

    fn matches_source(&self, mtime: u64, format_fingerprint: u32) -> bool {
        self.mtime == mtime && self.version as u8 == CACHE_FORMAT_VERSION && self.format == format_fingerprint
    }
}

/// Serializes `header` followed by `blob` into the on-disk cache entry
/// layout: `[format version: u8][bincode header][pcm blob]`.
pub fn encode_cache_entry(header: &CacheHeader, blob: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(blob.len() + 32);
    out.write_u8(CACHE_FORMAT_VERSION).expect("writing to a Vec never fails");
    bincode::serialize_into(&mut out, header).expect("CacheHeader always serializes");
    out.extend_from_slice(blob);
    out
}

/// Parses a cache entry written by [`encode_cache_entry`]. Any structural
/// problem is reported as [`CacheCorruption`] so the caller deletes the
/// entry and re-decodes from source.
pub fn decode_cache_entry(bytes: &[u8]) -> Result<(CacheHeader, Vec<u8>), CacheCorruption> {
    let mut cursor = Cursor::new(bytes);
    let tag = cursor.read_u8().map_err(|_| CacheCorruption::HeaderMismatch)?;
    if tag != CACHE_FORMAT_VERSION {
        return Err(CacheCorruption::HeaderMismatch);
    }
    let header: CacheHeader =
        bincode::deserialize_from(&mut cursor).map_err(|e| CacheCorruption::Deserialize(e.to_string()))?;
    if !header.is_consistent() {
        return Err(CacheCorruption::HeaderMismatch);
    }
    let blob_start = cursor.position() as usize;
    let blob = bytes[blob_start..].to_vec();
    if header.buffer_size != 0 && blob.len() as u64 != header.buffer_size {
        return Err(CacheCorruption::TruncatedBlob {
            expected: header.buffer_size,
            found: blob.len() as u64,
        });
    }
    Ok((header, blob))
}

/// Validates a parsed cache header against the live source file's metadata.
/// Any mismatch means the entry must be deleted and re-decoded.
pub fn validate_cache(header: &CacheHeader, mtime: u64, format_fingerprint: u32) -> Result<(), CacheCorruption> {
    if header.matches_source(mtime, format_fingerprint) {
        Ok(())
    } else {
        Err(CacheCorruption::HeaderMismatch)
    }
}

/// `channels > 1 OR total_bytes > threshold` (§6 `stream_buf_size_threshold`).
pub fn is_streaming(channels: u16, total_bytes: u64, threshold: u64) -> bool {
    channels > 1 || total_bytes > threshold
}

/// A source a decode buffer can be primed from; producing fresh [`Decoder`]
/// instances is an external collaborator's job (file I/O, codec libraries).
pub trait DecoderFactory: Send + Sync {
    fn open(&self) -> Box<dyn crate::asset::decode_buffer::Decoder>;
}

pub enum SoundBody {
    Resident(Vec<u8>),
    Streaming(Arc<dyn DecoderFactory>),
}

impl std::fmt::Debug for SoundBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundBody::Resident(blob) => write!(f, "Resident({} bytes)", blob.len()),
            SoundBody::Streaming(_) => write!(f, "Streaming(..)"),
        }
    }
}

#[derive(Debug)]
pub struct SoundAsset {
    pub filename: String,
    pub mtime: u64,
    pub format_fingerprint: u32,
    pub bytes_per_sample: u8,
    pub channels: u16,
    pub sample_count: u64,
    pub sample_rate: u32,
    pub used: bool,
    body: SoundBody,
}

impl SoundAsset {
    pub fn resident(
        filename: impl Into<String>,
        mtime: u64,
        format_fingerprint: u32,
        bytes_per_sample: u8,
        channels: u16,
        sample_rate: u32,
        pcm: Vec<u8>,
    ) -> Self {
        let sample_count = pcm.len() as u64 / (bytes_per_sample as u64 * channels as u64).max(1);
        Self {
            filename: filename.into(),
            mtime,
            format_fingerprint,
            bytes_per_sample,
            channels,
            sample_count,
            sample_rate,
            used: false,
            body: SoundBody::Resident(pcm),
        }
    }

    pub fn streaming(
        filename: impl Into<String>,
        mtime: u64,
        format_fingerprint: u32,
        bytes_per_sample: u8,
        channels: u16,
        sample_count: u64,
        sample_rate: u32,
        factory: Arc<dyn DecoderFactory>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mtime,
            format_fingerprint,
            bytes_per_sample,
            channels,
            sample_count,
            sample_rate,
            used: false,
            body: SoundBody::Streaming(factory),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.sample_count * self.bytes_per_sample as u64 * self.channels as u64
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, SoundBody::Streaming(_))
    }

    pub fn resident_pcm(&self) -> Option<&[u8]> {
        match &self.body {
            SoundBody::Resident(pcm) => Some(pcm),
            SoundBody::Streaming(_) => None,
        }
    }

    pub fn open_decoder(&self) -> Option<Box<dyn crate::asset::decode_buffer::Decoder>> {
        match &self.body {
            SoundBody::Streaming(factory) => Some(factory.open()),
            SoundBody::Resident(_) => None,
        }
    }

    pub fn mark_used(&mut self) {
        self.used = true;
    }

    pub fn to_cache_header(&self, include_blob: bool) -> CacheHeader {
        let mut header = CacheHeader {
            mtime: self.mtime,
            version: CACHE_FORMAT_VERSION as u32,
            flags: 0,
            bytes_per_sample: self.bytes_per_sample,
            channels: self.channels,
            sample_count: self.sample_count,
            sample_rate: self.sample_rate,
            format: self.format_fingerprint,
            buffer_size: if include_blob { self.total_bytes() } else { 0 },
        };
        header.set_used(self.used);
        header
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_header() -> CacheHeader {
        CacheHeader {
            mtime: 1_700_000_000,
            version: CACHE_FORMAT_VERSION as u32,
            flags: 0,
            bytes_per_sample: 2,
            channels: 1,
            sample_count: 88_200,
            sample_rate: 44_100,
            format: 0xABCD,
            buffer_size: 176_400,
        }
    }

    #[test]
    fn cache_round_trips_byte_for_byte() {
        let header = sample_header();
        let blob = vec![0xAAu8; 176_400];
        let encoded = encode_cache_entry(&header, &blob);
        let (decoded_header, decoded_blob) = decode_cache_entry(&encoded).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_blob, blob);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let header = sample_header();
        let encoded = encode_cache_entry(&header, &[0u8; 10]);
        assert!(matches!(decode_cache_entry(&encoded), Err(CacheCorruption::TruncatedBlob { .. })));
    }

    #[test]
    fn validate_cache_rejects_mtime_mismatch() {
        let header = sample_header();
        assert!(validate_cache(&header, header.mtime, header.format).is_ok());
        assert!(validate_cache(&header, header.mtime + 1, header.format).is_err());
    }

    #[test]
    fn streaming_flag_matches_channel_or_size_rule() {
        assert!(is_streaming(2, 100, 700_000));
        assert!(is_streaming(1, 800_000, 700_000));
        assert!(!is_streaming(1, 100, 700_000));
    }

    #[test]
    fn used_flag_is_zero_initially_and_settable() {
        let mut header = sample_header();
        assert!(!header.is_used());
        header.set_used(true);
        assert!(header.is_used());
    }
}
