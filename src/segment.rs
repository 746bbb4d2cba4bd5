//! Wire-format definitions for data and acknowledgment segments.
//!
//! Every datagram exchanged between the peers is a segment: an 8-byte
//! checksum followed by a 4-byte number and an optional payload.  This module
//! is responsible for:
//! - Serialising data and acknowledgment segments.
//! - Validating a raw datagram against its checksum and splitting it back
//!   into number and payload.
//! - Packing and unpacking the file-name header carried by segment 0.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Checksum (upper, 0)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Checksum (CRC-32)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Sequence Number / Ack Number                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Payload (data only) ...                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum covers everything after the checksum field.  An ack is a
//! data segment with an empty payload, [`ACK_LEN`] = 12 bytes on the wire.
//!
//! Segment 0 carries the destination file name ahead of the first chunk:
//!
//! ```text
//! payload = name_len (i32) ++ name (name_len bytes) ++ file data
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use flate2::Crc;
use thiserror::Error;

/// Largest datagram either peer sends or expects.
pub const MAX_SEGMENT_SIZE: usize = 1000;

/// Width of the checksum field.
pub const CHECKSUM_LEN: usize = 8;

/// checksum(8) + number(4)
pub const HEADER_LEN: usize = CHECKSUM_LEN + 4;

/// Payload capacity of every data segment except segment 0.
pub const MAX_PAYLOAD: usize = MAX_SEGMENT_SIZE - HEADER_LEN;

/// Acknowledgments carry no payload.
pub const ACK_LEN: usize = HEADER_LEN;

/// Width of the file-name length prefix in segment 0.
pub const NAME_LEN_FIELD: usize = 4;

/// Ack number reserved for the end-of-transfer handshake.
pub const TEARDOWN_ACK: i32 = -2;

const OFF_NUMBER: usize = CHECKSUM_LEN;

/// Errors that can arise when building or parsing a segment.
///
/// Every decode error means the same thing to the protocol: the datagram is
/// treated as if it never arrived.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("segment too short: {len} bytes")]
    Truncated { len: usize },
    #[error("checksum verification failed")]
    ChecksumMismatch,
    #[error("ack must be exactly {ACK_LEN} bytes, got {len}")]
    BadAckLength { len: usize },
    #[error("malformed file header: {0}")]
    MalformedHeader(&'static str),
    #[error("file name of {len} bytes leaves no room in the first segment")]
    FileNameTooLong { len: usize },
}

/// A checksum-validated segment borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    number: i32,
    payload: &'a [u8],
}

impl<'a> Segment<'a> {
    /// Parse and validate a raw datagram.
    ///
    /// Returns [`Err`] if `buf` is shorter than [`HEADER_LEN`] or the stored
    /// checksum does not match the one recomputed over `buf[8..]`.
    pub fn decode(buf: &'a [u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Truncated { len: buf.len() });
        }
        if buf[..CHECKSUM_LEN] != checksum(&buf[OFF_NUMBER..]) {
            return Err(SegmentError::ChecksumMismatch);
        }

        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[OFF_NUMBER..HEADER_LEN]);
        Ok(Self {
            number: i32::from_be_bytes(raw),
            payload: &buf[HEADER_LEN..],
        })
    }

    /// Sequence number of a data segment, or ack number of an ack.
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// `true` for the empty segment that closes a transfer.
    ///
    /// Segment 0 always carries the name header, so it can never be the
    /// marker even when the file itself is empty.
    pub fn is_end_of_file(&self) -> bool {
        self.number > 0 && self.payload.is_empty()
    }
}

/// Serialise a data segment.
pub fn encode_data(seq: i32, payload: &[u8]) -> Bytes {
    debug_assert!(payload.len() <= MAX_PAYLOAD, "payload exceeds segment size");

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    // Checksum field is zero while the rest is written.
    buf.put_bytes(0, CHECKSUM_LEN);
    buf.put_i32(seq);
    buf.put_slice(payload);

    let csum = checksum(&buf[OFF_NUMBER..]);
    buf[..CHECKSUM_LEN].copy_from_slice(&csum);
    buf.freeze()
}

/// Serialise an acknowledgment.
pub fn encode_ack(ack: i32) -> Bytes {
    encode_data(ack, &[])
}

/// Parse an acknowledgment and return its ack number.
pub fn decode_ack(buf: &[u8]) -> Result<i32, SegmentError> {
    if buf.len() != ACK_LEN {
        return Err(SegmentError::BadAckLength { len: buf.len() });
    }
    Segment::decode(buf).map(|seg| seg.number())
}

/// Number of file-data bytes segment 0 can carry next to a name of
/// `name_len` bytes, or `None` if the name alone overflows the segment.
pub fn first_chunk_capacity(name_len: usize) -> Option<usize> {
    MAX_PAYLOAD.checked_sub(NAME_LEN_FIELD + name_len)
}

/// Build the payload of segment 0: `name_len ++ name ++ chunk`.
pub fn encode_first_payload(file_name: &str, chunk: &[u8]) -> Result<Vec<u8>, SegmentError> {
    let name = file_name.as_bytes();
    let room = first_chunk_capacity(name.len())
        .ok_or(SegmentError::FileNameTooLong { len: name.len() })?;
    debug_assert!(chunk.len() <= room);

    let mut payload = Vec::with_capacity(NAME_LEN_FIELD + name.len() + chunk.len());
    payload.extend_from_slice(&(name.len() as i32).to_be_bytes());
    payload.extend_from_slice(name);
    payload.extend_from_slice(chunk);
    Ok(payload)
}

/// The file-name header and first data chunk unpacked from segment 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader<'a> {
    pub file_name: &'a str,
    pub data: &'a [u8],
}

/// Split the payload of segment 0 into file name and first chunk.
pub fn parse_first_payload(payload: &[u8]) -> Result<FileHeader<'_>, SegmentError> {
    if payload.len() < NAME_LEN_FIELD {
        return Err(SegmentError::MalformedHeader("missing name length"));
    }
    let mut raw = [0u8; NAME_LEN_FIELD];
    raw.copy_from_slice(&payload[..NAME_LEN_FIELD]);
    let name_len = usize::try_from(i32::from_be_bytes(raw))
        .map_err(|_| SegmentError::MalformedHeader("negative name length"))?;

    let name_end = NAME_LEN_FIELD + name_len;
    if name_end > payload.len() {
        return Err(SegmentError::MalformedHeader("name runs past the payload"));
    }
    let file_name = std::str::from_utf8(&payload[NAME_LEN_FIELD..name_end])
        .map_err(|_| SegmentError::MalformedHeader("name is not UTF-8"))?;

    Ok(FileHeader {
        file_name,
        data: &payload[name_end..],
    })
}

/// CRC-32 (IEEE) of `data`, widened to the 8-byte big-endian wire field.
fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut crc = Crc::new();
    crc.update(data);
    u64::from(crc.sum()).to_be_bytes()
}
