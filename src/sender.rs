//! Sending side of a transfer.
//!
//! [`send_file`] runs two workers over one [`SharedWindow`] and joins them:
//!
//! ```text
//!            ┌──────────────┐  poll_slot / install  ┌──────────────┐
//!  source ──▶│  send_loop   │──────────────────────▶│              │
//!            └──────┬───────┘                       │ SharedWindow │◀── timer
//!                   │ DATA                          │              │
//!                   ▼                 on_ack        │              │
//!              Transport ───────▶ ack_loop ────────▶└──────────────┘
//! ```
//!
//! Segments are built lazily, the first time the window reaches them, and
//! cached; the source is read exactly once.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::config::SenderConfig;
use crate::coordinator::SharedWindow;
use crate::error::TransferError;
use crate::gbn_sender::{AckEvent, GbnSender, Slot};
use crate::segment::{
    decode_ack, encode_data, encode_first_payload, first_chunk_capacity, SegmentError,
    MAX_PAYLOAD, MAX_SEGMENT_SIZE,
};
use crate::socket::Transport;

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// File bytes read from the source and delivered.
    pub bytes_sent: u64,
    /// Segments built, end-of-file marker included.
    pub segments: usize,
    pub transmissions: u64,
    pub timeouts: u64,
    pub duplicate_acks: u64,
}

/// Send the file at `path` under the name `file_name`.
pub async fn send_path<T: Transport>(
    transport: &T,
    path: &Path,
    file_name: &str,
    config: &SenderConfig,
) -> Result<SendReport, TransferError> {
    let file = tokio::fs::File::open(path).await?;
    send_file(transport, BufReader::new(file), file_name, config).await
}

/// Transfer everything `source` yields to the peer behind `transport`, which
/// stores it as `file_name`.
///
/// Returns once the receiver has sent its teardown ACK.
pub async fn send_file<T, R>(
    transport: &T,
    source: R,
    file_name: &str,
    config: &SenderConfig,
) -> Result<SendReport, TransferError>
where
    T: Transport,
    R: AsyncRead + Unpin + Send,
{
    config.validate()?;
    let mut builder = SegmentBuilder::new(source, file_name)?;
    let window = SharedWindow::new(
        GbnSender::new(config.window_size).with_max_timeouts(config.max_timeouts),
        config.timeout,
    );

    log::info!(
        "[gbn] sending {file_name:?} (window={}, timeout={:?})",
        config.window_size,
        config.timeout
    );
    let result = tokio::try_join!(
        send_loop(transport, &window, &mut builder, config.tick),
        ack_loop(transport, &window),
    );
    window.shutdown();
    result?;

    let snap = window.snapshot();
    Ok(SendReport {
        bytes_sent: builder.bytes_read,
        segments: snap.segments_built,
        transmissions: snap.stats.transmissions,
        timeouts: snap.stats.timeouts,
        duplicate_acks: snap.stats.duplicate_acks,
    })
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Outbound worker: one window slot per tick until the transfer ends.
async fn send_loop<T, R>(
    transport: &T,
    window: &Arc<SharedWindow>,
    builder: &mut SegmentBuilder<R>,
    tick: Duration,
) -> Result<(), TransferError>
where
    T: Transport,
    R: AsyncRead + Unpin,
{
    loop {
        match window.poll_slot() {
            Slot::Build { seq } => {
                let (segment, end_of_file) = builder.build(seq).await?;
                window.install(seq, segment, end_of_file);
                // Send it without waiting for the next tick.
                continue;
            }
            Slot::Send { seq, segment } => {
                log::debug!("[gbn] → DATA seq={seq} len={}", segment.len());
                transport.send(&segment).await?;
            }
            Slot::Wait => {}
            Slot::Finished => return Ok(()),
            Slot::Failed { timeouts } => {
                log::warn!("[gbn] giving up after {timeouts} timeouts");
                return Err(TransferError::PeerUnresponsive { timeouts });
            }
        }
        tokio::time::sleep(tick).await;
    }
}

/// Inbound worker: feed every valid ACK to the window until teardown.
async fn ack_loop<T: Transport>(
    transport: &T,
    window: &Arc<SharedWindow>,
) -> Result<(), TransferError> {
    let mut buf = [0u8; MAX_SEGMENT_SIZE];
    loop {
        let n = transport.recv(&mut buf).await?;
        let ack = match decode_ack(&buf[..n]) {
            Ok(ack) => ack,
            Err(e) => {
                log::debug!("[gbn] ← bad ACK dropped: {e}");
                continue;
            }
        };

        match window.on_ack(ack) {
            AckEvent::Advanced { base } => log::debug!("[gbn] ← ACK ack={ack} base={base}"),
            AckEvent::Duplicate => log::debug!("[gbn] ← DUP ACK ack={ack}; going back"),
            AckEvent::Ignored => log::trace!("[gbn] ← ACK ack={ack} ignored"),
            AckEvent::Teardown => {
                log::debug!("[gbn] ← TEARDOWN");
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SegmentBuilder
// ---------------------------------------------------------------------------

/// Turns the source into segments, one sequence number at a time.
struct SegmentBuilder<R> {
    source: R,
    file_name: String,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> SegmentBuilder<R> {
    fn new(source: R, file_name: &str) -> Result<Self, SegmentError> {
        if first_chunk_capacity(file_name.len()).is_none() {
            return Err(SegmentError::FileNameTooLong {
                len: file_name.len(),
            });
        }
        Ok(Self {
            source,
            file_name: file_name.to_owned(),
            bytes_read: 0,
        })
    }

    /// Build segment `seq`.  The flag is `true` for the end-of-file marker.
    async fn build(&mut self, seq: i32) -> Result<(Bytes, bool), TransferError> {
        if seq == 0 {
            let room = first_chunk_capacity(self.file_name.len()).unwrap_or(0);
            let chunk = self.read_chunk(room).await?;
            let payload = encode_first_payload(&self.file_name, &chunk)?;
            return Ok((encode_data(0, &payload), false));
        }

        let chunk = self.read_chunk(MAX_PAYLOAD).await?;
        if chunk.is_empty() {
            return Ok((encode_data(seq, &[]), true));
        }
        // The marker after this segment would need seq + 1.
        if seq == i32::MAX {
            return Err(TransferError::SequenceSpaceExhausted);
        }
        Ok((encode_data(seq, &chunk), false))
    }

    /// Read up to `limit` bytes; short only at end of input.
    async fn read_chunk(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; limit];
        let mut filled = 0;
        while filled < limit {
            let n = self.source.read(&mut chunk[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        chunk.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{parse_first_payload, Segment};

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    /// Build segments until the end-of-file marker.
    async fn build_all(data: &[u8], name: &str) -> Vec<Bytes> {
        let mut builder = SegmentBuilder::new(data, name).unwrap();
        let mut out = Vec::new();
        for seq in 0.. {
            let (segment, eof) = builder.build(seq).await.unwrap();
            out.push(segment);
            if eof {
                break;
            }
        }
        assert_eq!(builder.bytes_read, data.len() as u64);
        out
    }

    #[tokio::test]
    async fn file_of_2500_bytes_needs_three_data_segments() {
        let data = sample(2500);
        let segments = build_all(&data, "out.txt").await;
        assert_eq!(segments.len(), 4);

        let first = Segment::decode(&segments[0]).unwrap();
        let header = parse_first_payload(first.payload()).unwrap();
        assert_eq!(header.file_name, "out.txt");
        assert_eq!(header.data.len(), 988 - 4 - 7);

        let second = Segment::decode(&segments[1]).unwrap();
        assert_eq!(second.payload().len(), MAX_PAYLOAD);

        let eof = Segment::decode(&segments[3]).unwrap();
        assert_eq!(eof.number(), 3);
        assert!(eof.is_end_of_file());

        let mut rebuilt = header.data.to_vec();
        for seg in &segments[1..] {
            rebuilt.extend_from_slice(Segment::decode(seg).unwrap().payload());
        }
        assert_eq!(rebuilt, data);
    }

    #[tokio::test]
    async fn empty_file_is_header_then_marker() {
        let segments = build_all(&[], "empty").await;
        assert_eq!(segments.len(), 2);
        let first = Segment::decode(&segments[0]).unwrap();
        assert!(!first.is_end_of_file());
        assert!(parse_first_payload(first.payload()).unwrap().data.is_empty());
        assert!(Segment::decode(&segments[1]).unwrap().is_end_of_file());
    }

    #[tokio::test]
    async fn exact_fit_still_gets_a_separate_marker() {
        let data = sample(988 - 4 - 1 + MAX_PAYLOAD);
        let segments = build_all(&data, "f").await;
        assert_eq!(segments.len(), 3);
        assert!(Segment::decode(&segments[2]).unwrap().is_end_of_file());
    }

    #[test]
    fn oversized_name_rejected_up_front() {
        let name = "n".repeat(985);
        let err = SegmentBuilder::new(&b""[..], &name).err();
        assert_eq!(err, Some(SegmentError::FileNameTooLong { len: 985 }));
    }

    #[tokio::test]
    async fn last_sequence_number_cannot_carry_data() {
        let data = sample(10);
        let mut builder = SegmentBuilder::new(&data[..], "f").unwrap();
        let err = builder.build(i32::MAX).await.unwrap_err();
        assert!(matches!(err, TransferError::SequenceSpaceExhausted));

        // The marker itself still fits.
        let mut builder = SegmentBuilder::new(&b""[..], "f").unwrap();
        let (_, eof) = builder.build(i32::MAX).await.unwrap();
        assert!(eof);
    }
}
