//! Receiving side of a transfer.
//!
//! [`receive_file`] is a single sequential loop: read a datagram, let
//! [`GbnReceiver`] classify it, send the ACK it asks for, then write any
//! accepted bytes.  The output file is created when segment 0 arrives and
//! closed once the end-of-file marker has been accepted.  Segment 0 is only
//! acknowledged once its file name has been checked.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::ReceiverConfig;
use crate::error::TransferError;
use crate::gbn_receiver::{Chunk, GbnReceiver, Verdict};
use crate::segment::{encode_ack, MAX_SEGMENT_SIZE, TEARDOWN_ACK};
use crate::socket::Transport;

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Where the file was written.
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Segments accepted, end-of-file marker included.
    pub segments: u64,
    pub duplicate_acks: u64,
}

/// Receive one file from the peer behind `transport` into `output_dir`.
///
/// Returns after the teardown ACK has been sent
/// [`ReceiverConfig::teardown_repeats`] times.
pub async fn receive_file<T: Transport>(
    transport: &T,
    output_dir: &Path,
    config: &ReceiverConfig,
) -> Result<ReceiveReport, TransferError> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut engine = GbnReceiver::new();
    let mut sink: Option<(PathBuf, BufWriter<File>)> = None;
    let mut bytes_written = 0u64;
    let mut buf = [0u8; MAX_SEGMENT_SIZE];

    loop {
        let n = match config.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.recv(&mut buf))
                .await
                .map_err(|_| TransferError::IdleTimeout(limit))??,
            None => transport.recv(&mut buf).await?,
        };

        match engine.on_datagram(&buf[..n]) {
            Verdict::Reject { ack, reason } => {
                log::debug!("[gbn] ← dropped ({reason:?}); → DUP ACK ack={ack}");
                transport.send(&encode_ack(ack)).await?;
            }
            Verdict::Accept { ack, chunk } => {
                let data = match chunk {
                    Chunk::First { file_name, data } => {
                        let path = match output_path(output_dir, file_name) {
                            Ok(path) => path,
                            Err(e) => {
                                // Segment 0 is never acknowledged.
                                log::warn!("[gbn] ← bad file name; → DUP ACK ack={}", ack - 1);
                                transport.send(&encode_ack(ack - 1)).await?;
                                return Err(e);
                            }
                        };
                        log::info!("[gbn] receiving into {}", path.display());
                        log::debug!("[gbn] ← DATA seq={ack}; → ACK ack={ack}");
                        transport.send(&encode_ack(ack)).await?;
                        let file = File::create(&path).await?;
                        sink = Some((path, BufWriter::new(file)));
                        data
                    }
                    Chunk::Data(data) => {
                        log::debug!("[gbn] ← DATA seq={ack}; → ACK ack={ack}");
                        transport.send(&encode_ack(ack)).await?;
                        data
                    }
                };
                let (_, writer) = sink.as_mut().ok_or(TransferError::MissingHeader)?;
                writer.write_all(data).await?;
                bytes_written += data.len() as u64;
            }
            Verdict::EndOfFile { seq } => {
                log::debug!("[gbn] ← EOF seq={seq}");
                let (path, mut writer) = sink.take().ok_or(TransferError::MissingHeader)?;
                writer.flush().await?;
                writer.get_ref().sync_all().await?;
                drop(writer);

                // Nothing answers the teardown; repeat it so one copy survives.
                let teardown = encode_ack(TEARDOWN_ACK);
                for _ in 0..config.teardown_repeats {
                    transport.send(&teardown).await?;
                }
                log::debug!("[gbn] → TEARDOWN x{}", config.teardown_repeats);
                linger(transport, &mut engine, config.linger).await;

                return Ok(ReceiveReport {
                    path,
                    bytes_written,
                    segments: engine.accepted(),
                    duplicate_acks: engine.duplicate_acks(),
                });
            }
        }
    }
}

/// Answer whatever still arrives with teardown until `period` has passed
/// since the last datagram.  The file is already on disk, so a transport
/// error only ends the grace period.
async fn linger<T: Transport>(transport: &T, engine: &mut GbnReceiver, period: Duration) {
    if period.is_zero() {
        return;
    }
    let mut buf = [0u8; MAX_SEGMENT_SIZE];
    while let Ok(received) = tokio::time::timeout(period, transport.recv(&mut buf)).await {
        let n = match received {
            Ok(n) => n,
            Err(e) => {
                log::debug!("[gbn] linger ended: {e}");
                return;
            }
        };
        if let Verdict::Reject { ack, reason } = engine.on_datagram(&buf[..n]) {
            log::debug!("[gbn] ← late datagram ({reason:?}); → TEARDOWN");
            if let Err(e) = transport.send(&encode_ack(ack)).await {
                log::debug!("[gbn] linger ended: {e}");
                return;
            }
        }
    }
}

/// Resolve `file_name` inside `dir`, refusing anything but a plain name.
fn output_path(dir: &Path, file_name: &str) -> Result<PathBuf, TransferError> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !file_name.contains(['/', '\\']) => {
            Ok(dir.join(name))
        }
        _ => Err(TransferError::InvalidFileName(file_name.to_owned())),
    }
}
