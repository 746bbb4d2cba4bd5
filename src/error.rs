//! Errors surfaced to callers of [`crate::sender`] and [`crate::receiver`].
//!
//! Corruption, loss and reordering never show up here: the protocol absorbs
//! them.  What remains are resource failures and a peer that has gone away.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::segment::SegmentError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("refusing to write file named {0:?}")]
    InvalidFileName(String),
    #[error("peer stopped responding after {timeouts} consecutive timeouts")]
    PeerUnresponsive { timeouts: u32 },
    #[error("file too large: sequence numbers exhausted")]
    SequenceSpaceExhausted,
    #[error("no datagram received within {0:?}")]
    IdleTimeout(Duration),
    #[error("file data arrived before the file header")]
    MissingHeader,
}
