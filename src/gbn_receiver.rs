//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] decides what to do with each inbound datagram:
//!
//! - Only the **in-order** segment (seq == `next_expected`) is accepted and
//!   acknowledged with its own sequence number.
//! - Corrupt, out-of-order and duplicate segments are discarded without
//!   buffering and answered with a **duplicate ACK** for `last_accepted`.
//! - The in-order end-of-file marker completes the transfer; the caller
//!   answers it with the teardown ACK.
//!
//! This module only manages state; all socket and file I/O is the caller's
//! responsibility (see [`crate::receiver`]).

use crate::segment::{parse_first_payload, Segment, SegmentError, TEARDOWN_ACK};
use crate::state::ReceiverState;

/// The accepted payload of an in-order segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// Segment 0: names the output file and carries its first bytes.
    First { file_name: &'a str, data: &'a [u8] },
    Data(&'a [u8]),
}

/// Why a datagram was discarded.
#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    Corrupt(SegmentError),
    /// Valid, but not the segment we are waiting for.
    OutOfOrder { seq: i32 },
    /// Segment 0 passed its checksum but its name header does not parse.
    MalformedHeader(SegmentError),
    /// Arrived after the end-of-file marker.
    Finished,
}

/// What the caller must do with one datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict<'a> {
    /// Send ACK `ack`, then write `chunk`.
    Accept { ack: i32, chunk: Chunk<'a> },
    /// Send ACK `ack` and nothing else.
    Reject { ack: i32, reason: Rejection },
    /// End-of-file marker `seq` accepted: flush and send the teardown ACK.
    EndOfFile { seq: i32 },
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GbnReceiver {
    next_expected: i32,
    /// Sequence number of the last accepted segment; −1 before segment 0.
    last_accepted: i32,
    state: ReceiverState,
    duplicate_acks: u64,
    accepted: u64,
}

impl Default for GbnReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self {
            next_expected: 0,
            last_accepted: -1,
            state: ReceiverState::AwaitingHeader,
            duplicate_acks: 0,
            accepted: 0,
        }
    }

    pub fn next_expected(&self) -> i32 {
        self.next_expected
    }

    pub fn last_accepted(&self) -> i32 {
        self.last_accepted
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Duplicate ACKs issued so far.
    pub fn duplicate_acks(&self) -> u64 {
        self.duplicate_acks
    }

    /// Segments accepted so far, end-of-file marker included.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Classify one raw datagram and advance the state.
    pub fn on_datagram<'a>(&mut self, datagram: &'a [u8]) -> Verdict<'a> {
        if self.state == ReceiverState::Complete {
            return Verdict::Reject {
                ack: TEARDOWN_ACK,
                reason: Rejection::Finished,
            };
        }

        let segment = match Segment::decode(datagram) {
            Ok(segment) => segment,
            Err(e) => return self.reject(Rejection::Corrupt(e)),
        };
        let seq = segment.number();
        if seq != self.next_expected {
            return self.reject(Rejection::OutOfOrder { seq });
        }

        if segment.is_end_of_file() {
            self.advance(seq);
            self.state = ReceiverState::Complete;
            return Verdict::EndOfFile { seq };
        }

        let chunk = if seq == 0 {
            match parse_first_payload(segment.payload()) {
                Ok(header) => Chunk::First {
                    file_name: header.file_name,
                    data: header.data,
                },
                Err(e) => return self.reject(Rejection::MalformedHeader(e)),
            }
        } else {
            Chunk::Data(segment.payload())
        };

        self.advance(seq);
        self.state = ReceiverState::Receiving;
        Verdict::Accept { ack: seq, chunk }
    }

    fn advance(&mut self, seq: i32) {
        self.last_accepted = seq;
        self.next_expected = seq + 1;
        self.accepted += 1;
    }

    fn reject(&mut self, reason: Rejection) -> Verdict<'static> {
        self.duplicate_acks += 1;
        Verdict::Reject {
            ack: self.last_accepted,
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
