//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] owns the sliding window over segment sequence numbers, the
//! cache of already-built segments, and the decision of when the
//! retransmission timer must run.  It performs no I/O and never touches the
//! timer itself: every transition returns a [`TimerAction`] that the caller
//! (see [`crate::coordinator`]) applies under the same lock.
//!
//! # Protocol contract
//!
//! - Sequence numbers count segments, starting at 0.
//! - At most `window_size` segments may be outstanding:
//!   `base ≤ next_seq ≤ base + N`.
//! - ACKs are **cumulative**: `ack = K` means segments `0..=K` arrived in
//!   order, so `base` becomes `K + 1`.
//! - A timeout or a single duplicate ACK (`base − 1`) pulls `next_seq` back
//!   to `base`; the caller then resends the whole window from the cache.
//! - The end-of-file marker occupies the last slot and is resent in place:
//!   `next_seq` never moves past it.
//! - Sequence numbers do not wrap.
//!
//! This module only manages state; all socket and file I/O is the caller's
//! responsibility.

use bytes::Bytes;

use crate::segment::TEARDOWN_ACK;
use crate::state::SenderState;

// ---------------------------------------------------------------------------
// Transition outputs
// ---------------------------------------------------------------------------

/// What the retransmission timer must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TimerAction {
    /// Leave the timer as it is.
    Keep,
    /// Cancel any pending expiry and arm a fresh one.
    Start,
    /// Cancel any pending expiry.
    Cancel,
}

/// Next step for the outbound worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Transmit `segment`; `next_seq` has already moved past it.
    Send { seq: i32, segment: Bytes },
    /// Segment `seq` has never been built.  Build it, [`install`] it, and
    /// poll again.
    ///
    /// [`install`]: GbnSender::install
    Build { seq: i32 },
    /// Window full; try again after a pause.
    Wait,
    /// Teardown ACK observed.
    Finished,
    /// The peer stopped answering.
    Failed { timeouts: u32 },
}

/// How an inbound ACK was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    /// `ack == base − 1`: go back to `base` immediately.
    Duplicate,
    /// Cumulative ACK slid the window.
    Advanced { base: i32 },
    /// The receiver has the whole file.
    Teardown,
    /// Stale, or names a segment never sent; no effect.
    Ignored,
}

/// Counters accumulated over one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Datagrams handed to the transport, first sends and resends alike.
    pub transmissions: u64,
    pub timeouts: u64,
    pub duplicate_acks: u64,
    /// Valid ACKs of any kind.
    pub acks: u64,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one transfer.
///
/// # Sequence-number layout
///
/// ```text
///   base            next_seq          base + N        cache.len()
///    │                  │                 │                │
///  ──┼──────────────────┼─────────────────┼────────────────┼──▶ seq
///    │ <── in flight ──▶│ <── sendable ──▶│
///  [0, cache.len()) built segments, reused verbatim on resend
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Oldest unacknowledged sequence number (left window edge).
    base: i32,
    /// Next sequence number to transmit.
    next_seq: i32,
    window_size: i32,
    /// Every segment built so far, indexed by sequence number.
    cache: Vec<Bytes>,
    /// Sequence number of the end-of-file marker once it has been built.
    eof_seq: Option<i32>,
    state: SenderState,
    max_timeouts: Option<u32>,
    /// Timeouts since `base` last advanced.
    consecutive_timeouts: u32,
    stats: SenderStats,
}

impl GbnSender {
    /// Create a new [`GbnSender`] with window size N (≥ 1).
    ///
    /// # Panics
    ///
    /// If `window_size` is 0.  [`SenderConfig::validate`](crate::config::SenderConfig::validate)
    /// catches this before `send_file` gets here.
    pub fn new(window_size: u16) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size: i32::from(window_size),
            cache: Vec::new(),
            eof_seq: None,
            state: SenderState::Idle,
            max_timeouts: None,
            consecutive_timeouts: 0,
            stats: SenderStats::default(),
        }
    }

    /// Fail the transfer after `limit` consecutive timeouts without progress.
    pub fn with_max_timeouts(mut self, limit: Option<u32>) -> Self {
        self.max_timeouts = limit;
        self
    }

    pub fn base(&self) -> i32 {
        self.base
    }

    pub fn next_seq(&self) -> i32 {
        self.next_seq
    }

    pub fn window_size(&self) -> i32 {
        self.window_size
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Number of distinct segments built, end-of-file marker included.
    pub fn segments_built(&self) -> usize {
        self.cache.len()
    }

    /// Number of segments sent but not yet acknowledged.
    pub fn in_flight(&self) -> i32 {
        self.next_seq - self.base
    }

    /// Decide the outbound worker's next step.
    ///
    /// For [`Slot::Send`] the transition is already applied: the timer
    /// action is returned and `next_seq` has advanced (except for the
    /// end-of-file marker).
    pub fn poll_slot(&mut self) -> (Slot, TimerAction) {
        match self.state {
            SenderState::Complete => return (Slot::Finished, TimerAction::Keep),
            SenderState::Failed => {
                let timeouts = self.consecutive_timeouts;
                return (Slot::Failed { timeouts }, TimerAction::Keep);
            }
            SenderState::Idle | SenderState::Armed => {}
        }

        if self.next_seq >= self.base + self.window_size {
            return (Slot::Wait, TimerAction::Keep);
        }

        let seq = self.next_seq;
        let Some(segment) = self.cache.get(seq as usize).cloned() else {
            return (Slot::Build { seq }, TimerAction::Keep);
        };

        // First segment into an empty window starts the clock.  A timer
        // already running (e.g. over end-of-file resends) is left alone.
        let timer = if self.state == SenderState::Idle && self.base == self.next_seq {
            self.arm()
        } else {
            TimerAction::Keep
        };
        if self.eof_seq != Some(seq) {
            self.next_seq += 1;
        }
        self.stats.transmissions += 1;
        self.check_invariants();
        (Slot::Send { seq, segment }, timer)
    }

    /// Add a freshly built segment to the cache.
    ///
    /// `seq` must be the one named by the [`Slot::Build`] that requested it.
    pub fn install(&mut self, seq: i32, segment: Bytes, end_of_file: bool) {
        assert_eq!(
            seq as usize,
            self.cache.len(),
            "segments must be installed in sequence order"
        );
        self.cache.push(segment);
        if end_of_file {
            self.eof_seq = Some(seq);
        }
    }

    /// Retransmission timer expired: go back to `base`.
    pub fn on_timeout(&mut self) -> TimerAction {
        if self.state.is_terminal() {
            return TimerAction::Cancel;
        }
        self.stats.timeouts += 1;
        self.consecutive_timeouts += 1;
        self.next_seq = self.base;

        if let Some(limit) = self.max_timeouts {
            if self.consecutive_timeouts >= limit {
                self.state = SenderState::Failed;
                return TimerAction::Cancel;
            }
        }
        self.check_invariants();
        self.arm()
    }

    /// Process a checksum-valid ACK number.
    pub fn on_ack(&mut self, ack: i32) -> (AckEvent, TimerAction) {
        if self.state.is_terminal() {
            return (AckEvent::Ignored, TimerAction::Keep);
        }
        self.stats.acks += 1;

        // Duplicate of the last cumulative ACK: the receiver saw a gap or a
        // corrupt segment.  One is enough to go back.
        if ack == self.base - 1 {
            self.stats.duplicate_acks += 1;
            self.next_seq = self.base;
            self.state = SenderState::Idle;
            return (AckEvent::Duplicate, TimerAction::Cancel);
        }

        if ack == TEARDOWN_ACK {
            self.state = SenderState::Complete;
            return (AckEvent::Teardown, TimerAction::Cancel);
        }

        if ack < self.base || ack >= self.ackable_limit() {
            return (AckEvent::Ignored, TimerAction::Keep);
        }

        self.base = ack + 1;
        self.consecutive_timeouts = 0;
        // A timeout may have pulled next_seq behind segments the receiver
        // was still to acknowledge.
        if self.next_seq < self.base {
            self.next_seq = self.base;
        }

        let timer = if self.base == self.next_seq {
            self.state = SenderState::Idle;
            TimerAction::Cancel
        } else {
            self.arm()
        };
        self.check_invariants();
        (AckEvent::Advanced { base: self.base }, timer)
    }

    /// One past the highest sequence number a normal ACK may name: only
    /// segments actually built, and never the end-of-file marker, which is
    /// answered by teardown instead.
    fn ackable_limit(&self) -> i32 {
        self.eof_seq.unwrap_or(self.cache.len() as i32)
    }

    fn arm(&mut self) -> TimerAction {
        self.state = SenderState::Armed;
        TimerAction::Start
    }

    fn check_invariants(&self) {
        debug_assert!(self.base <= self.next_seq, "base passed next_seq");
        debug_assert!(
            self.next_seq <= self.base + self.window_size,
            "window overrun: base={} next_seq={} N={}",
            self.base,
            self.next_seq,
            self.window_size
        );
        debug_assert!(self.next_seq as usize <= self.cache.len());
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
