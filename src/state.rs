//! Finite-state-machine types for both ends of a transfer.
//!
//! Transitions are not implemented here; they live in
//! [`crate::gbn_sender`] and [`crate::gbn_receiver`].  Completion is always a
//! terminal state of one of these enums, never a free-standing flag.

/// Phase of the sender's window.
///
/// ```text
///            first send into empty window
///   IDLE ───────────────────────────────▶ ARMED
///    ▲                                      │
///    │  window drained / duplicate ack      │ timeout: restart timer
///    └──────────────────────────────────────┤
///                                           │ teardown ack
///                 COMPLETE ◀────────────────┘
///
///   ARMED ── too many timeouts without progress ──▶ FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// No retransmission timer running.
    #[default]
    Idle,
    /// Retransmission timer running.
    Armed,
    /// Teardown ack observed; both workers stop.
    Complete,
    /// The peer stopped answering.
    Failed,
}

impl SenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Phase of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Waiting for segment 0 and its file-name header.
    #[default]
    AwaitingHeader,
    /// Output sink open; appending in-order segments.
    Receiving,
    /// End-of-file marker accepted.
    Complete,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
