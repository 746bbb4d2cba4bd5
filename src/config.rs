//! Tunable protocol parameters.
//!
//! The defaults reproduce the legacy peers exactly; the CLI overrides them
//! field by field.

use std::time::Duration;

use crate::error::TransferError;

/// GBN window size N.
pub const DEFAULT_WINDOW: u16 = 10;

/// Retransmission timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Pause between window-fill attempts of the outbound worker.
pub const DEFAULT_TICK: Duration = Duration::from_millis(5);

/// Consecutive timeouts without progress before the sender gives up.
pub const DEFAULT_MAX_TIMEOUTS: u32 = 50;

/// How many copies of the teardown ack the receiver sends.
pub const DEFAULT_TEARDOWN_REPEATS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Maximum number of unacknowledged segments in flight (≥ 1).
    pub window_size: u16,
    /// Retransmission timeout; fixed, no back-off.
    pub timeout: Duration,
    /// Sleep between iterations of the outbound worker.
    pub tick: Duration,
    /// `None` retries forever.
    pub max_timeouts: Option<u32>,
}

impl SenderConfig {
    /// Reject settings the window cannot run with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.window_size == 0 {
            return Err(TransferError::InvalidConfig("window size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW,
            timeout: DEFAULT_TIMEOUT,
            tick: DEFAULT_TICK,
            max_timeouts: Some(DEFAULT_MAX_TIMEOUTS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub teardown_repeats: usize,
    /// Give up when the channel stays silent this long.  `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// After teardown, keep answering resent end-of-file markers with
    /// teardown for this long.  Zero returns at once, like the legacy peer.
    pub linger: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            teardown_repeats: DEFAULT_TEARDOWN_REPEATS,
            idle_timeout: None,
            linger: Duration::ZERO,
        }
    }
}
