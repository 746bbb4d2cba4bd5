//! Single-lock coordination of the sender's shared window.
//!
//! Three actors mutate the window concurrently: the outbound worker (polls
//! slots), the inbound worker (applies ACKs) and the retransmission timer
//! (expires).  [`SharedWindow`] serialises all of them behind one
//! `std::sync::Mutex` that guards the [`GbnSender`] *and* its
//! [`RetransmitTimer`], so a transition and the timer change it implies
//! happen atomically.
//!
//! The lock is never held across an `.await`; transmissions, file reads and
//! sleeps all happen after the guard is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::gbn_sender::{AckEvent, GbnSender, SenderStats, Slot, TimerAction};
use crate::state::SenderState;
use crate::timer::RetransmitTimer;

#[derive(Debug)]
struct Inner {
    window: GbnSender,
    timer: RetransmitTimer,
}

/// Point-in-time copy of the window for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub base: i32,
    pub next_seq: i32,
    pub state: SenderState,
    pub segments_built: usize,
    pub stats: SenderStats,
}

#[derive(Debug)]
pub struct SharedWindow {
    inner: Mutex<Inner>,
    timeout: Duration,
}

impl SharedWindow {
    pub fn new(window: GbnSender, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                window,
                timer: RetransmitTimer::new(),
            }),
            timeout,
        })
    }

    /// See [`GbnSender::poll_slot`].
    pub fn poll_slot(self: &Arc<Self>) -> Slot {
        let mut inner = self.inner.lock().unwrap();
        let (slot, action) = inner.window.poll_slot();
        self.apply(&mut inner, action);
        slot
    }

    /// See [`GbnSender::install`].
    pub fn install(&self, seq: i32, segment: Bytes, end_of_file: bool) {
        self.inner
            .lock()
            .unwrap()
            .window
            .install(seq, segment, end_of_file);
    }

    /// See [`GbnSender::on_ack`].
    pub fn on_ack(self: &Arc<Self>, ack: i32) -> AckEvent {
        let mut inner = self.inner.lock().unwrap();
        let (event, action) = inner.window.on_ack(ack);
        self.apply(&mut inner, action);
        event
    }

    /// Stop the timer for good.  Called once both workers have returned.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().timer.cancel();
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let inner = self.inner.lock().unwrap();
        WindowSnapshot {
            base: inner.window.base(),
            next_seq: inner.window.next_seq(),
            state: inner.window.state(),
            segments_built: inner.window.segments_built(),
            stats: inner.window.stats(),
        }
    }

    /// Timer callback.  Runs on the timer's own task.
    fn on_expiry(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.timer.fire(generation) {
            log::trace!("[window] stale timer generation {generation} ignored");
            return;
        }
        let action = inner.window.on_timeout();
        log::debug!(
            "[window] timeout; going back to base={} ({})",
            inner.window.base(),
            inner.window.state()
        );
        self.apply(&mut inner, action);
    }

    fn apply(self: &Arc<Self>, inner: &mut Inner, action: TimerAction) {
        match action {
            TimerAction::Keep => {}
            TimerAction::Cancel => inner.timer.cancel(),
            TimerAction::Start => {
                // Weak: a pending expiry must not keep a finished transfer alive.
                let window = Arc::downgrade(self);
                inner.timer.start(self.timeout, move |generation| {
                    if let Some(window) = window.upgrade() {
                        window.on_expiry(generation);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{encode_data, TEARDOWN_ACK};

    const RTO: Duration = Duration::from_millis(300);

    /// Send `count` segments through the shared window.
    fn send(window: &Arc<SharedWindow>, count: usize) {
        let mut sent = 0;
        while sent < count {
            match window.poll_slot() {
                Slot::Build { seq } => window.install(seq, encode_data(seq, b"d"), false),
                Slot::Send { .. } => sent += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_goes_back_to_base() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 7);
        assert_eq!(window.on_ack(2), AckEvent::Advanced { base: 3 });

        tokio::time::sleep(RTO + Duration::from_millis(10)).await;

        let snap = window.snapshot();
        assert_eq!((snap.base, snap.next_seq), (3, 3));
        assert_eq!(snap.stats.timeouts, 1);
        assert_eq!(snap.state, SenderState::Armed, "timer restarted");

        // And it keeps firing while nothing is acknowledged.
        tokio::time::sleep(RTO).await;
        assert_eq!(window.snapshot().stats.timeouts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_window_stops_timer() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 3);
        window.on_ack(2);

        tokio::time::sleep(RTO * 5).await;
        let snap = window.snapshot();
        assert_eq!(snap.state, SenderState::Idle);
        assert_eq!(snap.stats.timeouts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_restarts_timer() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 5);

        tokio::time::sleep(RTO * 2 / 3).await;
        window.on_ack(1);
        tokio::time::sleep(RTO * 2 / 3).await;
        assert_eq!(window.snapshot().stats.timeouts, 0, "restarted by ack");

        tokio::time::sleep(RTO).await;
        assert_eq!(window.snapshot().stats.timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_ack_cancels_timer() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 4);
        assert_eq!(window.on_ack(-1), AckEvent::Duplicate);

        tokio::time::sleep(RTO * 3).await;
        let snap = window.snapshot();
        assert_eq!(snap.next_seq, 0);
        assert_eq!(snap.stats.timeouts, 0);
    }

    #[tokio::test]
    async fn stale_expiry_is_ignored() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 4);

        let generation = window
            .inner
            .lock()
            .unwrap()
            .timer
            .pending_generation()
            .expect("timer armed by first send");
        // An expiry that raced with this cancel must not act.
        window.on_ack(-1);
        window.on_expiry(generation);

        let snap = window.snapshot();
        assert_eq!(snap.stats.timeouts, 0);
        assert_eq!(snap.state, SenderState::Idle);
    }

    #[tokio::test]
    async fn teardown_stops_everything() {
        let window = SharedWindow::new(GbnSender::new(10), RTO);
        send(&window, 2);
        assert_eq!(window.on_ack(TEARDOWN_ACK), AckEvent::Teardown);
        assert_eq!(window.poll_slot(), Slot::Finished);
        assert!(!window.inner.lock().unwrap().timer.is_armed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_actors_respect_window_bound() {
        let window = SharedWindow::new(GbnSender::new(10), Duration::from_millis(2));

        let sender = {
            let window = Arc::clone(&window);
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    match window.poll_slot() {
                        Slot::Build { seq } => {
                            window.install(seq, encode_data(seq, b"d"), false)
                        }
                        Slot::Finished => break,
                        _ => {}
                    }
                    let snap = window.snapshot();
                    assert!(snap.base <= snap.next_seq);
                    assert!(snap.next_seq - snap.base <= 10);
                    tokio::task::yield_now().await;
                }
            })
        };

        let acker = {
            let window = Arc::clone(&window);
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let snap = window.snapshot();
                    // Acknowledge roughly half of what is in flight.
                    let ack = snap.base + (snap.next_seq - snap.base) / 2 - 1;
                    window.on_ack(ack);
                    tokio::task::yield_now().await;
                }
            })
        };

        sender.await.unwrap();
        acker.await.unwrap();

        let snap = window.snapshot();
        assert!(snap.next_seq - snap.base <= 10);
        window.shutdown();
    }
}
