//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop, corrupt, and duplicate datagrams.  To exercise the
//! recovery paths without depending on actual network conditions, [`link`]
//! returns two connected [`SimLink`] endpoints that implement
//! [`Transport`] and apply a configurable fault model on every send:
//!
//! | Fault        | Description                                   |
//! |--------------|-----------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`. |
//! | Corruption   | Flip one random bit with `corrupt_rate`.      |
//! | Duplication  | Deliver a datagram twice.                     |
//!
//! Faults are drawn from a seeded RNG, so a failing run replays exactly as
//! long as the interleaving of sends is the same.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::socket::Transport;

/// Fault model for one direction of a link.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered datagram has one bit flipped.
    pub corrupt_rate: f64,
    /// Probability that a delivered datagram arrives twice.
    pub duplicate_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // Transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn lossy(loss_rate: f64, corrupt_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            corrupt_rate,
            seed,
            ..Self::default()
        }
    }
}

/// What happened to the datagrams sent through one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    corrupted: AtomicU64,
    duplicated: AtomicU64,
}

#[derive(Debug)]
struct FaultModel {
    config: SimulatorConfig,
    rng: StdRng,
}

impl FaultModel {
    /// Copies of `datagram` that make it onto the wire.
    fn apply(&mut self, datagram: &[u8], counters: &Counters) -> Vec<Vec<u8>> {
        counters.sent.fetch_add(1, Ordering::Relaxed);
        if self.rng.random_bool(self.config.loss_rate) {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }

        let mut copy = datagram.to_vec();
        if !copy.is_empty() && self.rng.random_bool(self.config.corrupt_rate) {
            let bit = self.rng.random_range(0..copy.len() * 8);
            copy[bit / 8] ^= 1 << (bit % 8);
            counters.corrupted.fetch_add(1, Ordering::Relaxed);
        }

        if self.rng.random_bool(self.config.duplicate_rate) {
            counters.duplicated.fetch_add(1, Ordering::Relaxed);
            vec![copy.clone(), copy]
        } else {
            vec![copy]
        }
    }
}

/// One endpoint of a simulated link.
#[derive(Debug)]
pub struct SimLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    faults: Mutex<FaultModel>,
    counters: Counters,
}

/// Build a connected pair of endpoints.  `a_to_b` applies to datagrams sent
/// by the first endpoint, `b_to_a` to those sent by the second.
pub fn link(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (SimLink, SimLink) {
    let (to_b, from_a) = mpsc::unbounded_channel();
    let (to_a, from_b) = mpsc::unbounded_channel();
    (
        SimLink::new(to_b, from_b, a_to_b),
        SimLink::new(to_a, from_a, b_to_a),
    )
}

impl SimLink {
    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        config: SimulatorConfig,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            faults: Mutex::new(FaultModel { config, rng }),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            corrupted: self.counters.corrupted.load(Ordering::Relaxed),
            duplicated: self.counters.duplicated.load(Ordering::Relaxed),
        }
    }
}

impl Transport for SimLink {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let copies = self
            .faults
            .lock()
            .unwrap()
            .apply(datagram, &self.counters);
        for copy in copies {
            // A vanished peer is just another lost datagram.
            let _ = self.tx.send(copy);
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "simulated peer is gone",
            )),
        }
    }
}
