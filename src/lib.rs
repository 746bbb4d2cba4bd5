//! `gbn-transfer`: single-file transfer over unreliable datagrams using
//! Go-Back-N ARQ, wire-compatible with the legacy Java `Sender`/`Receiver`.
//!
//! # Architecture
//!
//! ```text
//!   source file                                        output dir
//!       │                                                  ▲
//!  ┌────▼─────┐   DATA (seq, payload)   ┌──────────────────┴──┐
//!  │  sender  │────────────────────────▶│      receiver       │
//!  │          │◀────────────────────────│                     │
//!  └────┬─────┘   ACK / DUP ACK / -2    └──────────┬──────────┘
//!       │                                          │
//!  ┌────▼──────────────┐                 ┌─────────▼─────────┐
//!  │ coordinator       │                 │ gbn_receiver      │
//!  │  gbn_sender+timer │                 │ (pure engine)     │
//!  └───────────────────┘                 └───────────────────┘
//!       │                                          │
//!  ┌────▼──────────────────────────────────────────▼─────────┐
//!  │  socket::Transport  (UdpTransport | simulator::SimLink) │
//!  └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]      : wire format (checksum, numbers, file-name header)
//! - [`gbn_sender`]   : GBN outbound window state machine
//! - [`coordinator`]  : one lock over the window and its timer
//! - [`timer`]        : the retransmission timer
//! - [`sender`]       : outbound and ACK workers, segment building
//! - [`gbn_receiver`] : in-order acceptance and cumulative ACKs
//! - [`receiver`]     : receive loop and output file
//! - [`state`]        : finite-state-machine types
//! - [`config`]       : tunables and their defaults
//! - [`error`]        : error types
//! - [`socket`]       : datagram transport abstraction and UDP implementation
//! - [`simulator`]    : lossy in-memory transport for testing

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::TransferError;
pub use receiver::{receive_file, ReceiveReport};
pub use sender::{send_file, send_path, SendReport};
