//! Receiver behaviour against a hand-driven peer.
//!
//! The test plays the legacy sender: it pushes raw segments into one end of
//! a simulated link and reads back every ACK the receiver emits.

use std::time::Duration;

use bytes::Bytes;
use gbn_transfer::segment::{decode_ack, encode_data, encode_first_payload, TEARDOWN_ACK};
use gbn_transfer::simulator::{link, SimLink, SimulatorConfig};
use gbn_transfer::socket::Transport;
use gbn_transfer::{receive_file, ReceiverConfig, TransferError};

/// Split `data` the way a sender naming the file `name` would.
fn segments(name: &str, data: &[u8]) -> Vec<Bytes> {
    let first_len = (988 - 4 - name.len()).min(data.len());
    let mut out = vec![encode_data(
        0,
        &encode_first_payload(name, &data[..first_len]).unwrap(),
    )];
    for chunk in data[first_len..].chunks(988) {
        out.push(encode_data(out.len() as i32, chunk));
    }
    out.push(encode_data(out.len() as i32, &[]));
    out
}

fn corrupted(segment: &Bytes) -> Vec<u8> {
    let mut raw = segment.to_vec();
    let last = raw.len() - 1;
    raw[last] ^= 0x80;
    raw
}

async fn next_ack(peer: &SimLink) -> i32 {
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), peer.recv(&mut buf))
        .await
        .expect("receiver went quiet")
        .unwrap();
    decode_ack(&buf[..n]).expect("receiver sent a malformed ack")
}

/// Send each datagram and collect the single ACK it provokes, then collect
/// `trailing` further ACKs.
async fn play(peer: &SimLink, datagrams: &[Vec<u8>], trailing: usize) -> Vec<i32> {
    let mut acks = Vec::new();
    for d in datagrams {
        peer.send(d).await.unwrap();
        acks.push(next_ack(peer).await);
    }
    for _ in 0..trailing {
        acks.push(next_ack(peer).await);
    }
    acks
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8).collect()
}

#[tokio::test]
async fn test_2500_bytes_three_segments_and_twenty_teardowns() {
    let data = sample(2500);
    let segs = segments("f.txt", &data);
    assert_eq!(segs.len(), 4);

    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let datagrams: Vec<Vec<u8>> = segs.iter().map(|s| s.to_vec()).collect();

    let cfg = ReceiverConfig::default();
    let (report, acks) = tokio::join!(
        receive_file(&rx, dir.path(), &cfg),
        play(&peer, &datagrams, 19),
    );
    let report = report.unwrap();

    let mut expected = vec![0, 1, 2];
    expected.extend(std::iter::repeat(TEARDOWN_ACK).take(20));
    assert_eq!(acks, expected);
    assert_eq!(report.segments, 4);
    assert_eq!(report.duplicate_acks, 0);
    assert_eq!(std::fs::read(dir.path().join("f.txt")).unwrap(), data);
}

#[tokio::test]
async fn test_corrupted_segment_answered_with_duplicate_acks() {
    let data = sample(2500);
    let segs = segments("f", &data);
    let datagrams = vec![
        segs[0].to_vec(),
        corrupted(&segs[1]),
        corrupted(&segs[1]),
        segs[1].to_vec(),
        segs[2].to_vec(),
        segs[3].to_vec(),
    ];

    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let config = ReceiverConfig {
        teardown_repeats: 1,
        ..ReceiverConfig::default()
    };

    let (report, acks) = tokio::join!(
        receive_file(&rx, dir.path(), &config),
        play(&peer, &datagrams, 0),
    );
    let report = report.unwrap();

    assert_eq!(acks, vec![0, 0, 0, 1, 2, TEARDOWN_ACK]);
    assert_eq!(report.duplicate_acks, 2);
    assert_eq!(std::fs::read(&report.path).unwrap(), data);
}

#[tokio::test]
async fn test_out_of_order_segments_are_not_buffered() {
    let data = sample(4000);
    let segs = segments("f", &data);
    let datagrams = vec![
        segs[2].to_vec(),
        segs[0].to_vec(),
        segs[2].to_vec(),
        segs[1].to_vec(),
        segs[1].to_vec(),
        segs[2].to_vec(),
        segs[3].to_vec(),
        segs[4].to_vec(),
        segs[5].to_vec(),
    ];

    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let config = ReceiverConfig {
        teardown_repeats: 1,
        ..ReceiverConfig::default()
    };

    let (report, acks) = tokio::join!(
        receive_file(&rx, dir.path(), &config),
        play(&peer, &datagrams, 0),
    );
    let report = report.unwrap();

    assert_eq!(acks, vec![-1, 0, 0, 1, 1, 2, 3, 4, TEARDOWN_ACK]);
    assert_eq!(std::fs::read(&report.path).unwrap(), data);
}

#[tokio::test]
async fn test_path_traversal_name_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let first = encode_data(0, &encode_first_payload("../escape", b"x").unwrap());

    let refuse = async {
        peer.send(&first).await.unwrap();
        next_ack(&peer).await
    };
    let cfg = ReceiverConfig::default();
    let (result, ack) = tokio::join!(
        receive_file(&rx, dir.path(), &cfg),
        refuse,
    );
    // Refused before acknowledging, so the sender never sees ack 0.
    assert_eq!(ack, -1);
    let err = result.unwrap_err();
    assert!(matches!(err, TransferError::InvalidFileName(ref n) if n == "../escape"));
    assert!(!dir.path().parent().unwrap().join("escape").exists());
}

#[tokio::test]
async fn test_linger_answers_resent_end_of_file_with_teardown() {
    let data = sample(1200);
    let segs = segments("f", &data);
    let eof = segs.last().unwrap().to_vec();
    let mut datagrams: Vec<Vec<u8>> = segs.iter().map(|s| s.to_vec()).collect();
    // Every teardown was lost, so the sender resends its marker twice.
    datagrams.push(eof.clone());
    datagrams.push(eof);

    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let config = ReceiverConfig {
        teardown_repeats: 1,
        linger: Duration::from_millis(200),
        ..ReceiverConfig::default()
    };

    let (report, acks) = tokio::join!(
        receive_file(&rx, dir.path(), &config),
        play(&peer, &datagrams, 0),
    );
    let report = report.unwrap();

    assert_eq!(acks, vec![0, 1, TEARDOWN_ACK, TEARDOWN_ACK, TEARDOWN_ACK]);
    assert_eq!(std::fs::read(&report.path).unwrap(), data);
}

#[tokio::test]
async fn test_no_linger_returns_right_after_teardown() {
    let segs = segments("f", b"abc");
    let dir = tempfile::tempdir().unwrap();
    let (peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let config = ReceiverConfig {
        teardown_repeats: 1,
        ..ReceiverConfig::default()
    };
    let datagrams: Vec<Vec<u8>> = segs.iter().map(|s| s.to_vec()).collect();

    let (report, acks) = tokio::join!(
        receive_file(&rx, dir.path(), &config),
        play(&peer, &datagrams, 0),
    );
    report.unwrap();
    assert_eq!(acks, vec![0, TEARDOWN_ACK]);

    // Nobody is left to answer a late marker.
    peer.send(&segs[1]).await.unwrap();
    let mut buf = [0u8; 64];
    let late = tokio::time::timeout(Duration::from_millis(100), peer.recv(&mut buf)).await;
    assert!(late.is_err(), "no receiver should answer after returning");
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_when_nobody_sends() {
    let dir = tempfile::tempdir().unwrap();
    let (_peer, rx) = link(SimulatorConfig::default(), SimulatorConfig::default());
    let config = ReceiverConfig {
        idle_timeout: Some(Duration::from_secs(2)),
        ..ReceiverConfig::default()
    };

    let err = receive_file(&rx, dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, TransferError::IdleTimeout(d) if d == Duration::from_secs(2)));
}
