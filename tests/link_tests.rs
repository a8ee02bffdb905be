//! Integration tests for the full link.
//!
//! Each test spawns a [`Link`] on the test runtime: every sender and receiver
//! runs as its own tokio task, talking through the simulator.  Lossy runs use
//! a fixed seed so failures can be replayed.

use std::collections::BTreeMap;
use std::time::Duration;

use sliding_window::{Command, Delivery, Link, LinkConfig};

/// Collect exactly `n` deliveries, failing if they take longer than `limit`.
async fn collect(link: &mut Link, n: usize, limit: Duration) -> Vec<Delivery> {
    tokio::time::timeout(limit, async {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            out.push(link.recv().await.expect("delivery channel closed"));
        }
        out
    })
    .await
    .expect("timed out waiting for deliveries")
}

/// Assert nothing else arrives within `quiet`.
async fn assert_quiet(link: &mut Link, quiet: Duration) {
    if let Ok(extra) = tokio::time::timeout(quiet, link.recv()).await {
        panic!("unexpected extra delivery: {extra:?}");
    }
}

/// Group delivered texts by receiver, keeping each receiver's order.
fn by_receiver(deliveries: Vec<Delivery>) -> BTreeMap<u16, Vec<String>> {
    let mut out: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for d in deliveries {
        out.entry(d.receiver)
            .or_default()
            .push(String::from_utf8(d.message).unwrap());
    }
    out
}

fn messages(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("message number {i}")).collect()
}

// ---------------------------------------------------------------------------
// Lossless link
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossless_short_messages_in_order() {
    let mut link = Link::spawn(LinkConfig::default()).expect("spawn");
    let sent = messages(20);
    for m in &sent {
        link.submit(Command::new(0, 0, m.as_str())).expect("submit");
    }

    let got = collect(&mut link, sent.len(), Duration::from_secs(10)).await;
    let texts: Vec<String> = got
        .iter()
        .map(|d| String::from_utf8(d.message.clone()).unwrap())
        .collect();
    assert_eq!(texts, sent);
    assert!(got.iter().all(|d| d.receiver == 0));
    assert_quiet(&mut link, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_lossless_long_message_reassembled() {
    let mut link = Link::spawn(LinkConfig::default()).expect("spawn");
    let body: Vec<u8> = (0..1000u32).map(|i| b'a' + (i % 26) as u8).collect();
    link.submit(Command::new(0, 0, body.clone())).expect("submit");
    link.submit(Command::new(0, 0, "after")).expect("submit");

    let got = collect(&mut link, 2, Duration::from_secs(10)).await;
    assert_eq!(got[0].message, body);
    assert_eq!(got[1].message, b"after");
}

#[tokio::test]
async fn test_one_sender_many_receivers() {
    let cfg = LinkConfig {
        receivers: 3,
        ..LinkConfig::default()
    };
    let mut link = Link::spawn(cfg).expect("spawn");
    let plan: Vec<(u16, String)> = (0..9).map(|i| (i % 3, format!("to {} #{i}", i % 3))).collect();
    for (dst, text) in &plan {
        link.submit(Command::new(0, *dst, text.as_str())).expect("submit");
    }

    // Receivers publish independently; order only holds per receiver.
    let got = collect(&mut link, plan.len(), Duration::from_secs(10)).await;
    let got = by_receiver(got);
    for dst in 0..3u16 {
        let expected: Vec<String> = plan
            .iter()
            .filter(|(d, _)| *d == dst)
            .map(|(_, text)| text.clone())
            .collect();
        assert_eq!(got.get(&dst), Some(&expected), "receiver {dst}");
    }
    assert_quiet(&mut link, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_receiver_skipped_for_a_long_run_still_gets_its_next_message() {
    let cfg = LinkConfig {
        receivers: 2,
        ..LinkConfig::default()
    };
    let mut link = Link::spawn(cfg).expect("spawn");
    link.submit(Command::new(0, 1, "first for r1")).expect("submit");
    for m in messages(130) {
        link.submit(Command::new(0, 0, m)).expect("submit");
    }
    link.submit(Command::new(0, 1, "second for r1")).expect("submit");

    let got = by_receiver(collect(&mut link, 132, Duration::from_secs(20)).await);
    assert_eq!(
        got.get(&1),
        Some(&vec!["first for r1".to_string(), "second for r1".to_string()])
    );
    assert_eq!(got.get(&0), Some(&messages(130)));
    assert_quiet(&mut link, Duration::from_millis(300)).await;
}

// ---------------------------------------------------------------------------
// Lossy link
// ---------------------------------------------------------------------------

async fn lossy_run(drop_prob: f64, corrupt_prob: f64, corruption_bits: u32, seed: u64) {
    let cfg = LinkConfig {
        drop_prob,
        corrupt_prob,
        corruption_bits,
        retransmit_timeout: Duration::from_millis(20),
        seed: Some(seed),
        ..LinkConfig::default()
    };
    let mut link = Link::spawn(cfg).expect("spawn");

    let mut sent: Vec<Vec<u8>> = messages(8).into_iter().map(String::into_bytes).collect();
    sent.push(b"x".repeat(150));
    for m in &sent {
        link.submit(Command::new(0, 0, m.clone())).expect("submit");
    }

    let got = collect(&mut link, sent.len(), Duration::from_secs(60)).await;
    let bodies: Vec<Vec<u8>> = got.into_iter().map(|d| d.message).collect();
    assert_eq!(bodies, sent);
    assert_quiet(&mut link, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_drops_only() {
    lossy_run(0.3, 0.0, 1, 11).await;
}

#[tokio::test]
async fn test_corruption_only() {
    lossy_run(0.0, 0.3, 2, 23).await;
}

#[tokio::test]
async fn test_drops_and_corruption() {
    lossy_run(0.15, 0.15, 1, 37).await;
}

#[tokio::test]
async fn test_wide_sender_window_under_loss() {
    let cfg = LinkConfig {
        drop_prob: 0.1,
        sender_window: 16,
        retransmit_timeout: Duration::from_millis(20),
        seed: Some(5),
        ..LinkConfig::default()
    };
    let mut link = Link::spawn(cfg).expect("spawn");
    // More than 255 frames so sequence numbers wrap.
    let sent = messages(300);
    for m in &sent {
        link.submit(Command::new(0, 0, m.as_str())).expect("submit");
    }
    let got = collect(&mut link, sent.len(), Duration::from_secs(120)).await;
    let texts: Vec<String> = got
        .into_iter()
        .map(|d| String::from_utf8(d.message).unwrap())
        .collect();
    assert_eq!(texts, sent);
}
