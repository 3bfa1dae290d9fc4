use chrono::{DateTime, Duration, TimeZone, Utc};
use ethernity_core::{Address, Direction, Error, Transaction, TxHash};
use ethernity_flowtrack::{FlowEdge, LargeTransferDetector, SplitPatternDetector};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn edge(hash: &str, from: &str, to: &str, amount: f64, minutes_ago: i64) -> FlowEdge {
    FlowEdge {
        transaction_hash: TxHash::from(hash),
        source: Address::from(from),
        target: Address::from(to),
        amount,
        currency: "USDT".into(),
        timestamp: now() - Duration::minutes(minutes_ago),
    }
}

fn detector() -> SplitPatternDetector {
    SplitPatternDetector::new(Duration::hours(24), 3, 500_000.0)
}

#[test]
fn fan_out_to_three_receivers_matches() {
    let edges = vec![
        edge("t1", "A", "B", 200_000.0, 30),
        edge("t2", "A", "C", 200_000.0, 20),
        edge("t3", "A", "D", 200_000.0, 10),
    ];

    let detection = detector()
        .detect(&Address::from("A"), &edges, now())
        .unwrap()
        .expect("dispersão esperada");

    assert_eq!(detection.unique_receiver_count, 3);
    assert_eq!(detection.total_amount, 600_000.0);
    assert_eq!(
        detection.receivers,
        vec![Address::from("B"), Address::from("C"), Address::from("D")]
    );
    assert_eq!(detection.window_end, now());
    assert_eq!(detection.window_start, now() - Duration::hours(24));
    let hashes: Vec<&str> = detection
        .contributing_transaction_hashes
        .iter()
        .map(|h| h.as_str())
        .collect();
    assert_eq!(hashes, vec!["t1", "t2", "t3"]);
}

#[test]
fn repeated_receiver_does_not_match() {
    let edges = vec![
        edge("t1", "A", "B", 200_000.0, 30),
        edge("t2", "A", "C", 200_000.0, 20),
        edge("t3", "A", "C", 200_000.0, 10),
    ];
    assert!(detector().detect(&Address::from("A"), &edges, now()).unwrap().is_none());
}

#[test]
fn total_below_minimum_does_not_match() {
    let edges = vec![
        edge("t1", "A", "B", 100_000.0, 30),
        edge("t2", "A", "C", 100_000.0, 20),
        edge("t3", "A", "D", 100_000.0, 10),
    ];
    assert!(detector().detect(&Address::from("A"), &edges, now()).unwrap().is_none());
}

#[test]
fn window_bounds_are_inclusive() {
    let edges = vec![
        edge("t1", "A", "B", 200_000.0, 24 * 60),
        edge("t2", "A", "C", 200_000.0, 0),
        edge("t3", "A", "D", 200_000.0, 60),
        edge("t4", "A", "E", 200_000.0, 24 * 60 + 1),
    ];
    let detection = detector()
        .detect(&Address::from("A"), &edges, now())
        .unwrap()
        .unwrap();
    assert_eq!(detection.unique_receiver_count, 3);
    assert!(!detection.receivers.contains(&Address::from("E")));
}

#[test]
fn future_edges_are_outside_window() {
    let edges = vec![
        edge("t1", "A", "B", 200_000.0, 30),
        edge("t2", "A", "C", 200_000.0, 20),
        edge("t3", "A", "D", 200_000.0, -5),
    ];
    assert!(detector().detect(&Address::from("A"), &edges, now()).unwrap().is_none());
}

#[test]
fn invalid_amounts_are_rejected_before_detection() {
    for bad in [0.0, -1.0, f64::NAN] {
        let edges = vec![
            edge("t1", "A", "B", 200_000.0, 30),
            edge("t2", "Z", "C", bad, 20),
        ];
        assert!(matches!(
            detector().detect(&Address::from("A"), &edges, now()),
            Err(Error::InvalidInput(_))
        ));
    }
}

#[test]
fn detection_is_deterministic() {
    let edges = vec![
        edge("t1", "A", "B", 200_000.0, 30),
        edge("t2", "A", "C", 250_000.0, 20),
        edge("t3", "A", "D", 300_000.0, 10),
        edge("t4", "X", "D", 300_000.0, 10),
    ];
    let detector = detector();
    let first = detector.detect(&Address::from("A"), &edges, now()).unwrap();
    let second = detector.detect(&Address::from("A"), &edges, now()).unwrap();
    assert_eq!(first, second);
    assert!(first.is_some());
}

#[test]
fn large_transfers_meet_threshold() {
    let make = |hash: &str, amount: f64| Transaction {
        hash: TxHash::from(hash),
        from: Address::from("A"),
        to: Address::from("B"),
        amount,
        currency: "BTC".into(),
        timestamp: now(),
        direction: Direction::Out,
        confirmations: 0,
        fee: None,
    };
    let txs = vec![make("small", 499_999.0), make("exact", 500_000.0), make("big", 750_000.0)];

    let detector = LargeTransferDetector::new(500_000.0);
    let large: Vec<&str> = detector.detect(&txs).into_iter().map(|tx| tx.hash.as_str()).collect();
    assert_eq!(large, vec!["exact", "big"]);
}
