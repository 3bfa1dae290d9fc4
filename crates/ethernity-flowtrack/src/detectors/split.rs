use chrono::{DateTime, Duration, Utc};
use ethernity_core::{types::validate_amount, Address, Result, SplitDetection};
use std::collections::{BTreeSet, HashSet};

use crate::graph::FlowEdge;

/// Detector de dispersão de fundos (structuring / fan-out).
///
/// Sinaliza quando um endereço envia, dentro de uma janela móvel, transferências
/// suficientes para receptores distintos suficientes somando um total mínimo.
/// Puro: mesma entrada e mesmo `now` produzem sempre a mesma saída.
#[derive(Debug, Clone)]
pub struct SplitPatternDetector {
    window: Duration,
    min_receivers: usize,
    min_total_amount: f64,
}

impl SplitPatternDetector {
    pub fn new(window: Duration, min_receivers: usize, min_total_amount: f64) -> Self {
        Self {
            window,
            min_receivers,
            min_total_amount,
        }
    }

    pub fn name(&self) -> &str {
        "SplitPatternDetector"
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Avalia as arestas de saída de `origin` dentro de `[now - window, now]`.
    ///
    /// Arestas com valor zero, negativo ou não finito invalidam a entrada inteira.
    pub fn detect<'a, I>(&self, origin: &Address, edges: I, now: DateTime<Utc>) -> Result<Option<SplitDetection>>
    where
        I: IntoIterator<Item = &'a FlowEdge>,
    {
        let edges: Vec<&FlowEdge> = edges.into_iter().collect();
        for edge in &edges {
            validate_amount(&edge.transaction_hash, edge.amount)?;
        }

        let window_start = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let in_window: Vec<&FlowEdge> = edges
            .into_iter()
            .filter(|e| &e.source == origin)
            .filter(|e| e.timestamp >= window_start && e.timestamp <= now)
            .collect();

        if in_window.len() < self.min_receivers {
            return Ok(None);
        }

        let mut seen = HashSet::new();
        let receivers: Vec<Address> = in_window
            .iter()
            .map(|e| &e.target)
            .filter(|t| seen.insert(*t))
            .cloned()
            .collect();

        if receivers.len() < self.min_receivers {
            return Ok(None);
        }

        let total_amount: f64 = in_window.iter().map(|e| e.amount).sum();
        if total_amount < self.min_total_amount {
            return Ok(None);
        }

        let contributing_transaction_hashes: BTreeSet<_> =
            in_window.iter().map(|e| e.transaction_hash.clone()).collect();

        Ok(Some(SplitDetection {
            originating_address: origin.clone(),
            window_start,
            window_end: now,
            contributing_transaction_hashes,
            total_amount,
            unique_receiver_count: receivers.len(),
            receivers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethernity_core::TxHash;

    fn edge(hash: &str, to: &str, amount: f64, minutes_ago: i64, now: DateTime<Utc>) -> FlowEdge {
        FlowEdge {
            transaction_hash: TxHash::from(hash),
            source: Address::from("A"),
            target: Address::from(to),
            amount,
            currency: "USDT".into(),
            timestamp: now - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn edges_outside_window_are_ignored() {
        let now = Utc::now();
        let detector = SplitPatternDetector::new(Duration::hours(1), 3, 100.0);
        let edges = vec![
            edge("t1", "B", 50.0, 10, now),
            edge("t2", "C", 50.0, 20, now),
            edge("t3", "D", 50.0, 120, now),
        ];
        assert!(detector.detect(&Address::from("A"), &edges, now).unwrap().is_none());
    }

    #[test]
    fn window_beyond_calendar_range_starts_at_minimum() {
        let now = Utc::now();
        let detector = SplitPatternDetector::new(Duration::days(365 * 1_000_000), 2, 10.0);
        let edges = vec![edge("t1", "B", 50.0, 5, now), edge("t2", "C", 50.0, 60 * 24 * 365, now)];

        let detection = detector.detect(&Address::from("A"), &edges, now).unwrap().unwrap();
        assert_eq!(detection.window_start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(detection.unique_receiver_count, 2);
    }

    #[test]
    fn edges_from_other_sources_are_ignored() {
        let now = Utc::now();
        let detector = SplitPatternDetector::new(Duration::hours(1), 2, 10.0);
        let mut foreign = edge("t2", "C", 50.0, 5, now);
        foreign.source = Address::from("Z");
        let edges = vec![edge("t1", "B", 50.0, 5, now), foreign];
        assert!(detector.detect(&Address::from("A"), &edges, now).unwrap().is_none());
    }
}
