/*!
 * Ethernity FlowTrack - Watch
 *
 * Carteiras monitoradas: cada verificação registra as transações novas,
 * alerta transferências grandes e avalia a dispersão de saída na janela
 */

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use ethernity_core::{
    utils::format_address, Address, Alert, AlertKind, Error, Result, Transaction, TxHash,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::config::TrackerConfig;
use crate::events::TrackerEvent;
use crate::graph::FlowEdge;

/// Carteira monitorada
#[derive(Debug, Clone, Serialize)]
pub struct WatchedWallet {
    pub address: Address,
    pub name: String,
    pub currency: String,
    pub added_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Transações vistas, mais recentes primeiro
    pub transactions: Vec<Transaction>,
    #[serde(skip)]
    rejected: HashSet<TxHash>,
    #[serde(skip)]
    last_reported_split: Option<BTreeSet<TxHash>>,
}

impl WatchedWallet {
    fn knows(&self, hash: &TxHash) -> bool {
        self.rejected.contains(hash) || self.transactions.iter().any(|tx| &tx.hash == hash)
    }
}

/// Resultado de uma verificação, entregue depois de liberado o estado
#[derive(Debug, Default)]
pub(crate) struct WatchOutcome {
    pub(crate) events: Vec<TrackerEvent>,
    pub(crate) alerts: Vec<Alert>,
    /// Transações grandes a rastrear, com a carteira de origem
    pub(crate) auto_track: Vec<(TxHash, Address)>,
}

impl WatchOutcome {
    pub(crate) fn merge(&mut self, other: WatchOutcome) {
        self.events.extend(other.events);
        self.alerts.extend(other.alerts);
        self.auto_track.extend(other.auto_track);
    }
}

#[derive(Default)]
pub(crate) struct WalletWatch {
    wallets: DashMap<Address, WatchedWallet>,
}

impl WalletWatch {
    /// Adiciona ou atualiza uma carteira; `true` se ela ainda não era monitorada.
    /// O histórico de uma carteira já monitorada é preservado.
    pub(crate) fn add(
        &self,
        address: Address,
        name: Option<&str>,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if address.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("endereço de carteira vazio".to_string()));
        }

        let name = name
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format_address(&address));

        match self.wallets.entry(address.clone()) {
            Entry::Occupied(mut entry) => {
                let wallet = entry.get_mut();
                wallet.name = name;
                wallet.currency = currency.to_string();
                Ok(false)
            }
            Entry::Vacant(entry) => {
                tracing::info!(wallet = %address, currency, "carteira adicionada ao monitoramento");
                entry.insert(WatchedWallet {
                    address,
                    name,
                    currency: currency.to_string(),
                    added_at: now,
                    last_checked_at: None,
                    transactions: Vec::new(),
                    rejected: HashSet::new(),
                    last_reported_split: None,
                });
                Ok(true)
            }
        }
    }

    pub(crate) fn remove(&self, address: &Address) -> bool {
        self.wallets.remove(address).is_some()
    }

    pub(crate) fn get(&self, address: &Address) -> Option<WatchedWallet> {
        self.wallets.get(address).map(|w| w.value().clone())
    }

    /// Carteiras na ordem em que foram adicionadas
    pub(crate) fn list(&self) -> Vec<WatchedWallet> {
        let mut wallets: Vec<WatchedWallet> = self.wallets.iter().map(|w| w.value().clone()).collect();
        wallets.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.address.cmp(&b.address)));
        wallets
    }

    pub(crate) fn addresses(&self) -> Vec<Address> {
        self.list().into_iter().map(|w| w.address).collect()
    }

    /// Incorpora as transações recentes de uma carteira. Carteiras removidas
    /// durante a consulta são ignoradas.
    pub(crate) fn apply(
        &self,
        address: &Address,
        fetched: Vec<Transaction>,
        config: &TrackerConfig,
        now: DateTime<Utc>,
    ) -> WatchOutcome {
        let mut outcome = WatchOutcome::default();
        let Some(mut wallet) = self.wallets.get_mut(address) else {
            return outcome;
        };
        wallet.last_checked_at = Some(now);

        let mut fresh: Vec<Transaction> = Vec::new();
        for tx in fetched {
            if wallet.knows(&tx.hash) || fresh.iter().any(|f| f.hash == tx.hash) {
                continue;
            }
            if let Err(e) = tx.validate() {
                tracing::warn!(wallet = %address, tx_hash = %tx.hash, error = %e, "transação da carteira ignorada");
                outcome.events.push(TrackerEvent::Error {
                    tx_hash: Some(tx.hash.clone()),
                    address: Some(address.clone()),
                    message: e.to_string(),
                });
                wallet.rejected.insert(tx.hash);
                continue;
            }
            fresh.push(tx);
        }

        if fresh.is_empty() {
            return outcome;
        }

        for tx in &fresh {
            outcome.events.push(TrackerEvent::WalletTransaction {
                address: address.clone(),
                transaction: tx.clone(),
            });
        }

        for tx in config.large_transfer_detector().detect(&fresh) {
            tracing::info!(wallet = %address, tx_hash = %tx.hash, amount = tx.amount, "transferência grande em carteira monitorada");
            outcome.events.push(TrackerEvent::WalletLargeTransfer {
                address: address.clone(),
                transaction: tx.clone(),
            });
            outcome.alerts.push(
                Alert::new(tx.hash.clone(), AlertKind::LargeTransfer { transaction: tx.clone() }, now)
                    .for_wallet(address.clone()),
            );
            if config.auto_track_large_transactions {
                outcome.auto_track.push((tx.hash.clone(), address.clone()));
            }
        }

        wallet.transactions.extend(fresh);
        wallet.transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        wallet.transactions.truncate(config.wallet_history_limit);

        if config.track_split_transactions {
            evaluate_split(&mut wallet, config, now, &mut outcome);
        }

        outcome
    }
}

/// Dispersão das saídas da carteira dentro da janela; a mesma detecção não é repetida
fn evaluate_split(wallet: &mut WatchedWallet, config: &TrackerConfig, now: DateTime<Utc>, outcome: &mut WatchOutcome) {
    let edges: Vec<FlowEdge> = wallet
        .transactions
        .iter()
        .filter(|tx| tx.from == wallet.address)
        .map(FlowEdge::from_transaction)
        .collect();

    let detection = match config.split_detector().detect(&wallet.address, &edges, now) {
        Ok(Some(detection)) => detection,
        Ok(None) => return,
        Err(e) => {
            outcome.events.push(TrackerEvent::Error {
                tx_hash: None,
                address: Some(wallet.address.clone()),
                message: e.to_string(),
            });
            return;
        }
    };

    if wallet.last_reported_split.as_ref() == Some(&detection.contributing_transaction_hashes) {
        return;
    }
    wallet.last_reported_split = Some(detection.contributing_transaction_hashes.clone());

    // transação mais recente da dispersão
    let trigger = wallet
        .transactions
        .iter()
        .find(|tx| detection.contributing_transaction_hashes.contains(&tx.hash))
        .map(|tx| tx.hash.clone())
        .unwrap_or_else(|| TxHash::from(""));

    tracing::info!(
        wallet = %wallet.address,
        receivers = detection.unique_receiver_count,
        total = detection.total_amount,
        "dispersão de fundos em carteira monitorada"
    );
    outcome.events.push(TrackerEvent::WalletSplitDetected {
        address: wallet.address.clone(),
        detection: detection.clone(),
    });
    outcome.alerts.push(Alert::new(trigger, AlertKind::SplitPattern { detection }, now).for_wallet(wallet.address.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ethernity_core::Direction;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn tx(hash: &str, from: &str, to: &str, amount: f64, hours_ago: i64) -> Transaction {
        Transaction {
            hash: TxHash::from(hash),
            from: Address::from(from),
            to: Address::from(to),
            amount,
            currency: "BTC".into(),
            timestamp: now() - chrono::Duration::hours(hours_ago),
            direction: Direction::Out,
            confirmations: 1,
            fee: None,
        }
    }

    fn watch_with(address: &str) -> WalletWatch {
        let watch = WalletWatch::default();
        watch.add(Address::from(address), None, "BTC", now()).unwrap();
        watch
    }

    #[test]
    fn add_rejects_empty_address_and_keeps_history() {
        let watch = WalletWatch::default();
        assert!(matches!(
            watch.add(Address::from("  "), None, "BTC", now()),
            Err(Error::InvalidInput(_))
        ));

        let wallet = Address::from("bc1qwalletaddress0001");
        assert!(watch.add(wallet.clone(), None, "BTC", now()).unwrap());
        assert_eq!(watch.get(&wallet).unwrap().name, format_address(&wallet));

        watch.apply(&wallet, vec![tx("t1", "X", "bc1qwalletaddress0001", 5.0, 1)], &TrackerConfig::default(), now());
        assert!(!watch.add(wallet.clone(), Some("tesouraria"), "USDT", now()).unwrap());

        let stored = watch.get(&wallet).unwrap();
        assert_eq!(stored.name, "tesouraria");
        assert_eq!(stored.currency, "USDT");
        assert_eq!(stored.transactions.len(), 1);
    }

    #[test]
    fn outgoing_fan_out_in_window_is_reported_once() {
        let watch = watch_with("W");
        let config = TrackerConfig::default();
        let batch = vec![
            tx("o1", "W", "R1", 200_000.0, 3),
            tx("o2", "W", "R2", 200_000.0, 2),
            tx("o3", "W", "R3", 200_000.0, 1),
            tx("in", "Z", "W", 900_000.0, 1),
        ];

        let outcome = watch.apply(&Address::from("W"), batch.clone(), &config, now());
        let splits: Vec<_> = outcome
            .events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::WalletSplitDetected { .. }))
            .collect();
        assert_eq!(splits.len(), 1);
        if let TrackerEvent::WalletSplitDetected { detection, .. } = splits[0] {
            assert_eq!(detection.unique_receiver_count, 3);
            assert_eq!(detection.total_amount, 600_000.0);
        }

        // a entrada grande é alertada, mas não conta para a dispersão
        assert_eq!(outcome.auto_track, vec![(TxHash::from("in"), Address::from("W"))]);
        assert_eq!(outcome.alerts.len(), 2);
        assert!(outcome.alerts.iter().all(|a| a.wallet == Some(Address::from("W"))));

        let again = watch.apply(&Address::from("W"), batch, &config, now());
        assert!(again.events.is_empty());
        assert!(again.alerts.is_empty());
    }

    #[test]
    fn outgoing_transfers_outside_window_do_not_split() {
        let watch = watch_with("W");
        let outcome = watch.apply(
            &Address::from("W"),
            vec![
                tx("o1", "W", "R1", 200_000.0, 30),
                tx("o2", "W", "R2", 200_000.0, 2),
                tx("o3", "W", "R3", 200_000.0, 1),
            ],
            &TrackerConfig::default(),
            now(),
        );
        assert!(outcome.alerts.is_empty());
        assert_eq!(outcome.events.len(), 3);
    }

    #[test]
    fn invalid_transactions_are_reported_once() {
        let watch = watch_with("W");
        let config = TrackerConfig::default();
        let batch = vec![tx("bad", "W", "R1", -1.0, 1)];

        let first = watch.apply(&Address::from("W"), batch.clone(), &config, now());
        assert!(matches!(first.events.as_slice(), [TrackerEvent::Error { .. }]));

        let second = watch.apply(&Address::from("W"), batch, &config, now());
        assert!(second.events.is_empty());
        assert!(watch.get(&Address::from("W")).unwrap().transactions.is_empty());
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let watch = watch_with("W");
        let config = TrackerConfig::builder()
            .wallet_history_limit(2)
            .track_split_transactions(false)
            .build()
            .unwrap();
        watch.apply(
            &Address::from("W"),
            vec![
                tx("a", "W", "R1", 1.0, 5),
                tx("b", "W", "R2", 1.0, 1),
                tx("c", "W", "R3", 1.0, 3),
            ],
            &config,
            now(),
        );

        let wallet = watch.get(&Address::from("W")).unwrap();
        let hashes: Vec<&str> = wallet.transactions.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["b", "c"]);
        assert_eq!(wallet.last_checked_at, Some(now()));
    }

    #[test]
    fn removed_wallet_ignores_late_results() {
        let watch = watch_with("W");
        assert!(watch.remove(&Address::from("W")));
        assert!(!watch.remove(&Address::from("W")));

        let outcome = watch.apply(
            &Address::from("W"),
            vec![tx("big", "W", "R", 900_000.0, 1)],
            &TrackerConfig::default(),
            now(),
        );
        assert!(outcome.events.is_empty());
        assert!(watch.addresses().is_empty());
    }
}
