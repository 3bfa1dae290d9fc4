use chrono::{DateTime, Utc};
use ethernity_core::{traits::AlertSink, Address, Alert, SplitDetection, Transaction, TxHash};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::record::CompletionReason;

/// Eventos emitidos pelo rastreador
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    TransactionTracked {
        tx_hash: TxHash,
        transaction: Transaction,
        started_at: DateTime<Utc>,
    },
    FundsSplitDetected {
        tx_hash: TxHash,
        detection: SplitDetection,
    },
    LargeTransferDetected {
        tx_hash: TxHash,
        transaction: Transaction,
    },
    TrackingComplete {
        tx_hash: TxHash,
        reason: CompletionReason,
        node_count: usize,
        edge_count: usize,
        transaction_count: usize,
    },
    Error {
        tx_hash: Option<TxHash>,
        address: Option<Address>,
        message: String,
    },
    /// Transação nova em uma carteira monitorada
    WalletTransaction {
        address: Address,
        transaction: Transaction,
    },
    WalletLargeTransfer {
        address: Address,
        transaction: Transaction,
    },
    WalletSplitDetected {
        address: Address,
        detection: SplitDetection,
    },
}

impl TrackerEvent {
    /// Hash da sessão relacionada ao evento, quando houver
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            TrackerEvent::TransactionTracked { tx_hash, .. }
            | TrackerEvent::FundsSplitDetected { tx_hash, .. }
            | TrackerEvent::LargeTransferDetected { tx_hash, .. }
            | TrackerEvent::TrackingComplete { tx_hash, .. } => Some(tx_hash),
            TrackerEvent::Error { tx_hash, .. } => tx_hash.as_ref(),
            TrackerEvent::WalletTransaction { .. }
            | TrackerEvent::WalletLargeTransfer { .. }
            | TrackerEvent::WalletSplitDetected { .. } => None,
        }
    }
}

/// Barramento de eventos sobre [`tokio::sync::broadcast`] com fan-out de alertas.
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    /// Publica um evento; sem assinantes o evento é descartado
    pub fn emit(&self, event: TrackerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("evento descartado: nenhum assinante");
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.write().push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Entrega o alerta a todos os sinks disponíveis. Falhas são apenas registradas.
    pub async fn dispatch(&self, alert: &Alert) {
        self.dispatch_until_cancelled(alert, &CancellationToken::new()).await;
    }

    /// Como [`EventBus::dispatch`], mas interrompe a entrega assim que `cancel`
    /// for acionado. Retorna `false` se algum sink ficou sem o alerta.
    pub async fn dispatch_until_cancelled(&self, alert: &Alert, cancel: &CancellationToken) -> bool {
        let sinks: Vec<Arc<dyn AlertSink>> = self.sinks.read().clone();
        for sink in sinks {
            if cancel.is_cancelled() {
                tracing::debug!(alert_id = %alert.id, "entrega de alerta interrompida");
                return false;
            }
            if !sink.is_available().await {
                tracing::debug!(alert_id = %alert.id, "sink indisponível, alerta ignorado");
                continue;
            }
            if let Err(e) = sink.notify(alert).await {
                tracing::warn!(alert_id = %alert.id, error = %e, "falha ao entregar alerta");
            }
        }
        true
    }
}
