use chrono::{DateTime, Utc};
use ethernity_core::{Address, Transaction, TxHash};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::graph::FlowGraph;

/// Estado de uma sessão de rastreamento.
/// `Completed` e `Stopped` são terminais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Tracking,
    Completed,
    Stopped,
}

impl TrackingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrackingStatus::Tracking)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingStatus::Tracking => write!(f, "tracking"),
            TrackingStatus::Completed => write!(f, "completed"),
            TrackingStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Motivo da conclusão de uma sessão
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Orçamento de profundidade esgotado
    DepthExhausted,
    /// Nenhum endereço restante para consultar
    FrontierExhausted,
}

/// Registro de rastreamento de uma transação raiz
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    pub root_hash: TxHash,
    pub root_transaction: Transaction,
    pub graph: FlowGraph,
    /// Transações aceitas após a raiz, na ordem de chegada
    pub subsequent_transactions: Vec<Transaction>,
    pub polled_addresses: HashSet<Address>,
    pub depth_budget_remaining: usize,
    /// Nível BFS mais profundo já descoberto
    pub explored_depth: usize,
    pub status: TrackingStatus,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub config: Arc<TrackerConfig>,
    pub(crate) last_reported_split: Option<BTreeSet<TxHash>>,
}

impl TrackingRecord {
    pub(crate) fn new(
        root_transaction: Transaction,
        graph: FlowGraph,
        config: Arc<TrackerConfig>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let explored_depth = graph.max_level().unwrap_or(0);
        Self {
            root_hash: root_transaction.hash.clone(),
            root_transaction,
            graph,
            subsequent_transactions: Vec::new(),
            polled_addresses: HashSet::new(),
            depth_budget_remaining: config.max_tracking_depth,
            explored_depth,
            status: TrackingStatus::Tracking,
            started_at,
            last_updated_at: started_at,
            config,
            last_reported_split: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    /// Endereços ainda não consultados
    pub fn frontier(&self) -> Vec<Address> {
        self.graph.frontier_addresses(&self.polled_addresses)
    }

    /// Total de transações no fluxo, incluindo a raiz
    pub fn transaction_count(&self) -> usize {
        self.subsequent_transactions.len() + 1
    }
}
