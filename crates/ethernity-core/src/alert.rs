/*!
 * Ethernity Alerts
 *
 * Alertas emitidos pelo rastreamento de fluxo de fundos
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{Address, Severity, Transaction, TxHash};

/// Resultado de uma detecção de dispersão (fan-out) de fundos.
/// Derivado e recalculado a cada passagem do detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitDetection {
    pub originating_address: Address,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub contributing_transaction_hashes: BTreeSet<TxHash>,
    pub total_amount: f64,
    pub unique_receiver_count: usize,
    /// Receptores na ordem em que apareceram
    pub receivers: Vec<Address>,
}

/// Tipo de alerta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    LargeTransfer,
    SplitPattern,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::LargeTransfer => write!(f, "large_transfer"),
            AlertType::SplitPattern => write!(f, "split_pattern"),
        }
    }
}

/// Conteúdo do alerta; cada variante carrega apenas o que precisa
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    LargeTransfer { transaction: Transaction },
    SplitPattern { detection: SplitDetection },
}

impl AlertKind {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertKind::LargeTransfer { .. } => AlertType::LargeTransfer,
            AlertKind::SplitPattern { .. } => AlertType::SplitPattern,
        }
    }

    /// Dispersão é tratada como mais grave que uma transferência grande isolada
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::LargeTransfer { .. } => Severity::High,
            AlertKind::SplitPattern { .. } => Severity::Critical,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            AlertKind::LargeTransfer { transaction } => transaction.amount,
            AlertKind::SplitPattern { detection } => detection.total_amount,
        }
    }
}

/// Identificador de alerta
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn generate() -> Self {
        Self(format!("alert_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Situação de um alerta ao longo da investigação
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Recém-criado, fluxo ainda em rastreamento
    Tracking,
    /// Confirmado como suspeito por um analista
    HighRisk,
    Resolved,
}

impl AlertStatus {
    /// Alertas resolvidos deixam de contar como ativos
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Tracking => write!(f, "tracking"),
            AlertStatus::HighRisk => write!(f, "high_risk"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Alerta entregue aos sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    /// Transação raiz da sessão que originou o alerta; para carteiras
    /// monitoradas, a transação que disparou o alerta
    pub root_transaction: TxHash,
    /// Carteira monitorada de origem, quando houver
    pub wallet: Option<Address>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub status: AlertStatus,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(root_transaction: TxHash, kind: AlertKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AlertId::generate(),
            root_transaction,
            wallet: None,
            severity: kind.severity(),
            kind,
            status: AlertStatus::Tracking,
            resolution: None,
            created_at,
            updated_at: None,
        }
    }

    /// Associa o alerta a uma carteira monitorada
    pub fn for_wallet(mut self, wallet: Address) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Atualiza a situação do alerta; resolução vazia é descartada
    pub fn update_status(&mut self, status: AlertStatus, resolution: impl Into<String>, now: DateTime<Utc>) {
        let resolution = resolution.into();
        self.status = status;
        self.resolution = if resolution.is_empty() { None } else { Some(resolution) };
        self.updated_at = Some(now);
    }

    /// Mensagem curta para logs e notificações
    pub fn summary(&self) -> String {
        match &self.kind {
            AlertKind::LargeTransfer { transaction } => format!(
                "Transferência grande {} de {} para {}: {} {}",
                transaction.hash, transaction.from, transaction.to, transaction.amount, transaction.currency
            ),
            AlertKind::SplitPattern { detection } => format!(
                "Dispersão de fundos a partir de {}: {} receptores, total {}",
                detection.originating_address, detection.unique_receiver_count, detection.total_amount
            ),
        }
    }
}

/// Filtro de consulta de alertas. Campos ausentes não restringem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub alert_type: Option<AlertType>,
    pub status: Option<AlertStatus>,
    /// Limite inferior inclusivo de `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Limite superior inclusivo de `created_at`
    pub to: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_type(mut self, alert_type: AlertType) -> Self {
        self.alert_type = Some(alert_type);
        self
    }

    pub fn status(mut self, status: AlertStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.alert_type.map_or(true, |t| alert.kind.alert_type() == t)
            && self.status.map_or(true, |s| alert.status == s)
            && self.from.map_or(true, |from| alert.created_at >= from)
            && self.to.map_or(true, |to| alert.created_at <= to)
    }
}
