/*!
 * Ethernity Alerts
 *
 * Destinos para os alertas do rastreamento de fluxo
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethernity_core::{
    traits::AlertSink, Address, Alert, AlertFilter, AlertId, AlertKind, AlertStatus, AlertType, Error, Result,
    Severity, TxHash,
};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use std::collections::VecDeque;

/// Capacidade padrão da lista de alertas em memória
pub const DEFAULT_ALERT_CAPACITY: usize = 1000;

/// Tipo de erro retornado no envio de alertas.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("erro ao enviar alerta: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<AlertError> for Error {
    fn from(e: AlertError) -> Self {
        Error::DataSource(e.to_string())
    }
}

/// Documento de alerta enviado para o Elasticsearch.
#[derive(Serialize)]
struct AlertDocument<'a> {
    id: &'a str,
    alert_type: AlertType,
    severity: Severity,
    status: AlertStatus,
    root_transaction: &'a TxHash,
    wallet: Option<&'a Address>,
    message: String,
    amount: f64,
    source: &'a str,
    kind: &'a AlertKind,
    timestamp: DateTime<Utc>,
}

/// Envia alertas por POST JSON (ex.: índice do Elasticsearch).
pub struct HttpAlertSink {
    endpoint: String,
    source: String,
    client: Client,
}

impl HttpAlertSink {
    /// Cria uma nova instância apontando para `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            source: "ethernity-flowtrack".to_string(),
            client: Client::new(),
        }
    }

    /// Endpoint lido de `ETHERNITY_ALERTS_ENDPOINT`, com padrão local.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("ETHERNITY_ALERTS_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9200/alerts/_doc".to_string());
        Self::new(endpoint)
    }

    /// Nome do serviço gravado em cada documento.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Envia um alerta.
    pub async fn send(&self, alert: &Alert) -> std::result::Result<(), AlertError> {
        let document = AlertDocument {
            id: &alert.id.0,
            alert_type: alert.kind.alert_type(),
            severity: alert.severity,
            status: alert.status,
            root_transaction: &alert.root_transaction,
            wallet: alert.wallet.as_ref(),
            message: alert.summary(),
            amount: alert.kind.amount(),
            source: &self.source,
            kind: &alert.kind,
            timestamp: alert.created_at,
        };
        self.client
            .post(&self.endpoint)
            .json(&document)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for HttpAlertSink {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.send(alert).await.map_err(Error::from)
    }
}

/// Lista de alertas em memória, mais recentes primeiro e limitada em tamanho.
pub struct MemoryAlertSink {
    alerts: RwLock<VecDeque<Alert>>,
    capacity: usize,
}

impl Default for MemoryAlertSink {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

impl MemoryAlertSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, alert: Alert) {
        let mut alerts = self.alerts.write();
        alerts.push_front(alert);
        alerts.truncate(self.capacity);
    }

    /// Alertas armazenados, mais recentes primeiro
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().iter().cloned().collect()
    }

    pub fn alerts_of_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.query(&AlertFilter::new().alert_type(alert_type))
    }

    /// Alertas que satisfazem o filtro, do mais recente para o mais antigo por `created_at`
    pub fn query(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn get(&self, id: &AlertId) -> Option<Alert> {
        self.alerts.read().iter().find(|a| &a.id == id).cloned()
    }

    /// Atualiza a situação de um alerta; `false` se o id não existir
    pub fn update_alert_status(&self, id: &AlertId, status: AlertStatus, resolution: impl Into<String>) -> bool {
        let mut alerts = self.alerts.write();
        let Some(alert) = alerts.iter_mut().find(|a| &a.id == id) else {
            return false;
        };

        let previous = alert.status;
        alert.update_status(status, resolution, Utc::now());
        tracing::info!(alert_id = %id, from = %previous, to = %status, "situação do alerta atualizada");
        true
    }

    /// Alertas ainda não resolvidos
    pub fn active_count(&self) -> usize {
        self.alerts.read().iter().filter(|a| a.status.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.alerts.write().clear();
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.push(alert.clone());
        Ok(())
    }
}

/// Registra alertas via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Critical | Severity::High => tracing::warn!(
                alert_id = %alert.id,
                alert_type = %alert.kind.alert_type(),
                severity = %alert.severity,
                root = %alert.root_transaction,
                amount = alert.kind.amount(),
                "{}",
                alert.summary()
            ),
            _ => tracing::info!(
                alert_id = %alert.id,
                alert_type = %alert.kind.alert_type(),
                severity = %alert.severity,
                root = %alert.root_transaction,
                "{}",
                alert.summary()
            ),
        }
        Ok(())
    }
}
