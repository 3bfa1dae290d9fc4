use ethernity_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::detectors::{LargeTransferDetector, SplitPatternDetector};

/// Maior janela de dispersão aceita (um ano)
pub const MAX_SPLIT_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Configuração de uma sessão de rastreamento.
/// Imutável depois de atribuída a um registro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Número máximo de níveis expandidos a partir da raiz
    pub max_tracking_depth: usize,
    /// Intervalo entre ciclos de consulta em milissegundos
    pub polling_interval_ms: u64,
    /// Executa o primeiro ciclo assim que a sessão é criada
    pub poll_immediately: bool,
    /// Rastreia automaticamente transações grandes encontradas no fluxo
    pub auto_track_large_transactions: bool,
    /// Limiar de transação grande
    pub large_transaction_threshold: f64,
    /// Habilita a detecção de dispersão no destino da transação raiz
    pub track_split_transactions: bool,
    /// Número mínimo de transferências e de receptores distintos
    pub min_split_count: usize,
    /// Soma mínima das transferências dispersas
    pub split_min_total_amount: f64,
    /// Janela da detecção de dispersão em milissegundos
    pub split_window_ms: u64,
    /// Limite de sessões simultâneas (inclui as criadas por rastreamento automático)
    pub max_concurrent_sessions: usize,
    /// Timeout de cada consulta à fonte de dados em milissegundos
    pub fetch_timeout_ms: u64,
    /// Capacidade do canal de eventos
    pub event_channel_capacity: usize,
    /// Intervalo entre verificações das carteiras monitoradas em milissegundos
    pub wallet_poll_interval_ms: u64,
    /// Transações guardadas por carteira monitorada
    pub wallet_history_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_tracking_depth: 5,
            polling_interval_ms: 60_000, // 60 segundos
            poll_immediately: true,
            auto_track_large_transactions: true,
            large_transaction_threshold: 500_000.0,
            track_split_transactions: true,
            min_split_count: 3,
            split_min_total_amount: 500_000.0,
            split_window_ms: 24 * 60 * 60 * 1000, // 24 horas
            max_concurrent_sessions: 64,
            fetch_timeout_ms: 30_000,
            event_channel_capacity: 1024,
            wallet_poll_interval_ms: 30_000,
            wallet_history_limit: 1000,
        }
    }
}

impl TrackerConfig {
    /// Cria um builder para a configuração
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder {
            config: TrackerConfig::default(),
        }
    }

    /// Lê a configuração de variáveis `ETHERNITY_*`, usando o padrão para as ausentes
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        read_env("ETHERNITY_MAX_TRACKING_DEPTH", &mut config.max_tracking_depth)?;
        read_env("ETHERNITY_POLLING_INTERVAL_MS", &mut config.polling_interval_ms)?;
        read_env("ETHERNITY_AUTO_TRACK_LARGE", &mut config.auto_track_large_transactions)?;
        read_env("ETHERNITY_LARGE_THRESHOLD", &mut config.large_transaction_threshold)?;
        read_env("ETHERNITY_TRACK_SPLITS", &mut config.track_split_transactions)?;
        read_env("ETHERNITY_MIN_SPLIT_COUNT", &mut config.min_split_count)?;
        read_env("ETHERNITY_SPLIT_MIN_TOTAL", &mut config.split_min_total_amount)?;
        read_env("ETHERNITY_SPLIT_WINDOW_MS", &mut config.split_window_ms)?;
        read_env("ETHERNITY_MAX_SESSIONS", &mut config.max_concurrent_sessions)?;
        read_env("ETHERNITY_FETCH_TIMEOUT_MS", &mut config.fetch_timeout_ms)?;
        read_env("ETHERNITY_WALLET_POLL_INTERVAL_MS", &mut config.wallet_poll_interval_ms)?;
        config.validate()?;
        Ok(config)
    }

    /// Valida os limites da configuração
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_ms == 0 {
            return Err(Error::InvalidInput("polling_interval_ms deve ser positivo".to_string()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::InvalidInput("fetch_timeout_ms deve ser positivo".to_string()));
        }
        if self.min_split_count == 0 {
            return Err(Error::InvalidInput("min_split_count deve ser ao menos 1".to_string()));
        }
        if self.max_concurrent_sessions == 0 || self.max_concurrent_sessions > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(Error::InvalidInput(format!(
                "max_concurrent_sessions fora do intervalo: {}",
                self.max_concurrent_sessions
            )));
        }
        if self.split_window_ms > MAX_SPLIT_WINDOW_MS {
            return Err(Error::InvalidInput(format!(
                "split_window_ms acima do máximo de {}: {}",
                MAX_SPLIT_WINDOW_MS, self.split_window_ms
            )));
        }
        if self.wallet_poll_interval_ms == 0 {
            return Err(Error::InvalidInput("wallet_poll_interval_ms deve ser positivo".to_string()));
        }
        if self.wallet_history_limit == 0 {
            return Err(Error::InvalidInput("wallet_history_limit deve ser ao menos 1".to_string()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::InvalidInput("event_channel_capacity deve ser ao menos 1".to_string()));
        }
        for (name, value) in [
            ("large_transaction_threshold", self.large_transaction_threshold),
            ("split_min_total_amount", self.split_min_total_amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidInput(format!("{} inválido: {}", name, value)));
            }
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn wallet_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wallet_poll_interval_ms)
    }

    pub fn split_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.split_window_ms).unwrap_or(i64::MAX))
    }

    pub fn split_detector(&self) -> SplitPatternDetector {
        SplitPatternDetector::new(
            self.split_window(),
            self.min_split_count,
            self.split_min_total_amount,
        )
    }

    pub fn large_transfer_detector(&self) -> LargeTransferDetector {
        LargeTransferDetector::new(self.large_transaction_threshold)
    }
}

/// Milissegundos de uma duração, saturando em `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn read_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = std::env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("valor inválido para {}: {}", key, raw)))?;
    }
    Ok(())
}

/// Builder para a configuração do rastreador
#[derive(Debug, Clone)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// Define a profundidade máxima de rastreamento
    pub fn max_tracking_depth(mut self, depth: usize) -> Self {
        self.config.max_tracking_depth = depth;
        self
    }

    /// Define o intervalo entre ciclos
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.config.polling_interval_ms = millis(interval);
        self
    }

    /// Define se o primeiro ciclo roda imediatamente
    pub fn poll_immediately(mut self, enabled: bool) -> Self {
        self.config.poll_immediately = enabled;
        self
    }

    /// Habilita ou desabilita o rastreamento automático de transações grandes
    pub fn auto_track_large_transactions(mut self, enabled: bool) -> Self {
        self.config.auto_track_large_transactions = enabled;
        self
    }

    /// Define o limiar de transação grande
    pub fn large_transaction_threshold(mut self, threshold: f64) -> Self {
        self.config.large_transaction_threshold = threshold;
        self
    }

    /// Habilita ou desabilita a detecção de dispersão
    pub fn track_split_transactions(mut self, enabled: bool) -> Self {
        self.config.track_split_transactions = enabled;
        self
    }

    /// Define os parâmetros da detecção de dispersão
    pub fn split_pattern(mut self, min_count: usize, min_total_amount: f64, window: Duration) -> Self {
        self.config.min_split_count = min_count;
        self.config.split_min_total_amount = min_total_amount;
        self.config.split_window_ms = millis(window);
        self
    }

    /// Define o limite de sessões simultâneas
    pub fn max_concurrent_sessions(mut self, max: usize) -> Self {
        self.config.max_concurrent_sessions = max;
        self
    }

    /// Define o timeout de cada consulta
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout_ms = millis(timeout);
        self
    }

    /// Define o intervalo de verificação das carteiras monitoradas
    pub fn wallet_poll_interval(mut self, interval: Duration) -> Self {
        self.config.wallet_poll_interval_ms = millis(interval);
        self
    }

    /// Define quantas transações são guardadas por carteira
    pub fn wallet_history_limit(mut self, limit: usize) -> Self {
        self.config.wallet_history_limit = limit;
        self
    }

    /// Define a capacidade do canal de eventos
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Constrói e valida a configuração
    pub fn build(self) -> Result<TrackerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
