use async_trait::async_trait;
use ethernity_core::{traits::ChainDataSource, Address, Error, Result, Transaction, TxHash};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheStats, TtlCache};

/// Configuração do cliente do indexador
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub use_cache: bool,
    pub cache_ttl_ms: u64,
    pub cache_capacity: usize,
    /// Quantidade de transações pedidas por endereço
    pub recent_limit: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 500,
            use_cache: true,
            cache_ttl_ms: 10 * 60 * 1000,
            cache_capacity: 10_000,
            recent_limit: 50,
        }
    }
}

impl IndexerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Lê `ETHERNITY_INDEXER_*`, usando o padrão para as variáveis ausentes
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("ETHERNITY_INDEXER_URL") {
            config.endpoint = endpoint;
        }
        read_env("ETHERNITY_INDEXER_TIMEOUT_MS", &mut config.timeout_ms)?;
        read_env("ETHERNITY_INDEXER_MAX_RETRIES", &mut config.max_retries)?;
        read_env("ETHERNITY_INDEXER_RETRY_DELAY_MS", &mut config.retry_delay_ms)?;
        read_env("ETHERNITY_INDEXER_USE_CACHE", &mut config.use_cache)?;
        read_env("ETHERNITY_INDEXER_RECENT_LIMIT", &mut config.recent_limit)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
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

/// Cliente HTTP para um indexador de transações com API JSON
pub struct IndexerClient {
    http: Client,
    config: IndexerConfig,
    details: TtlCache<TxHash, Transaction>,
}

impl IndexerClient {
    pub fn new(config: IndexerConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::InvalidInput("endpoint do indexador vazio".to_string()));
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Other(format!("Falha ao criar cliente HTTP: {}", e)))?;

        Ok(Self {
            http,
            details: TtlCache::new(config.cache_capacity, config.cache_ttl()),
            config,
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.details.stats()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// GET com novas tentativas para falhas de transporte e respostas 5xx
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(url, attempt, error = %e, "nova tentativa no indexador");
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                result => return result,
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("indexador não respondeu: {}", url))
            } else {
                Error::DataSource(format!("Falha na requisição ao indexador: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        if status.is_server_error() {
            return Err(Error::DataSource(format!("indexador retornou {} para {}", status, url)));
        }
        if !status.is_success() {
            return Err(Error::InvalidInput(format!("indexador rejeitou {} com {}", url, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Decode(format!("Resposta inválida do indexador: {}", e)))
    }
}

#[async_trait]
impl ChainDataSource for IndexerClient {
    async fn get_transaction_details(&self, hash: &TxHash) -> Result<Transaction> {
        if self.config.use_cache {
            if let Some(tx) = self.details.get(hash) {
                return Ok(tx);
            }
        }

        let url = self.url(&format!("transactions/{}", hash));
        let tx: Transaction = self.get_json(&url).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("transação {}", hash)),
            other => other,
        })?;

        if self.config.use_cache {
            self.details.insert(hash.clone(), tx.clone());
        }
        Ok(tx)
    }

    async fn get_recent_transactions(&self, address: &Address) -> Result<Vec<Transaction>> {
        let url = self.url(&format!(
            "addresses/{}/transactions?limit={}",
            address, self.config.recent_limit
        ));

        match self.get_json::<Vec<Transaction>>(&url).await {
            Ok(transactions) => Ok(transactions),
            // endereço sem histórico
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
