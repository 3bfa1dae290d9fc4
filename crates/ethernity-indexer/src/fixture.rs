use async_trait::async_trait;
use dashmap::DashMap;
use ethernity_core::{traits::ChainDataSource, Address, Direction, Error, Result, Transaction, TxHash};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fonte de dados determinística em memória.
///
/// Permite injetar falhas por endereço e contar chamadas, para testes e demos.
#[derive(Default)]
pub struct FixtureDataSource {
    transactions: RwLock<Vec<Transaction>>,
    failures: DashMap<Address, String>,
    recent_calls: DashMap<Address, usize>,
    detail_calls: AtomicUsize,
    latency: RwLock<Option<Duration>>,
}

impl FixtureDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let source = Self::new();
        source.extend(transactions);
        source
    }

    /// Carrega transações a partir de um array JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let transactions: Vec<Transaction> = serde_json::from_str(json)
            .map_err(|e| Error::Decode(format!("fixture inválida: {}", e)))?;
        Ok(Self::with_transactions(transactions))
    }

    /// Adiciona uma transação; hashes repetidos são ignorados
    pub fn insert(&self, tx: Transaction) {
        let mut transactions = self.transactions.write();
        if !transactions.iter().any(|t| t.hash == tx.hash) {
            transactions.push(tx);
        }
    }

    pub fn extend(&self, transactions: impl IntoIterator<Item = Transaction>) {
        for tx in transactions {
            self.insert(tx);
        }
    }

    /// Faz as consultas de `address` falharem com `Error::DataSource`
    pub fn fail_address(&self, address: Address, message: impl Into<String>) {
        self.failures.insert(address, message.into());
    }

    pub fn clear_failure(&self, address: &Address) {
        self.failures.remove(address);
    }

    /// Atraso aplicado antes de cada resposta
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    pub fn recent_calls(&self, address: &Address) -> usize {
        self.recent_calls.get(address).map(|c| *c).unwrap_or(0)
    }

    pub fn total_recent_calls(&self) -> usize {
        self.recent_calls.iter().map(|entry| *entry.value()).sum()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChainDataSource for FixtureDataSource {
    async fn get_transaction_details(&self, hash: &TxHash) -> Result<Transaction> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let found = self
            .transactions
            .read()
            .iter()
            .find(|tx| &tx.hash == hash)
            .cloned();
        found.ok_or_else(|| Error::NotFound(format!("transação {}", hash)))
    }

    async fn get_recent_transactions(&self, address: &Address) -> Result<Vec<Transaction>> {
        *self.recent_calls.entry(address.clone()).or_insert(0) += 1;
        self.simulate_latency().await;

        if let Some(message) = self.failures.get(address) {
            return Err(Error::DataSource(message.value().clone()));
        }

        let mut related: Vec<Transaction> = self
            .transactions
            .read()
            .iter()
            .filter(|tx| &tx.from == address || &tx.to == address)
            .cloned()
            .map(|mut tx| {
                tx.direction = if &tx.from == address { Direction::Out } else { Direction::In };
                tx
            })
            .collect();

        // mais recentes primeiro
        related.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(related)
    }
}
