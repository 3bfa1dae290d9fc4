/*!
 * Ethernity Traits
 *
 * Traits comuns usados em toda a workspace Ethernity
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::Alert;
use crate::error::Result;
use crate::types::{Address, Transaction, TxHash};

/// Fonte de dados da blockchain (indexador real ou fixture)
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Obtém os detalhes de uma transação; `Error::NotFound` se o hash não existir
    async fn get_transaction_details(&self, hash: &TxHash) -> Result<Transaction>;

    /// Obtém as transações recentes de um endereço, com `direction` relativa a ele
    async fn get_recent_transactions(&self, address: &Address) -> Result<Vec<Transaction>>;
}

/// Trait para destinos de alertas
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Envia um alerta
    async fn notify(&self, alert: &Alert) -> Result<()>;

    /// Verifica se o destino está disponível
    async fn is_available(&self) -> bool {
        true
    }
}

/// Relógio injetável; permite janelas temporais determinísticas em testes
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Relógio do sistema
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
