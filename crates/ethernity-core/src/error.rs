use thiserror::Error;

/// Erros comuns da biblioteca Ethernity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Transação ou recurso não resolvido pela fonte de dados
    #[error("Não encontrado: {0}")]
    NotFound(String),

    /// Entrada malformada (auto-transferência, valor não positivo, configuração inválida)
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    /// Falha de comunicação com a fonte de dados da blockchain
    #[error("Erro na fonte de dados: {0}")]
    DataSource(String),

    /// Erro de timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Limite de sessões de rastreamento simultâneas atingido
    #[error("Capacidade excedida: {0}")]
    CapacityExceeded(String),

    /// Erro de decodificação de dados
    #[error("Erro de decodificação: {0}")]
    Decode(String),

    /// Erro genérico
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Indica se o erro é transitório e pode ser repetido no próximo ciclo
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::DataSource(_) | Error::Timeout(_))
    }
}

/// Tipo de resultado usado em toda a biblioteca
pub type Result<T> = std::result::Result<T, Error>;
