use ethernity_core::Transaction;

/// Detector de transferências acima do limiar configurado
#[derive(Debug, Clone)]
pub struct LargeTransferDetector {
    threshold: f64,
}

impl LargeTransferDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn name(&self) -> &str {
        "LargeTransferDetector"
    }

    pub fn is_large(&self, tx: &Transaction) -> bool {
        tx.amount >= self.threshold
    }

    /// Transações que atingem o limiar, na ordem recebida
    pub fn detect<'a>(&self, txs: &'a [Transaction]) -> Vec<&'a Transaction> {
        txs.iter().filter(|tx| self.is_large(tx)).collect()
    }
}
