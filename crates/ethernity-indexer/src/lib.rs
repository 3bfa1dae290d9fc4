/*!
 * Ethernity Indexer
 *
 * Implementações de `ChainDataSource`: cliente HTTP para indexadores de
 * transações e fonte determinística em memória
 */

pub mod cache;
mod client;
mod fixture;

pub use cache::{CacheStats, TtlCache};
pub use client::{IndexerClient, IndexerConfig};
pub use fixture::FixtureDataSource;
