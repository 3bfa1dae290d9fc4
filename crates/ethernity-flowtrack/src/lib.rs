/*!
 * Ethernity FlowTrack
 *
 * Rastreamento recursivo do fluxo de fundos a partir de uma transação raiz,
 * com construção incremental do grafo de fluxo e detecção de dispersão
 * (structuring / fan-out) dentro de uma janela de tempo. Carteiras
 * monitoradas passam pelos mesmos detectores a cada verificação.
 */

pub mod config;
pub mod detectors;
pub mod events;
pub mod graph;
pub mod record;
mod scheduler;
pub mod tracker;
pub mod watch;

// Re-exportações públicas
pub use config::{TrackerConfig, TrackerConfigBuilder};
pub use detectors::{LargeTransferDetector, SplitPatternDetector};
pub use events::{EventBus, TrackerEvent};
pub use graph::{FlowEdge, FlowEdgeView, FlowGraph, FlowGraphView, FlowNode, FlowNodeView, NodeRole};
pub use record::{CompletionReason, TrackingRecord, TrackingStatus};
pub use tracker::TransactionTracker;
pub use watch::WatchedWallet;
