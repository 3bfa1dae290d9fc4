/*!
 * Ethernity FlowTrack - Graph
 *
 * Grafo dirigido de fluxo de fundos: nós são endereços, arestas são transferências
 */

use chrono::{DateTime, Utc};
use ethernity_core::{
    utils::{format_address, format_amount},
    Address, Error, Result, Transaction, TxHash,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Papel de um nó no fluxo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Source,
    Intermediate,
    Destination,
}

/// Nó do grafo. O papel não é armazenado: é avaliado na leitura.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub address: Address,
    pub total_received: f64,
    pub total_sent: f64,
}

/// Aresta do grafo, uma por transação observada. Nunca é alterada ou removida.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdge {
    pub transaction_hash: TxHash,
    pub source: Address,
    pub target: Address,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

impl FlowEdge {
    pub(crate) fn from_transaction(tx: &Transaction) -> Self {
        Self {
            transaction_hash: tx.hash.clone(),
            source: tx.from.clone(),
            target: tx.to.clone(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            timestamp: tx.timestamp,
        }
    }

    pub fn label(&self) -> String {
        format_amount(self.amount, &self.currency)
    }
}

/// Nó serializável com papel e nível resolvidos
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowNodeView {
    pub address: Address,
    pub label: String,
    pub role: NodeRole,
    pub level: Option<usize>,
    pub total_received: f64,
    pub total_sent: f64,
}

/// Aresta serializável com rótulo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdgeView {
    #[serde(flatten)]
    pub edge: FlowEdge,
    pub label: String,
}

/// Snapshot `{nodes, edges}` para consumidores de UI e alertas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowGraphView {
    pub nodes: Vec<FlowNodeView>,
    pub edges: Vec<FlowEdgeView>,
}

/// Grafo de fluxo construído incrementalmente a partir de uma transação raiz
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    root: Option<Address>,
    nodes: Vec<FlowNode>,
    index: HashMap<Address, usize>,
    edges: Vec<FlowEdge>,
    edge_hashes: HashSet<TxHash>,
    outgoing: HashMap<Address, Vec<usize>>,
    levels: HashMap<Address, usize>,
}

impl FlowGraph {
    /// Cria um grafo vazio
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria um grafo já semeado com a transação raiz
    pub fn with_root(tx: &Transaction) -> Result<Self> {
        let mut graph = Self::new();
        graph.add_root_transaction(tx)?;
        Ok(graph)
    }

    /// Inicializa o grafo com origem `tx.from`, destino `tx.to` e uma aresta
    pub fn add_root_transaction(&mut self, tx: &Transaction) -> Result<()> {
        tx.validate()?;
        if let Some(root) = &self.root {
            return Err(Error::InvalidInput(format!(
                "grafo já possui raiz {}",
                root
            )));
        }

        self.root = Some(tx.from.clone());
        self.append(tx);
        self.recompute_levels();
        Ok(())
    }

    /// Acrescenta as transações ainda não vistas (por hash).
    /// O lote inteiro é validado antes de qualquer mutação.
    pub fn merge_transactions(&mut self, txs: &[Transaction]) -> Result<Vec<FlowEdge>> {
        for tx in txs {
            tx.validate()?;
        }

        let mut added = Vec::new();
        for tx in txs {
            if self.edge_hashes.contains(&tx.hash) {
                continue;
            }
            added.push(self.append(tx).clone());
        }

        if !added.is_empty() {
            self.recompute_levels();
        }
        Ok(added)
    }

    fn append(&mut self, tx: &Transaction) -> &FlowEdge {
        let source = self.node_index(&tx.from);
        self.nodes[source].total_sent += tx.amount;
        let target = self.node_index(&tx.to);
        self.nodes[target].total_received += tx.amount;

        let edge_index = self.edges.len();
        self.edges.push(FlowEdge::from_transaction(tx));
        self.edge_hashes.insert(tx.hash.clone());
        self.outgoing.entry(tx.from.clone()).or_default().push(edge_index);
        &self.edges[edge_index]
    }

    fn node_index(&mut self, address: &Address) -> usize {
        if let Some(&idx) = self.index.get(address) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(FlowNode {
            address: address.clone(),
            total_received: 0.0,
            total_sent: 0.0,
        });
        self.index.insert(address.clone(), idx);
        idx
    }

    /// BFS a partir da raiz; nós inalcançáveis ficam sem nível
    fn recompute_levels(&mut self) {
        self.levels.clear();
        let Some(root) = self.root.clone() else {
            return;
        };

        let mut queue = VecDeque::new();
        self.levels.insert(root.clone(), 0);
        queue.push_back(root);

        while let Some(address) = queue.pop_front() {
            let level = self.levels[&address];
            let Some(edge_ids) = self.outgoing.get(&address) else {
                continue;
            };
            for &edge_id in edge_ids {
                let target = &self.edges[edge_id].target;
                if !self.levels.contains_key(target) {
                    self.levels.insert(target.clone(), level + 1);
                    queue.push_back(target.clone());
                }
            }
        }
    }

    /// Endereço de origem da transação raiz
    pub fn root(&self) -> Option<&Address> {
        self.root.as_ref()
    }

    /// Distância BFS a partir da raiz
    pub fn level_of(&self, address: &Address) -> Option<usize> {
        self.levels.get(address).copied()
    }

    /// Maior nível alcançável a partir da raiz
    pub fn max_level(&self) -> Option<usize> {
        self.levels.values().copied().max()
    }

    /// Nós alcançáveis em um nível, na ordem de descoberta
    pub fn nodes_at_level(&self, level: usize) -> Vec<&Address> {
        self.nodes
            .iter()
            .map(|n| &n.address)
            .filter(|a| self.levels.get(*a) == Some(&level))
            .collect()
    }

    /// Papel avaliado na leitura: a raiz é origem, quem já enviou é intermediário
    pub fn role_of(&self, address: &Address) -> Option<NodeRole> {
        if !self.index.contains_key(address) {
            return None;
        }
        if self.root.as_ref() == Some(address) {
            return Some(NodeRole::Source);
        }
        if self.outgoing.contains_key(address) {
            Some(NodeRole::Intermediate)
        } else {
            Some(NodeRole::Destination)
        }
    }

    /// Destinos de arestas ainda não consultados, na ordem em que apareceram
    pub fn frontier_addresses(&self, polled: &HashSet<Address>) -> Vec<Address> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .map(|e| &e.target)
            .filter(|t| !polled.contains(*t) && seen.insert(*t))
            .cloned()
            .collect()
    }

    /// Arestas de saída de um endereço
    pub fn outgoing_edges(&self, address: &Address) -> Vec<&FlowEdge> {
        self.outgoing
            .get(address)
            .map(|ids| ids.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn contains_transaction(&self, hash: &TxHash) -> bool {
        self.edge_hashes.contains(hash)
    }

    pub fn node(&self, address: &Address) -> Option<&FlowNode> {
        self.index.get(address).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Gera o snapshot serializável do grafo
    pub fn view(&self) -> FlowGraphView {
        let nodes = self
            .nodes
            .iter()
            .map(|n| FlowNodeView {
                address: n.address.clone(),
                label: format_address(&n.address),
                role: self.role_of(&n.address).unwrap_or(NodeRole::Destination),
                level: self.level_of(&n.address),
                total_received: n.total_received,
                total_sent: n.total_sent,
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|e| FlowEdgeView {
                label: e.label(),
                edge: e.clone(),
            })
            .collect();

        FlowGraphView { nodes, edges }
    }
}
