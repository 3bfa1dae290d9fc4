/*!
 * Ethernity FlowTrack - Tracker
 *
 * Orquestra o rastreamento por profundidade: cada transação raiz ganha uma
 * sessão que consulta periodicamente os endereços da fronteira do grafo
 */

use dashmap::DashMap;
use ethernity_core::{
    traits::{AlertSink, ChainDataSource, Clock, SystemClock},
    Address, Alert, AlertKind, Error, Result, SplitDetection, Transaction, TxHash,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;
use crate::events::{EventBus, TrackerEvent};
use crate::graph::{FlowGraph, FlowGraphView};
use crate::record::{CompletionReason, TrackingRecord, TrackingStatus};
use crate::scheduler::{run_scheduler, run_session, run_wallet_watch, ScheduleCommand, Session, TickOutcome};
use crate::watch::{WalletWatch, WatchOutcome, WatchedWallet};

/// Rastreador de fluxo de fundos.
///
/// Clonável e barato de compartilhar; todos os clones apontam para as mesmas
/// sessões. Deve ser criado dentro de um runtime Tokio.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Arc<TrackerInner>,
}

pub(crate) struct TrackerInner {
    source: Arc<dyn ChainDataSource>,
    config: Arc<TrackerConfig>,
    clock: Arc<dyn Clock>,
    sessions: DashMap<TxHash, Arc<Session>>,
    slots: Arc<Semaphore>,
    wallets: WalletWatch,
    events: EventBus,
    commands: mpsc::UnboundedSender<ScheduleCommand>,
    shutdown: CancellationToken,
}

impl TransactionTracker {
    /// Cria um rastreador com o relógio do sistema
    pub fn new(source: Arc<dyn ChainDataSource>, config: TrackerConfig) -> Result<Self> {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    /// Cria um rastreador com um relógio injetado
    pub fn with_clock(
        source: Arc<dyn ChainDataSource>,
        config: TrackerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let max_concurrent_sessions = config.max_concurrent_sessions;
        let inner = Arc::new(TrackerInner {
            source,
            events: EventBus::new(config.event_channel_capacity),
            config: Arc::new(config),
            clock,
            sessions: DashMap::new(),
            slots: Arc::new(Semaphore::new(max_concurrent_sessions)),
            wallets: WalletWatch::default(),
            commands,
            shutdown: shutdown.clone(),
        });

        tokio::spawn(run_scheduler(Arc::downgrade(&inner), receiver, shutdown.clone()));
        tokio::spawn(run_wallet_watch(
            Arc::downgrade(&inner),
            inner.config.wallet_poll_interval(),
            shutdown,
        ));

        Ok(Self { inner })
    }

    /// Configuração padrão das sessões
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Inicia o rastreamento de uma transação com a configuração padrão.
    ///
    /// Retorna o registro existente se o hash já estiver rastreado.
    pub async fn track_transaction(&self, hash: &TxHash) -> Result<TrackingRecord> {
        self.inner
            .start_session(hash.clone(), self.inner.config.clone())
            .await
    }

    /// Inicia o rastreamento com uma configuração própria para esta sessão
    pub async fn track_transaction_with(
        &self,
        hash: &TxHash,
        config: TrackerConfig,
    ) -> Result<TrackingRecord> {
        config.validate()?;
        self.inner.start_session(hash.clone(), Arc::new(config)).await
    }

    /// Interrompe uma sessão; `false` se o hash não estiver em rastreamento
    pub fn stop_tracking(&self, hash: &TxHash) -> bool {
        let Some(session) = self.inner.session(hash) else {
            return false;
        };

        let stopped = {
            let mut record = session.record.write();
            if record.is_tracking() {
                record.status = TrackingStatus::Stopped;
                record.last_updated_at = self.inner.clock.now();
                true
            } else {
                false
            }
        };
        session.cancel.cancel();
        session.release_slot();

        if stopped {
            tracing::info!(tx_hash = %hash, "rastreamento interrompido");
        }
        stopped
    }

    /// Remove o registro, permitindo rastrear o mesmo hash novamente
    pub fn remove_tracking(&self, hash: &TxHash) -> Option<TrackingRecord> {
        let (_, session) = self.inner.sessions.remove(hash)?;
        session.cancel.cancel();
        session.release_slot();

        let mut record = session.record.write();
        if record.is_tracking() {
            record.status = TrackingStatus::Stopped;
            record.last_updated_at = self.inner.clock.now();
        }
        tracing::debug!(tx_hash = %hash, "registro de rastreamento removido");
        Some(record.clone())
    }

    /// Cópia do registro de uma sessão
    pub fn get_tracking_record(&self, hash: &TxHash) -> Option<TrackingRecord> {
        self.inner.session(hash).map(|s| s.snapshot())
    }

    /// Cópias de todos os registros, mais antigos primeiro
    pub fn list_tracking_records(&self) -> Vec<TrackingRecord> {
        let sessions: Vec<Arc<Session>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut records: Vec<TrackingRecord> = sessions.iter().map(|s| s.snapshot()).collect();
        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.root_hash.cmp(&b.root_hash))
        });
        records
    }

    /// Snapshot `{nodes, edges}` do grafo de uma sessão
    pub fn get_flow_graph(&self, hash: &TxHash) -> Option<FlowGraphView> {
        self.inner
            .session(hash)
            .map(|s| {
                let record = s.record.read();
                record.graph.view()
            })
    }

    /// Avalia sob demanda a dispersão a partir do destino da transação raiz
    pub fn detect_split_pattern(&self, hash: &TxHash) -> Result<Option<SplitDetection>> {
        let session = self
            .inner
            .session(hash)
            .ok_or_else(|| Error::NotFound(format!("transação {} não rastreada", hash)))?;

        let record = session.record.read();
        let origin = &record.root_transaction.to;
        let detection = record
            .config
            .split_detector()
            .detect(origin, record.graph.outgoing_edges(origin), self.inner.clock.now());
        detection
    }

    /// Número de sessões em rastreamento
    pub fn active_session_count(&self) -> usize {
        self.inner.active_session_count()
    }

    /// Assina o fluxo de eventos
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    /// Registra um destino de alertas
    pub fn add_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        self.inner.events.add_sink(sink);
    }

    /// Passa a monitorar uma carteira; `false` se ela já era monitorada
    /// (nome e moeda são atualizados, o histórico é mantido).
    pub fn add_wallet(&self, address: Address, name: Option<&str>, currency: &str) -> Result<bool> {
        self.inner.wallets.add(address, name, currency, self.inner.clock.now())
    }

    /// Deixa de monitorar uma carteira
    pub fn remove_wallet(&self, address: &Address) -> bool {
        let removed = self.inner.wallets.remove(address);
        if removed {
            tracing::info!(wallet = %address, "carteira removida do monitoramento");
        }
        removed
    }

    pub fn get_wallet(&self, address: &Address) -> Option<WatchedWallet> {
        self.inner.wallets.get(address)
    }

    /// Carteiras monitoradas, na ordem em que foram adicionadas
    pub fn monitored_wallets(&self) -> Vec<WatchedWallet> {
        self.inner.wallets.list()
    }

    /// Verifica imediatamente todas as carteiras monitoradas
    pub async fn check_wallets(&self) {
        self.inner.check_wallets().await;
    }

    /// Cancela todas as sessões e o agendador e aguarda o término das tarefas
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let sessions: Vec<Arc<Session>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let now = self.inner.clock.now();
        let mut handles = Vec::new();
        for session in sessions {
            {
                let mut record = session.record.write();
                if record.is_tracking() {
                    record.status = TrackingStatus::Stopped;
                    record.last_updated_at = now;
                }
            }
            session.cancel.cancel();
            session.release_slot();
            if let Some(handle) = session.take_handle() {
                handles.push(handle);
            }
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "tarefa de rastreamento terminou com erro");
            }
        }
        tracing::info!("rastreador desligado");
    }
}

impl TrackerInner {
    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    fn session(&self, hash: &TxHash) -> Option<Arc<Session>> {
        self.sessions.get(hash).map(|entry| entry.value().clone())
    }

    fn active_session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().record.read().is_tracking())
            .count()
    }

    /// Cria a sessão de um hash e agenda sua tarefa de consulta.
    /// O registro retornado é anterior a qualquer ciclo.
    pub(crate) async fn start_session(
        self: &Arc<Self>,
        hash: TxHash,
        config: Arc<TrackerConfig>,
    ) -> Result<TrackingRecord> {
        if let Some(existing) = self.session(&hash) {
            return Ok(existing.snapshot());
        }

        if self.shutdown.is_cancelled() {
            return Err(Error::Other("rastreador desligado".to_string()));
        }

        // vaga reservada antes da consulta; devolvida ao sair por qualquer erro
        let slot = self.slots.clone().try_acquire_owned().map_err(|_| {
            Error::CapacityExceeded(format!(
                "{} sessões ativas (limite {})",
                self.active_session_count(),
                self.config.max_concurrent_sessions
            ))
        })?;

        let root = self.fetch_details(&hash, &config).await?;
        if root.hash != hash {
            return Err(Error::DataSource(format!(
                "fonte de dados retornou {} para {}",
                root.hash, hash
            )));
        }

        let graph = FlowGraph::with_root(&root)?;
        let started_at = self.clock.now();
        let record = TrackingRecord::new(root.clone(), graph, config, started_at);
        let snapshot = record.clone();
        let session = Arc::new(Session::new(record, self.shutdown.child_token(), slot));

        match self.sessions.entry(hash.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                return Ok(entry.get().snapshot());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(session.clone());
            }
        }

        tracing::info!(
            tx_hash = %hash,
            from = %root.from,
            to = %root.to,
            amount = root.amount,
            "rastreamento iniciado"
        );
        self.events.emit(TrackerEvent::TransactionTracked {
            tx_hash: hash.clone(),
            transaction: root,
            started_at,
        });

        let handle = tokio::spawn(run_session(self.clone(), session.clone(), hash));
        session.attach(handle);

        Ok(snapshot)
    }

    /// Um ciclo de verificação das carteiras monitoradas
    pub(crate) async fn check_wallets(&self) {
        let addresses = self.wallets.addresses();
        if addresses.is_empty() || self.shutdown.is_cancelled() {
            return;
        }

        let timeout = self.config.fetch_timeout();
        let results = join_all(
            addresses
                .into_iter()
                .map(|address| self.fetch_recent(address, timeout)),
        )
        .await;

        let now = self.clock.now();
        let mut outcome = WatchOutcome::default();
        for (address, result) in results {
            match result {
                Ok(transactions) => outcome.merge(self.wallets.apply(&address, transactions, &self.config, now)),
                Err(e) => {
                    tracing::warn!(wallet = %address, error = %e, "falha ao verificar carteira");
                    outcome.events.push(TrackerEvent::Error {
                        tx_hash: None,
                        address: Some(address),
                        message: e.to_string(),
                    });
                }
            }
        }

        for event in outcome.events {
            self.events.emit(event);
        }
        for alert in &outcome.alerts {
            if !self.events.dispatch_until_cancelled(alert, &self.shutdown).await {
                return;
            }
        }
        for (hash, wallet) in outcome.auto_track {
            let command = ScheduleCommand::WalletTrack {
                hash,
                wallet,
                config: self.config.clone(),
            };
            if self.commands.send(command).is_err() {
                tracing::debug!("agendador encerrado, rastreamento automático ignorado");
            }
        }
    }

    /// Transações recentes de um endereço, limitadas pelo timeout de consulta
    async fn fetch_recent(&self, address: Address, timeout: std::time::Duration) -> (Address, Result<Vec<Transaction>>) {
        let result = match tokio::time::timeout(timeout, self.source.get_recent_transactions(&address)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "transações de {} não obtidas em {:?}",
                address, timeout
            ))),
        };
        (address, result)
    }

    async fn fetch_details(&self, hash: &TxHash, config: &TrackerConfig) -> Result<Transaction> {
        let timeout = config.fetch_timeout();
        match tokio::time::timeout(timeout, self.source.get_transaction_details(hash)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "detalhes de {} não obtidos em {:?}",
                hash, timeout
            ))),
        }
    }

    /// Um ciclo de consulta da fronteira de uma sessão
    pub(crate) async fn tick(&self, hash: &TxHash, session: &Session) -> TickOutcome {
        let frontier = {
            let mut record = session.record.write();
            if !record.is_tracking() {
                return TickOutcome::Finished;
            }

            let frontier = if record.depth_budget_remaining == 0 {
                None
            } else {
                Some(record.frontier())
            };

            let reason = match &frontier {
                None => Some(CompletionReason::DepthExhausted),
                Some(addresses) if addresses.is_empty() => Some(CompletionReason::FrontierExhausted),
                Some(_) => None,
            };

            if let Some(reason) = reason {
                let event = self.complete(&mut record, reason);
                drop(record);
                session.cancel.cancel();
                session.release_slot();
                self.events.emit(event);
                return TickOutcome::Finished;
            }

            frontier.unwrap_or_default()
        };

        tracing::debug!(tx_hash = %hash, addresses = frontier.len(), "consultando fronteira");

        let timeout = session.config.fetch_timeout();
        let results = join_all(
            frontier
                .into_iter()
                .map(|address| self.fetch_recent(address, timeout)),
        )
        .await;

        if session.cancel.is_cancelled() {
            tracing::debug!(tx_hash = %hash, "ciclo descartado após cancelamento");
            return TickOutcome::Finished;
        }

        let now = self.clock.now();
        let mut events = Vec::new();
        let mut alerts = Vec::new();
        let mut auto_track = Vec::new();

        {
            let mut record = session.record.write();
            if !record.is_tracking() || session.cancel.is_cancelled() {
                return TickOutcome::Finished;
            }

            let mut accepted: Vec<Transaction> = Vec::new();
            for (address, result) in results {
                match result {
                    Ok(transactions) => {
                        record.polled_addresses.insert(address.clone());
                        for tx in transactions {
                            if !accepts(&record, &accepted, &address, &tx) {
                                continue;
                            }
                            if let Err(e) = tx.validate() {
                                tracing::warn!(tx_hash = %hash, address = %address, error = %e, "transação ignorada");
                                events.push(TrackerEvent::Error {
                                    tx_hash: Some(hash.clone()),
                                    address: Some(address.clone()),
                                    message: e.to_string(),
                                });
                                continue;
                            }
                            accepted.push(tx);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(tx_hash = %hash, address = %address, error = %e, "falha ao consultar endereço");
                        events.push(TrackerEvent::Error {
                            tx_hash: Some(hash.clone()),
                            address: Some(address),
                            message: e.to_string(),
                        });
                    }
                }
            }

            if !accepted.is_empty() {
                let merged = record.graph.merge_transactions(&accepted);
                match merged {
                    Ok(added) => {
                        let split_origin = record.root_transaction.to.clone();
                        let origin_changed = added.iter().any(|edge| edge.source == split_origin);

                        record.subsequent_transactions.extend(accepted.iter().cloned());
                        self.spend_depth_budget(&mut record);

                        if record.config.track_split_transactions && origin_changed {
                            self.evaluate_split(hash, &mut record, &split_origin, now, &mut events, &mut alerts);
                        }

                        let detector = record.config.large_transfer_detector();
                        for tx in detector.detect(&accepted) {
                            tracing::info!(tx_hash = %hash, large_tx = %tx.hash, amount = tx.amount, "transferência grande detectada");
                            events.push(TrackerEvent::LargeTransferDetected {
                                tx_hash: hash.clone(),
                                transaction: tx.clone(),
                            });
                            alerts.push(Alert::new(
                                hash.clone(),
                                AlertKind::LargeTransfer { transaction: tx.clone() },
                                now,
                            ));
                            if record.config.auto_track_large_transactions {
                                auto_track.push(tx.hash.clone());
                            }
                        }
                    }
                    Err(e) => {
                        events.push(TrackerEvent::Error {
                            tx_hash: Some(hash.clone()),
                            address: None,
                            message: e.to_string(),
                        });
                    }
                }
            }

            record.last_updated_at = now;
            tracing::debug!(
                tx_hash = %hash,
                nodes = record.graph.node_count(),
                edges = record.graph.edge_count(),
                budget = record.depth_budget_remaining,
                "ciclo concluído"
            );
        }

        for event in events {
            self.events.emit(event);
        }
        for alert in &alerts {
            // os sinks podem demorar; uma parada durante a entrega descarta o restante
            if !self.events.dispatch_until_cancelled(alert, &session.cancel).await {
                tracing::debug!(tx_hash = %hash, "alertas descartados após cancelamento");
                return TickOutcome::Finished;
            }
        }
        if session.cancel.is_cancelled() {
            tracing::debug!(tx_hash = %hash, "rastreamento automático descartado após cancelamento");
            return TickOutcome::Finished;
        }
        for child in auto_track {
            let command = ScheduleCommand::AutoTrack {
                hash: child,
                parent: hash.clone(),
                config: session.config.clone(),
            };
            if self.commands.send(command).is_err() {
                tracing::debug!(tx_hash = %hash, "agendador encerrado, rastreamento automático ignorado");
            }
        }

        TickOutcome::Continue
    }

    /// Desconta do orçamento os novos níveis BFS descobertos
    fn spend_depth_budget(&self, record: &mut TrackingRecord) {
        let deepest = record.graph.max_level().unwrap_or(0);
        if deepest > record.explored_depth {
            let discovered = deepest - record.explored_depth;
            record.depth_budget_remaining = record.depth_budget_remaining.saturating_sub(discovered);
            record.explored_depth = deepest;
        }
    }

    fn evaluate_split(
        &self,
        hash: &TxHash,
        record: &mut TrackingRecord,
        origin: &Address,
        now: chrono::DateTime<chrono::Utc>,
        events: &mut Vec<TrackerEvent>,
        alerts: &mut Vec<Alert>,
    ) {
        let detector = record.config.split_detector();
        let detection = match detector.detect(origin, record.graph.outgoing_edges(origin), now) {
            Ok(Some(detection)) => detection,
            Ok(None) => return,
            Err(e) => {
                events.push(TrackerEvent::Error {
                    tx_hash: Some(hash.clone()),
                    address: Some(origin.clone()),
                    message: e.to_string(),
                });
                return;
            }
        };

        // mesma detecção já reportada
        if record.last_reported_split.as_ref() == Some(&detection.contributing_transaction_hashes) {
            return;
        }
        record.last_reported_split = Some(detection.contributing_transaction_hashes.clone());

        tracing::info!(
            tx_hash = %hash,
            origin = %origin,
            receivers = detection.unique_receiver_count,
            total = detection.total_amount,
            "dispersão de fundos detectada"
        );
        events.push(TrackerEvent::FundsSplitDetected {
            tx_hash: hash.clone(),
            detection: detection.clone(),
        });
        alerts.push(Alert::new(hash.clone(), AlertKind::SplitPattern { detection }, now));
    }

    fn complete(&self, record: &mut TrackingRecord, reason: CompletionReason) -> TrackerEvent {
        record.status = TrackingStatus::Completed;
        record.last_updated_at = self.clock.now();

        tracing::info!(
            tx_hash = %record.root_hash,
            reason = ?reason,
            nodes = record.graph.node_count(),
            edges = record.graph.edge_count(),
            "rastreamento concluído"
        );

        TrackerEvent::TrackingComplete {
            tx_hash: record.root_hash.clone(),
            reason,
            node_count: record.graph.node_count(),
            edge_count: record.graph.edge_count(),
            transaction_count: record.transaction_count(),
        }
    }
}

/// Aceita apenas transações novas, posteriores ao início e enviadas pelo endereço consultado
fn accepts(record: &TrackingRecord, accepted: &[Transaction], address: &Address, tx: &Transaction) -> bool {
    &tx.from == address
        && tx.timestamp > record.started_at
        && !record.graph.contains_transaction(&tx.hash)
        && !accepted.iter().any(|a| a.hash == tx.hash)
}
