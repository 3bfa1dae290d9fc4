/*!
 * Ethernity FlowTrack - Scheduler
 *
 * Uma tarefa Tokio por sessão de rastreamento, uma tarefa agendadora que
 * inicia as sessões automáticas pedidas pelos ciclos e uma tarefa que
 * verifica periodicamente as carteiras monitoradas
 */

use ethernity_core::{Address, TxHash};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;
use crate::events::TrackerEvent;
use crate::record::TrackingRecord;
use crate::tracker::TrackerInner;

/// Comandos aceitos pela tarefa agendadora
#[derive(Debug, Clone)]
pub(crate) enum ScheduleCommand {
    /// Inicia uma sessão independente para uma transação grande encontrada no fluxo
    AutoTrack {
        hash: TxHash,
        parent: TxHash,
        config: Arc<TrackerConfig>,
    },
    /// Inicia uma sessão para uma transação grande de carteira monitorada
    WalletTrack {
        hash: TxHash,
        wallet: Address,
        config: Arc<TrackerConfig>,
    },
}

/// Resultado de um ciclo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    Finished,
}

/// Sessão ativa: registro compartilhado, token de cancelamento e tarefa de consulta.
/// Ocupa uma vaga do limite de sessões enquanto estiver em `Tracking`.
pub(crate) struct Session {
    pub(crate) record: Arc<RwLock<TrackingRecord>>,
    pub(crate) config: Arc<TrackerConfig>,
    pub(crate) cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    slot: Mutex<Option<OwnedSemaphorePermit>>,
}

impl Session {
    pub(crate) fn new(record: TrackingRecord, cancel: CancellationToken, slot: OwnedSemaphorePermit) -> Self {
        let config = record.config.clone();
        Self {
            record: Arc::new(RwLock::new(record)),
            config,
            cancel,
            handle: Mutex::new(None),
            slot: Mutex::new(Some(slot)),
        }
    }

    /// Devolve a vaga da sessão; chamado quando o registro sai de `Tracking`
    pub(crate) fn release_slot(&self) {
        self.slot.lock().take();
    }

    pub(crate) fn snapshot(&self) -> TrackingRecord {
        self.record.read().clone()
    }

    pub(crate) fn attach(&self, handle: JoinHandle<()>) {
        *self.handle.lock() = Some(handle);
    }

    pub(crate) fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().take()
    }
}

/// Laço de uma sessão. O cancelamento tem prioridade sobre a espera e é
/// verificado novamente antes de cada ciclo.
pub(crate) async fn run_session(inner: Arc<TrackerInner>, session: Arc<Session>, hash: TxHash) {
    let interval = session.config.polling_interval();
    let mut skip_wait = session.config.poll_immediately;

    loop {
        if !skip_wait {
            tokio::select! {
                biased;
                _ = session.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        skip_wait = false;

        if session.cancel.is_cancelled() {
            break;
        }

        if inner.tick(&hash, &session).await == TickOutcome::Finished {
            break;
        }
    }

    tracing::debug!(tx_hash = %hash, "sessão de rastreamento encerrada");
}

/// Laço da tarefa agendadora. Mantém apenas uma referência fraca ao
/// rastreador e termina quando ele é descartado ou desligado.
pub(crate) async fn run_scheduler(
    inner: Weak<TrackerInner>,
    mut commands: mpsc::UnboundedReceiver<ScheduleCommand>,
    shutdown: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        let (hash, config) = match command {
            ScheduleCommand::AutoTrack { hash, parent, config } => {
                tracing::info!(tx_hash = %hash, parent = %parent, "rastreamento automático de transação grande");
                (hash, config)
            }
            ScheduleCommand::WalletTrack { hash, wallet, config } => {
                tracing::info!(tx_hash = %hash, wallet = %wallet, "rastreamento automático a partir de carteira monitorada");
                (hash, config)
            }
        };

        if let Err(e) = inner.start_session(hash.clone(), config).await {
            tracing::warn!(tx_hash = %hash, error = %e, "falha no rastreamento automático");
            inner.events().emit(TrackerEvent::Error {
                tx_hash: Some(hash),
                address: None,
                message: e.to_string(),
            });
        }
    }

    tracing::debug!("agendador encerrado");
}

/// Laço de verificação das carteiras monitoradas
pub(crate) async fn run_wallet_watch(inner: Weak<TrackerInner>, interval: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.check_wallets().await;
    }

    tracing::debug!("monitoramento de carteiras encerrado");
}
