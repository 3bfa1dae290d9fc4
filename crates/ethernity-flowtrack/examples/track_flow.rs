use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ethernity_alerts::{LogAlertSink, MemoryAlertSink};
use ethernity_core::{traits::ChainDataSource, Address, Direction, Transaction, TxHash};
use ethernity_flowtrack::{TrackerConfig, TrackerEvent, TransactionTracker};
use ethernity_indexer::{FixtureDataSource, IndexerClient, IndexerConfig};
use tracing_subscriber::EnvFilter;

fn transfer(hash: &str, from: &str, to: &str, amount: f64) -> Transaction {
    Transaction {
        hash: TxHash::from(hash),
        from: Address::from(from),
        to: Address::from(to),
        amount,
        currency: "USDT".to_string(),
        timestamp: Utc::now(),
        direction: Direction::Out,
        confirmations: 1,
        fee: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Uso: track_flow [<INDEXER_URL> <TX_HASH>]; sem argumentos roda a demonstração em memória
    let args: Vec<String> = env::args().collect();
    let fixture = Arc::new(FixtureDataSource::new());
    let (source, root): (Arc<dyn ChainDataSource>, TxHash) = if args.len() >= 3 {
        let client = IndexerClient::new(IndexerConfig::new(args[1].clone()))?;
        (Arc::new(client) as Arc<dyn ChainDataSource>, TxHash::from(args[2].as_str()))
    } else {
        fixture.insert(transfer("0xroot", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "bc1qmixer", 900_000.0));
        (fixture.clone() as Arc<dyn ChainDataSource>, TxHash::from("0xroot"))
    };

    let config = TrackerConfig::builder()
        .polling_interval(Duration::from_secs(2))
        .poll_immediately(false)
        .wallet_poll_interval(Duration::from_secs(3))
        .build()?;
    let tracker = TransactionTracker::new(source, config)?;

    let memory = Arc::new(MemoryAlertSink::default());
    tracker.add_alert_sink(memory.clone());
    tracker.add_alert_sink(Arc::new(LogAlertSink));
    let mut events = tracker.subscribe();

    println!("🔍 Rastreando transação {root}...");
    let record = tracker.track_transaction(&root).await?;
    println!(
        "Raiz: {} -> {} ({} {})",
        record.root_transaction.from, record.root_transaction.to, record.root_transaction.amount, record.root_transaction.currency
    );

    if args.len() < 3 {
        tracker.add_wallet(Address::from("bc1qmixer"), Some("mixer"), "USDT")?;

        // movimentações chegando depois do início do rastreamento
        fixture.extend(vec![
            transfer("0xs1", "bc1qmixer", "bc1qmule1", 250_000.0),
            transfer("0xs2", "bc1qmixer", "bc1qmule2", 250_000.0),
            transfer("0xs3", "bc1qmixer", "bc1qmule3", 300_000.0),
            transfer("0xs4", "bc1qmule3", "bc1qexchange", 299_000.0),
        ]);
    }

    loop {
        match tokio::time::timeout(Duration::from_secs(120), events.recv()).await {
            Ok(Ok(TrackerEvent::FundsSplitDetected { detection, .. })) => {
                println!(
                    "⚠️  Dispersão: {} receptores, total {}",
                    detection.unique_receiver_count, detection.total_amount
                );
            }
            Ok(Ok(TrackerEvent::WalletSplitDetected { address, detection })) => {
                println!(
                    "⚠️  Carteira {address} dispersou {} para {} receptores",
                    detection.total_amount, detection.unique_receiver_count
                );
            }
            Ok(Ok(TrackerEvent::TrackingComplete { tx_hash, reason, node_count, edge_count, .. }))
                if tx_hash == root =>
            {
                println!("Rastreamento concluído ({reason:?}): {node_count} nós, {edge_count} arestas");
                break;
            }
            Ok(Ok(TrackerEvent::Error { address, message, .. })) => {
                eprintln!("Erro em {:?}: {}", address, message);
            }
            Ok(Ok(_)) | Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(e)) => {
                eprintln!("Canal de eventos: {e}");
                break;
            }
            Err(_) => {
                println!("Tempo esgotado aguardando o fim do rastreamento");
                break;
            }
        }
    }

    if let Some(graph) = tracker.get_flow_graph(&root) {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    }
    println!("Alertas registrados: {} ({} ativos)", memory.len(), memory.active_count());

    tracker.shutdown().await;
    Ok(())
}
