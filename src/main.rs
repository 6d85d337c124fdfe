use clap::Parser;
use fundipay::application::engine::PaymentEngine;
use fundipay::application::ledger::LedgerService;
use fundipay::application::reconciler::{Reconciler, ReconcilerConfig};
use fundipay::domain::ports::{
    GatewayStatus, IdempotencyStoreRef, PaymentGatewayRef, PaymentRequestStoreRef,
    TransactionStoreRef, WalletStoreRef,
};
use fundipay::error::PaymentError;
use fundipay::infrastructure::in_memory::{
    InMemoryIdempotencyStore, InMemoryPaymentRequestStore, InMemoryTransactionStore,
    InMemoryWalletStore,
};
use fundipay::infrastructure::sandbox::SandboxGateway;
use fundipay::interfaces::csv::wallet_writer::WalletWriter;
use fundipay::interfaces::replay::{EventReader, ReplayEvent, ResolvedStatus};
use fundipay::interfaces::webhook::WebhookReceiver;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input wallet events file (JSON lines)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

type Stores = (
    WalletStoreRef,
    TransactionStoreRef,
    PaymentRequestStoreRef,
    IdempotencyStoreRef,
);

fn in_memory_stores() -> Stores {
    (
        Arc::new(InMemoryWalletStore::new()),
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryPaymentRequestStore::new()),
        Arc::new(InMemoryIdempotencyStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_stores(path: &Path) -> Result<Stores> {
    let store = fundipay::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
    Ok((
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store),
    ))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_stores(_path: &Path) -> Result<Stores> {
    miette::bail!("this binary was built without the storage-rocksdb feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let (wallets, transactions, requests, idempotency) = match &cli.db_path {
        Some(path) => persistent_stores(path)?,
        None => in_memory_stores(),
    };

    let gateway = Arc::new(SandboxGateway::new());
    let ledger = Arc::new(LedgerService::new(wallets, transactions));
    let engine = Arc::new(PaymentEngine::new(
        ledger.clone(),
        requests.clone(),
        idempotency,
        gateway.clone() as PaymentGatewayRef,
    ));
    let receiver = WebhookReceiver::new(engine.clone());
    // On-demand sweeps check everything that is still unresolved.
    let reconciler = Reconciler::new(
        engine.clone(),
        requests,
        gateway.clone() as PaymentGatewayRef,
        ReconcilerConfig {
            check_interval: Duration::ZERO,
            ..ReconcilerConfig::default()
        },
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for event in reader.events() {
        match event {
            Ok(event) => {
                if let Err(e) = apply_event(event, &engine, &receiver, &reconciler, &gateway).await
                {
                    eprintln!("Error processing event: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading event: {e}");
            }
        }
    }

    let wallets = ledger.wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(wallets).into_diagnostic()?;

    Ok(())
}

async fn apply_event(
    event: ReplayEvent,
    engine: &Arc<PaymentEngine>,
    receiver: &WebhookReceiver,
    reconciler: &Reconciler,
    gateway: &Arc<SandboxGateway>,
) -> std::result::Result<(), PaymentError> {
    match event {
        ReplayEvent::Initiate {
            owner,
            amount,
            phone,
        } => {
            engine.initiate_payment(owner, amount, &phone).await?;
        }
        ReplayEvent::Callback { payload } => {
            let raw = serde_json::to_vec(&payload)?;
            receiver.handle(&raw).await?;
        }
        ReplayEvent::Debit {
            owner,
            amount,
            kind,
        } => {
            engine
                .ledger()
                .append(owner, -amount.minor_units(), kind, None)
                .await?;
        }
        ReplayEvent::Resolve {
            reference,
            status,
            amount,
            reason,
        } => {
            let status = match status {
                ResolvedStatus::Success => {
                    let amount = amount.ok_or_else(|| {
                        PaymentError::ValidationError(
                            "resolve with status success requires an amount".to_string(),
                        )
                    })?;
                    GatewayStatus::Succeeded { amount }
                }
                ResolvedStatus::Failed => GatewayStatus::Failed {
                    reason: reason.unwrap_or_else(|| "gateway reported failure".to_string()),
                },
                ResolvedStatus::Unknown => {
                    gateway.forget(&reference).await;
                    return Ok(());
                }
            };
            gateway.resolve(&reference, status).await;
        }
        ReplayEvent::Reconcile => {
            reconciler.reconcile_pending().await?;
        }
    }
    Ok(())
}
