use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use transit_ticketing::config::ServiceConfig;
use transit_ticketing::domain::messages::{CheckEvent, FulfillmentRequest};
use transit_ticketing::domain::ports::{TicketStoreRef, WalletLedgerRef, WorkQueueRef};
use transit_ticketing::infrastructure::fare_table::FareTable;
use transit_ticketing::infrastructure::gateway::SandboxGateway;
use transit_ticketing::infrastructure::in_memory::{
    InMemoryStatusCache, InMemoryTicketStore, InMemoryWalletLedger, InMemoryWorkQueue,
};
use transit_ticketing::runtime::{Ports, Runtime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Stop catalogue CSV (route_id, name, order, fare)
    #[arg(long, env = "TRANSIT_STOPS")]
    stops: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "TRANSIT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Address the HTTP server listens on
    #[arg(long, env = "TRANSIT_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Externally reachable base URL used in payment callback URLs
    #[arg(long, env = "TRANSIT_PUBLIC_BASE_URL", default_value = "http://localhost:8080")]
    public_base_url: String,

    /// Checkout URL base of the sandbox payment gateway
    #[arg(
        long,
        env = "TRANSIT_GATEWAY_BASE_URL",
        default_value = "https://sandbox.gateway.local"
    )]
    gateway_base_url: String,

    /// Consumers per queue
    #[arg(long, env = "TRANSIT_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Seconds a purchase status stays pollable
    #[arg(long, env = "TRANSIT_STATUS_TTL_SECS", default_value_t = 3600)]
    status_ttl_secs: u64,

    /// Deliveries of a queued message before it is dead-lettered
    #[arg(long, env = "TRANSIT_MAX_DELIVERY_ATTEMPTS", default_value_t = 5)]
    max_delivery_attempts: u32,

    /// Most tickets a single purchase may request
    #[arg(long, env = "TRANSIT_MAX_TICKETS_PER_PURCHASE", default_value_t = 10)]
    max_tickets_per_purchase: u32,

    /// Load the configuration and storage, then exit without serving
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            status_ttl: Duration::from_secs(self.status_ttl_secs),
            max_delivery_attempts: self.max_delivery_attempts,
            workers: self.workers,
            max_tickets_per_purchase: self.max_tickets_per_purchase,
            ..ServiceConfig::new(&self.public_base_url)
        }
    }
}

struct Storage {
    tickets: TicketStoreRef,
    ledger: WalletLedgerRef,
    fulfillment_queue: WorkQueueRef<FulfillmentRequest>,
    check_queue: WorkQueueRef<CheckEvent>,
    persistent: bool,
}

fn in_memory_storage() -> Storage {
    Storage {
        tickets: Arc::new(InMemoryTicketStore::new()),
        ledger: Arc::new(InMemoryWalletLedger::new()),
        fulfillment_queue: Arc::new(InMemoryWorkQueue::new()),
        check_queue: Arc::new(InMemoryWorkQueue::new()),
        persistent: false,
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<&PathBuf>) -> Result<Storage> {
    use transit_ticketing::domain::messages::{TICKET_CHECK_QUEUE, TICKET_QUEUE};
    use transit_ticketing::infrastructure::rocksdb::RocksDBStore;

    let Some(db_path) = db_path else {
        return Ok(in_memory_storage());
    };
    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Storage {
        fulfillment_queue: Arc::new(store.work_queue(TICKET_QUEUE).into_diagnostic()?),
        check_queue: Arc::new(store.work_queue(TICKET_CHECK_QUEUE).into_diagnostic()?),
        tickets: Arc::new(store.clone()),
        ledger: Arc::new(store),
        persistent: true,
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<&PathBuf>) -> Result<Storage> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.service_config();

    let file = File::open(&cli.stops).into_diagnostic()?;
    let fares = Arc::new(FareTable::from_csv(file).into_diagnostic()?);
    let storage = open_storage(cli.db_path.as_ref())?;
    tracing::info!(
        routes = fares.route_count(),
        persistent = storage.persistent,
        workers = config.workers,
        "Configuration loaded"
    );

    if cli.check_config {
        return Ok(());
    }

    let statuses = Arc::new(InMemoryStatusCache::new(config.status_ttl));
    let ports = Ports {
        tickets: storage.tickets,
        ledger: storage.ledger,
        statuses: statuses.clone(),
        gateway: Arc::new(SandboxGateway::new(&cli.gateway_base_url)),
        fares: fares.clone(),
        stops: fares,
        fulfillment_queue: storage.fulfillment_queue,
        check_queue: storage.check_queue,
    };
    let runtime = Runtime::new(ports, config.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = runtime.spawn_workers(shutdown_rx.clone());
    workers.push(tokio::spawn(purge_statuses(
        statuses,
        config.status_ttl,
        shutdown_rx,
    )));

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(address = %cli.bind, "Listening");
    axum::serve(listener, runtime.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("Draining workers");
    shutdown_tx.send(true).ok();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
    Ok(())
}

async fn purge_statuses(
    statuses: Arc<InMemoryStatusCache>,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(ttl.clamp(Duration::from_secs(1), Duration::from_secs(60)));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let purged = statuses.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Expired statuses purged");
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
