use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payrecon::application::engine::{Outcome, ReconciliationEngine};
use payrecon::application::signature::SignatureVerifier;
use payrecon::application::webhook::{Dispatch, WebhookDispatcher};
use payrecon::config::{DEFAULT_MAX_ATTEMPTS, EngineConfig, GatewayConfig};
use payrecon::domain::ports::{OrderStoreRef, ProcessedEventStoreRef, RemoteOrderGatewayRef};
use payrecon::error::PaymentError;
use payrecon::infrastructure::gateway::{OfflineGateway, UnreachableGateway};
use payrecon::infrastructure::in_memory::{InMemoryEventStore, InMemoryOrderStore};
use payrecon::interfaces::csv::order_reader::OrderReader;
use payrecon::interfaces::csv::order_writer::OrderWriter;
use payrecon::interfaces::jsonl::{InboundMessage, MessageReader};
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GatewayArgs {
    /// Processor key id
    #[arg(long, global = true, env = "PAYRECON_KEY_ID", default_value = "test_key")]
    key_id: String,

    /// Secret used to sign client payment confirmations
    #[arg(long, global = true, env = "PAYRECON_KEY_SECRET", hide_env_values = true)]
    key_secret: Option<String>,

    /// Secret used to sign webhook bodies. Defaults to the key secret.
    #[arg(long, global = true, env = "PAYRECON_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the signature the processor would attach to a payment confirmation
    Sign {
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        order_id: String,
    },
    /// Print the signature of a raw webhook body
    SignWebhook {
        /// File holding the body exactly as it will be sent
        body: PathBuf,
    },
    /// Open orders from CSV, replay inbound messages, print the final orders as CSV
    Replay {
        /// Orders CSV file
        #[arg(long)]
        orders: PathBuf,

        /// JSON-lines file of confirmations, webhooks and operator actions
        #[arg(long)]
        messages: Option<PathBuf>,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Compare-and-set attempts per request
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Deadline for each request, in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Substitute a local order reference when remote order creation fails
        #[arg(long)]
        degraded_mode: bool,

        /// Behave as if the processor cannot be reached when creating orders
        #[arg(long)]
        gateway_unreachable: bool,
    },
}

impl GatewayArgs {
    fn into_config(self) -> Result<GatewayConfig> {
        let key_secret = self.key_secret.ok_or_else(|| {
            miette::miette!("a key secret is required (--key-secret or PAYRECON_KEY_SECRET)")
        })?;
        let config = GatewayConfig::new(self.key_id, key_secret);
        Ok(match self.webhook_secret {
            Some(secret) => config.with_webhook_secret(secret),
            None => config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("payrecon=info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let gateway = cli.gateway.into_config()?;

    match cli.command {
        Command::Sign {
            payment_id,
            order_id,
        } => {
            let signature = SignatureVerifier::new(gateway.key_secret)
                .sign_payment(&payment_id, &order_id)
                .into_diagnostic()?;
            println!("{signature}");
        }
        Command::SignWebhook { body } => {
            let bytes = std::fs::read(body).into_diagnostic()?;
            println!("{}", SignatureVerifier::new(gateway.webhook_secret).sign(&bytes));
        }
        Command::Replay {
            orders,
            messages,
            db_path,
            max_attempts,
            deadline_ms,
            degraded_mode,
            gateway_unreachable,
        } => {
            let config = EngineConfig {
                max_attempts,
                deadline: deadline_ms.map(Duration::from_millis),
                degraded_mode,
            };
            let (order_store, event_store) = open_stores(db_path)?;
            let remote: RemoteOrderGatewayRef = if gateway_unreachable {
                Arc::new(UnreachableGateway)
            } else {
                Arc::new(OfflineGateway)
            };
            let engine = Arc::new(ReconciliationEngine::new(
                order_store,
                remote,
                &gateway,
                config,
            ));
            let dispatcher = WebhookDispatcher::new(engine.clone(), event_store);
            replay(&engine, &dispatcher, orders, messages).await?;
        }
    }

    Ok(())
}

fn in_memory_stores() -> (OrderStoreRef, ProcessedEventStoreRef) {
    (
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryEventStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreRef, ProcessedEventStoreRef)> {
    use payrecon::infrastructure::rocksdb::RocksDbStore;

    match db_path {
        Some(path) => {
            let store = RocksDbStore::open(path).into_diagnostic()?;
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreRef, ProcessedEventStoreRef)> {
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

async fn replay(
    engine: &ReconciliationEngine,
    dispatcher: &WebhookDispatcher,
    orders: PathBuf,
    messages: Option<PathBuf>,
) -> Result<()> {
    let file = File::open(orders).into_diagnostic()?;
    for (n, request) in OrderReader::new(file).orders().enumerate() {
        let result = match request {
            Ok(request) => engine.open_order(request).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if e.is_fatal() {
                return Err(e).into_diagnostic();
            }
            eprintln!("order {}: rejected ({}): {}", n + 1, e.kind(), e);
        }
    }

    if let Some(messages) = messages {
        let file = File::open(messages).into_diagnostic()?;
        for (n, message) in MessageReader::new(BufReader::new(file))
            .messages()
            .enumerate()
        {
            let result = match message {
                Ok(message) => handle(engine, dispatcher, message).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(label) => eprintln!("message {}: {}", n + 1, label),
                Err(e) if e.is_fatal() => return Err(e).into_diagnostic(),
                Err(e) => eprintln!("message {}: rejected ({}): {}", n + 1, e.kind(), e),
            }
        }
    }

    let orders = engine.orders().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders).into_diagnostic()?;
    Ok(())
}

async fn handle(
    engine: &ReconciliationEngine,
    dispatcher: &WebhookDispatcher,
    message: InboundMessage,
) -> payrecon::error::Result<String> {
    let outcome = match message {
        InboundMessage::Confirm(confirmation) => {
            engine
                .confirm_client_payment(
                    &confirmation.order_id,
                    &confirmation.payment_id,
                    &confirmation.signature,
                    Some(&confirmation.customer),
                )
                .await?
        }
        InboundMessage::Webhook(webhook) => match dispatcher.dispatch(&webhook.into()).await? {
            Dispatch::Processed(outcome) => outcome,
            Dispatch::Duplicate { event_id } => return Ok(format!("Duplicate ({event_id})")),
        },
        InboundMessage::Refund { order_id, partial } => {
            let order = engine
                .order_by_ref(&order_id)
                .await?
                .ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))?;
            engine.refund(order.internal_id, partial).await?
        }
        InboundMessage::Transition { order_id, status } => {
            let order = engine
                .order_by_ref(&order_id)
                .await?
                .ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))?;
            engine.transition(order.internal_id, status).await?
        }
    };
    Ok(describe(&outcome))
}

fn describe(outcome: &Outcome) -> String {
    match outcome.order() {
        Some(order) => format!(
            "{} {} -> {} (v{})",
            outcome.label(),
            order.external_order_ref,
            order.status,
            order.version
        ),
        None => outcome.label().to_string(),
    }
}
