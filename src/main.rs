use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde_json::json;

use list_chains::autorespond::Autoresponder;
use list_chains::chains::Dispatcher;
use list_chains::config::ChainConfig;
use list_chains::delivery::{LogNotifier, Notifier, SmtpConfig, SmtpNotifier};
use list_chains::list::MailingList;
use list_chains::message::{Message, MessageData};
use list_chains::rules::RuleRegistry;
use list_chains::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ChainConfig::from_env().context("Invalid chain configuration")?;

    let Ok(list_config) = std::env::var("LIST_CONFIG") else {
        bail!("LIST_CONFIG not set (path to the list settings JSON)");
    };
    let mlist = MailingList::from_json_file(&list_config)
        .with_context(|| format!("Failed to load list settings from {list_config}"))?;

    // ── Message ──────────────────────────────────────────────────────────
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read(&path).with_context(|| format!("Failed to read {path}"))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read message from stdin")?;
            buf
        }
    };
    let mut msg = Message::parse(&raw).context("Failed to parse message")?;
    let mut msgdata = MessageData::from_env();

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("LIST_DB_PATH").unwrap_or_else(|_| "./data/list-chains.db".to_string());
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(Path::new(&db_path))
            .await
            .with_context(|| format!("Failed to open database at {db_path}"))?,
    );

    // ── Chains ───────────────────────────────────────────────────────────
    let registry = Arc::new(RuleRegistry::with_builtin());
    let dispatcher = Dispatcher::builtin(registry, Arc::clone(&store), &config)?;
    let outcome = dispatcher
        .process(&mlist, &mut msg, &mut msgdata, &config.start_chain)
        .await
        .context("Chain processing failed")?;

    // ── Autoresponse ─────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match SmtpConfig::from_env() {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp)),
        None => Arc::new(LogNotifier),
    };
    let responder = Autoresponder::new(store, notifier);
    let decision = responder
        .process(&mlist, &msg, &msgdata)
        .await
        .context("Autoresponder failed")?;

    let report = json!({
        "list": mlist.list_id(),
        "walk": outcome,
        "autoresponse": decision,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
