//! Sync daemon entry point: wires settings, persistence, the ledger gateway,
//! and the mirror node into the reconciliation services.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig as _;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use fitledger::config::SyncSettings;
use fitledger::domain::ports::{LedgerClient, SyncMetrics};
use fitledger::domain::{
    ActivityCacheSync, ActivitySyncConfig, ActivitySyncPorts, ChallengeDefinitionSync,
    ChallengeSyncConfig, LedgerIdentity, LogCache, ReceiptId, ReconcileRequest, ReconcileWorker,
    ReconcileWorkerConfig, UserId,
};
use fitledger::outbound::ledger_gateway::LedgerGatewayClient;
use fitledger::outbound::mirror_node::MirrorNodeLogClient;
use fitledger::outbound::persistence::{
    DbPool, DieselActivityCacheRepository, DieselChallengeDefinitionRepository, PoolConfig,
};

/// `fitledger` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "fitledger",
    about = "Keep the activity cache and log mirror consistent with the ledger",
    version
)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run challenge sync and log refresh loops until interrupted.
    Run,
    /// Mirror every challenge definition once.
    SyncChallenges,
    /// Reconcile one user after a ledger mutation.
    Reconcile {
        /// Local user id (UUID).
        #[arg(long = "user-id", value_name = "uuid")]
        user_id: String,
        /// Ledger account of the user.
        #[arg(long = "ledger-identity", value_name = "account")]
        ledger_identity: String,
        /// Amount submitted by the mutation.
        #[arg(long = "amount", value_name = "amount")]
        amount: u64,
        /// Receipt returned by the mutation.
        #[arg(long = "receipt", value_name = "receipt")]
        receipt: String,
    },
    /// Submit an activity delta to the ledger, then reconcile the user.
    Submit {
        /// Local user id (UUID).
        #[arg(long = "user-id", value_name = "uuid")]
        user_id: String,
        /// Ledger account of the user.
        #[arg(long = "ledger-identity", value_name = "account")]
        ledger_identity: String,
        /// Amount to submit.
        #[arg(long = "amount", value_name = "amount")]
        amount: u64,
    },
    /// Refresh the log mirror once and print its statistics.
    RefreshLog,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = CliArgs::parse();
    // Command-line arguments belong to clap; settings come from env and files.
    let settings = SyncSettings::load_from_iter([OsString::from("fitledger")])
        .map_err(|error| eyre!("load settings: {error}"))?;

    match args.command {
        Command::Run => run_daemon(&settings).await,
        Command::SyncChallenges => sync_challenges_once(&settings).await,
        Command::Reconcile {
            user_id,
            ledger_identity,
            amount,
            receipt,
        } => {
            let request = ReconcileRequest {
                user_id: UserId::new(&user_id).wrap_err("parse --user-id")?,
                ledger_identity: LedgerIdentity::new(ledger_identity)
                    .wrap_err("parse --ledger-identity")?,
                delta_amount: amount,
                receipt: ReceiptId::new(receipt).wrap_err("parse --receipt")?,
            };
            reconcile_once(&settings, request).await
        }
        Command::Submit {
            user_id,
            ledger_identity,
            amount,
        } => {
            let user_id = UserId::new(&user_id).wrap_err("parse --user-id")?;
            let ledger_identity =
                LedgerIdentity::new(ledger_identity).wrap_err("parse --ledger-identity")?;
            submit_once(&settings, user_id, ledger_identity, amount).await
        }
        Command::RefreshLog => refresh_log_once(&settings).await,
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(DefaultClock)
}

#[cfg(feature = "metrics")]
fn sync_metrics() -> Result<Arc<dyn SyncMetrics>> {
    let metrics = fitledger::outbound::metrics::PrometheusSyncMetrics::new(
        prometheus::default_registry(),
    )
    .wrap_err("register sync metrics")?;
    Ok(Arc::new(metrics))
}

#[cfg(not(feature = "metrics"))]
fn sync_metrics() -> Result<Arc<dyn SyncMetrics>> {
    Ok(Arc::new(fitledger::domain::ports::NoOpSyncMetrics))
}

async fn db_pool(settings: &SyncSettings) -> Result<DbPool> {
    let database_url = settings.database_url()?;
    DbPool::new(PoolConfig::new(database_url))
        .await
        .wrap_err("create database pool")
}

fn ledger_client(settings: &SyncSettings) -> Result<Arc<dyn LedgerClient>> {
    let client = LedgerGatewayClient::new(settings.ledger_gateway_url()?, settings.request_timeout())
        .wrap_err("build ledger gateway client")?;
    Ok(Arc::new(client))
}

fn challenge_sync(
    pool: DbPool,
    ledger: Arc<dyn LedgerClient>,
    metrics: Arc<dyn SyncMetrics>,
) -> ChallengeDefinitionSync {
    ChallengeDefinitionSync::new(
        ledger,
        Arc::new(DieselChallengeDefinitionRepository::new(pool)),
        metrics,
        ChallengeSyncConfig::default(),
    )
}

fn log_cache(settings: &SyncSettings, metrics: Arc<dyn SyncMetrics>) -> Result<LogCache> {
    let client = MirrorNodeLogClient::new(settings.mirror_node_url()?, settings.request_timeout())
        .wrap_err("build mirror node client")?;
    Ok(LogCache::new(
        settings.topic_id()?,
        Arc::new(client),
        metrics,
        clock(),
        settings.log_cache_config(),
    ))
}

async fn run_daemon(settings: &SyncSettings) -> Result<()> {
    let metrics = sync_metrics()?;
    let pool = db_pool(settings).await?;
    let challenges = challenge_sync(pool, ledger_client(settings)?, Arc::clone(&metrics));
    let cache = Arc::new(log_cache(settings, metrics)?);

    if let Err(err) = cache.initialize().await {
        warn!(error = %err, topic = %cache.topic(), "initial log refresh failed");
    }

    let challenge_task = tokio::spawn(challenge_loop(
        challenges,
        settings.challenge_sync_interval(),
    ));
    let log_task = tokio::spawn(log_loop(Arc::clone(&cache), settings.log_refresh_interval()));
    info!("sync daemon started");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("listen for shutdown signal")?;
    info!("shutdown requested");
    challenge_task.abort();
    log_task.abort();
    Ok(())
}

async fn challenge_loop(sync: ChallengeDefinitionSync, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = sync.sync_all().await {
            error!(error = %err, "challenge definition sync failed");
        }
    }
}

async fn log_loop(cache: Arc<LogCache>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and initialisation already ran.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = cache.refresh_cache().await {
            warn!(error = %err, topic = %cache.topic(), "log refresh failed");
        }
    }
}

async fn sync_challenges_once(settings: &SyncSettings) -> Result<()> {
    let pool = db_pool(settings).await?;
    let sync = challenge_sync(pool, ledger_client(settings)?, sync_metrics()?);
    let summary = sync
        .sync_all()
        .await
        .map_err(|err| eyre!("challenge sync failed: {err}"))?;

    println!("reported_count={}", summary.reported_count);
    println!("synced={}", summary.count);
    println!("failed={}", join_ids(&summary.failed));
    Ok(())
}

async fn activity_sync(settings: &SyncSettings) -> Result<Arc<ActivityCacheSync>> {
    let pool = db_pool(settings).await?;
    let ports = ActivitySyncPorts {
        ledger: ledger_client(settings)?,
        cache: Arc::new(DieselActivityCacheRepository::new(pool.clone())),
        definitions: Arc::new(DieselChallengeDefinitionRepository::new(pool)),
        metrics: sync_metrics()?,
    };
    Ok(Arc::new(ActivityCacheSync::new(
        ports,
        clock(),
        ActivitySyncConfig::default(),
    )))
}

async fn reconcile_once(settings: &SyncSettings, request: ReconcileRequest) -> Result<()> {
    let sync = activity_sync(settings).await?;
    reconcile_and_print(sync, &request).await
}

async fn submit_once(
    settings: &SyncSettings,
    user_id: UserId,
    ledger_identity: LedgerIdentity,
    amount: u64,
) -> Result<()> {
    let sync = activity_sync(settings).await?;
    let request = sync
        .submit_delta(user_id, ledger_identity, amount)
        .await
        .map_err(|err| eyre!("delta submission failed: {err}"))?;
    println!("receipt={}", request.receipt);
    reconcile_and_print(sync, &request).await
}

async fn reconcile_and_print(sync: Arc<ActivityCacheSync>, request: &ReconcileRequest) -> Result<()> {
    let (_queue, worker) = ReconcileWorker::new(sync, clock(), ReconcileWorkerConfig::default());
    let outcome = worker.process(request).await.map_err(|err| {
        eyre!("reconcile failed after the ledger settled; cache pending: {err}")
    })?;

    println!("total={}", outcome.total);
    println!("workout={:?}", outcome.workout);
    println!("newly_completed={}", join_ids(&outcome.newly_completed));
    println!("skipped={}", join_ids(&outcome.skipped));
    for violation in &outcome.violations {
        println!("violation={}", violation.label());
    }
    Ok(())
}

async fn refresh_log_once(settings: &SyncSettings) -> Result<()> {
    let cache = log_cache(settings, sync_metrics()?)?;
    let outcome = cache
        .refresh_cache()
        .await
        .map_err(|err| eyre!("log refresh failed: {err}"))?;
    info!(
        fetched = outcome.fetched,
        ingested = outcome.ingested,
        decode_skipped = outcome.decode_skipped,
        "log refreshed"
    );
    let stats = cache
        .get_stats()
        .map_err(|err| eyre!("read log stats: {err}"))?;
    let rendered = serde_json::to_string_pretty(&stats).wrap_err("render log stats")?;
    println!("{rendered}");
    Ok(())
}

fn join_ids(ids: &[fitledger::domain::ChallengeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
