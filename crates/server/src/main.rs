//! Campaign dialer server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outdial_config::{load_settings, Settings};
use outdial_coordination::{Coordinator, PromoteMutex, SlotManager, Waitlist};
use outdial_dialer::{
    spawn_reconcilers, CallOrchestrator, CampaignDispatcher, ContactSettler, Promoter,
    ReconcilerConfig, ReconcilerDeps,
};
use outdial_llm::{HttpChatBackend, HttpChatConfig};
use outdial_persistence::ScyllaConfig;
use outdial_pipeline::{ConnectionPool, PoolConfig};
use outdial_session::SessionRegistry;
use outdial_telephony::{CredentialCipher, GatewayClient};

use outdial_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("OUTDIAL_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing();
    tracing::info!("Starting outdial server v{}", env!("CARGO_PKG_VERSION"));

    let _metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    // Durable stores
    let persistence = outdial_persistence::init(ScyllaConfig {
        hosts: settings.persistence.scylla_hosts.clone(),
        keyspace: settings.persistence.keyspace.clone(),
        replication_factor: settings.persistence.replication_factor,
    })
    .await
    .context("persistence init")?;

    // Coordination store
    let coordinator = Coordinator::connect(&settings.coordination.redis_url)
        .await
        .context("coordination init")?;
    let slots = SlotManager::new(
        coordinator.clone(),
        settings.coordination.pre_dial_ttl_secs,
    );
    let waitlist = Waitlist::new(coordinator.clone());
    let mutex = PromoteMutex::new(
        coordinator.clone(),
        settings.coordination.promote_mutex_ttl_secs,
    );

    // Telephony
    let gateway = GatewayClient::new(Duration::from_secs(
        settings.telephony.request_timeout_secs,
    ))
    .context("gateway client")?;
    let cipher = CredentialCipher::new(settings.telephony.credential_secret.clone())
        .context("credential cipher (set OUTDIAL_CREDENTIAL_SECRET)")?;

    // Dialer control plane
    let settler = ContactSettler::new(persistence.clone());
    let orchestrator = Arc::new(CallOrchestrator::new(
        persistence.clone(),
        slots.clone(),
        gateway,
        cipher,
        settler,
        settings.server.public_base_url.clone(),
    ));
    let dispatcher = Arc::new(CampaignDispatcher::new(
        persistence.clone(),
        coordinator.clone(),
        slots.clone(),
        waitlist.clone(),
        Arc::clone(&orchestrator),
        Duration::from_secs(settings.dialer.purge_grace_secs),
    ));

    // Promoter event loop
    let promoter = Promoter::new(
        coordinator.clone(),
        slots.clone(),
        waitlist.clone(),
        mutex,
        persistence.clone(),
        Arc::clone(&dispatcher),
    );
    let (promoter_shutdown_tx, promoter_shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(promoter.run(promoter_shutdown_rx));

    // Reconciliation loops
    let reconcilers = spawn_reconcilers(ReconcilerDeps {
        persistence: persistence.clone(),
        coordinator: coordinator.clone(),
        slots: slots.clone(),
        waitlist,
        dispatcher: Arc::clone(&dispatcher),
        orchestrator: Arc::clone(&orchestrator),
        config: ReconcilerConfig {
            waitlist_scan_interval: Duration::from_secs(
                settings.dialer.waitlist_scan_interval_secs,
            ),
            waitlist_scan_batch: settings.dialer.waitlist_scan_batch,
            max_call_age: Duration::from_secs(settings.dialer.max_call_age_secs),
            pre_dial_ttl: Duration::from_secs(settings.coordination.pre_dial_ttl_secs),
            ..Default::default()
        },
    });

    // Voice pipeline shared state
    let stt_pool = Arc::new(ConnectionPool::new(PoolConfig {
        max_connections: settings.stt.pool_max_connections,
        max_queued: settings.stt.pool_max_queued,
        acquire_timeout: Duration::from_secs(settings.stt.pool_acquire_timeout_secs),
    }));
    let llm = Arc::new(
        HttpChatBackend::new(HttpChatConfig {
            endpoint: settings.llm.endpoint.clone(),
            api_key: settings.llm.api_key.clone(),
            timeout: Duration::from_secs(settings.llm.timeout_secs),
        })
        .context("llm backend")?,
    );
    let registry = Arc::new(SessionRegistry::new());

    let state = AppState {
        settings: Arc::new(settings.clone()),
        persistence,
        coordinator,
        slots,
        dispatcher,
        orchestrator,
        registry: Arc::clone(&registry),
        stt_pool,
        llm,
        retriever: None,
    };

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;

    // Drain: stop promotions and reconcilers, let live sessions close
    tracing::info!("Shutting down");
    let _ = promoter_shutdown_tx.send(true);
    reconcilers.shutdown();
    registry.stop_all().await;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
