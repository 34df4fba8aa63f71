use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};

use crate::clients::calendar_client::{CalendarClient, OutlookCalendarClient};
use crate::clients::oauth_client::{OAuthClient, OAuthSettings, TokenExchanger};
use crate::config::EngineConfig;
use crate::events::queue::{DispatchBus, LiveGeneration};
use crate::handlers::auth::{self, AuthState};
use crate::models::session::Session;
use crate::service::notifier::{Notifier, select_notifier};
use crate::service::session_store::{FileSessionStore, SessionStore};
use crate::tasks::dispatch_loop::run_dispatch_loop;
use crate::tasks::lifecycle::SessionLifecycleManager;
use crate::tasks::scheduler::SchedulerContext;
use crate::tasks::task_runner::TaskRunner;

const QUEUE_CAPACITY: usize = 10;

const DRY_RUN_SUMMARY: &str = "Meet with the Bobs";
const DRY_RUN_BODY: &str = "2:00P - 2:30P  Room A";

const LIFECYCLE_TASK: &str = "lifecycle";
const DISPATCH_TASK: &str = "dispatch";
const SERVER_TASK: &str = "server";

pub async fn run(config: EngineConfig) -> Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::from(select_notifier(config.notifier, &config.icon));

    if config.dry_run {
        tracing::info!("Dry run, sending a test notification");
        notifier
            .send(DRY_RUN_SUMMARY, DRY_RUN_BODY)
            .await
            .context("test notification failed")?;
        return Ok(());
    }

    let settings = OAuthSettings::microsoft(
        &config.client_id,
        &config.client_secret,
        &config.tenant,
        config.port,
    )
    .context("invalid OAuth settings")?;
    let oauth: Arc<dyn TokenExchanger> = Arc::new(OAuthClient::new(settings));
    let client: Arc<dyn CalendarClient> = Arc::new(OutlookCalendarClient::default());
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&config.token_file));

    let (bus, dispatch_rx) = DispatchBus::new(QUEUE_CAPACITY);
    let (session_tx, session_rx) = mpsc::channel::<Session>(QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let live = LiveGeneration::new();

    let context = SchedulerContext {
        config: config.scheduler.clone(),
        client,
        renewer: Some(oauth.clone()),
        store: store.clone(),
        bus,
        shutdown: shutdown_rx.clone(),
    };
    let manager = SessionLifecycleManager::new(context, live.clone());

    let routes = auth::routes(AuthState {
        exchanger: oauth,
        sessions: session_tx.clone(),
    });
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    let mut task_runner = TaskRunner::new();
    task_runner.add_task(DISPATCH_TASK, run_dispatch_loop(dispatch_rx, notifier.clone(), live));
    task_runner.add_task(LIFECYCLE_TASK, manager.run(session_rx, shutdown_rx));
    task_runner.add_task(SERVER_TASK, async move {
        tracing::info!("Listening on http://localhost:{}", addr.port());
        warp::serve(routes).run(addr).await;
    });
    let mut running = task_runner.start_all();

    match store.load() {
        Ok(Some(session)) => {
            tracing::info!("Loaded session from {}", config.token_file.display());
            session_tx.send(session).await?;
        }
        Ok(None) => request_login(notifier.as_ref(), config.port).await,
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", config.token_file.display(), e);
            request_login(notifier.as_ref(), config.port).await;
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    running.join(LIFECYCLE_TASK).await;
    running.join(DISPATCH_TASK).await;
    running.abort_all();
    Ok(())
}

async fn request_login(notifier: &dyn Notifier, port: u16) {
    let message = format!(
        "Please visit http://localhost:{} and log in to your Microsoft account",
        port
    );
    tracing::info!("{}", message);
    if let Err(e) = notifier.send("Authentication Required", &message).await {
        tracing::warn!("Cannot show login notification: {}", e);
    }
}
