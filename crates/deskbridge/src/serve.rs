// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `deskbridge serve` command implementation.
//!
//! Wires the clients, identity store and engine together, starts the sync
//! loop and the webhook listener, and runs until a shutdown signal arrives
//! or either of them fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deskbridge_chatwoot::{ChatwootClient, StartNewChatProvisioner};
use deskbridge_config::DeskbridgeConfig;
use deskbridge_config::model::LoggingConfig;
use deskbridge_core::types::UserId;
use deskbridge_core::{BridgeError, DeskClient, ProtocolClient, RoomEvent, RoomProvisioner};
use deskbridge_engine::{BridgeContext, Engine, EngineSettings};
use deskbridge_gateway::{GatewayState, ServerConfig, start_server};
use deskbridge_matrix::{MatrixClient, MatrixSettings, SenderFilter, SyncLoop, SyncProcessor};
use deskbridge_resilience::RetryPolicy;
use deskbridge_storage::IdentityStore;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};

use crate::shutdown;

/// Capacity of the sync-to-dispatcher channel. A full channel pauses `/sync`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long in-flight events and background tasks get to finish at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the bridge until shutdown.
pub async fn run_serve(config: DeskbridgeConfig) -> Result<(), BridgeError> {
    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting deskbridge");

    let cancel = shutdown::install_signal_handler();

    let bot = UserId::parse(config.matrix.bot_user_id.as_str())
        .map_err(|e| BridgeError::Config(format!("matrix.bot_user_id: {e}")))?;
    let matrix_token = required_secret(
        config.matrix.resolved_access_token(),
        "matrix.access_token",
    )?;
    let store_passphrase = config
        .matrix
        .resolved_store_passphrase()
        .map_err(|e| BridgeError::Config(format!("failed to read matrix.store_passphrase_file: {e}")))?;
    let matrix = Arc::new(
        MatrixClient::connect(&MatrixSettings {
            homeserver_url: config.matrix.homeserver_url.clone(),
            bot_user_id: bot.clone(),
            device_id: config.matrix.device_id.clone(),
            access_token: matrix_token,
            store_path: PathBuf::from(&config.matrix.store_path),
            store_passphrase,
        })
        .await?,
    );

    let desk_token = required_secret(
        config.chatwoot.resolved_access_token(),
        "chatwoot.access_token",
    )?;
    let desk = Arc::new(ChatwootClient::new(
        &config.chatwoot.base_url,
        config.chatwoot.account_id,
        config.chatwoot.inbox_id,
        &desk_token,
    )?);

    let provisioner = if config.start_new_chat.enabled {
        info!(endpoint = %config.start_new_chat.endpoint, "start-new-chat provisioning enabled");
        let token = config.start_new_chat.token.clone().unwrap_or_default();
        let provisioner = StartNewChatProvisioner::new(&config.start_new_chat.endpoint, token)?;
        Some(Arc::new(provisioner) as Arc<dyn RoomProvisioner>)
    } else {
        None
    };

    let store = IdentityStore::open(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(path = %config.storage.database_path, "identity store opened");

    let retry = RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.base_delay_ms),
        cancel.clone(),
    );

    let engine = Engine::new(BridgeContext::new(
        matrix.clone() as Arc<dyn ProtocolClient>,
        desk as Arc<dyn DeskClient>,
        provisioner,
        store.clone(),
        retry.clone(),
        EngineSettings::from_config(&config.bridge),
    ));

    if config.bridge.conversation_state_backfill {
        match engine.backfill_conversation_state().await {
            Ok(count) => info!(rooms = count, "conversation state backfill complete"),
            Err(e) => warn!(error = %e, "conversation state backfill failed"),
        }
    }

    let server_config = ServerConfig {
        bind_address: config.webhook.bind_address.clone(),
        port: config.webhook.port,
        ..ServerConfig::default()
    };
    let gateway_state = GatewayState::new(Arc::new(engine.clone()));
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = start_server(&server_config, gateway_state, server_cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "webhook listener failed");
            server_cancel.cancel();
        }
        result
    });

    let filter = SenderFilter::new(
        &bot,
        config.matrix.allowed_homeservers.clone(),
        config.matrix.allow_other_homeservers,
    );
    let processor = SyncProcessor::new(
        matrix.clone() as Arc<dyn ProtocolClient>,
        store.clone(),
        filter,
        retry,
        config.matrix.auto_join,
    );
    let sync_loop = SyncLoop::new(
        matrix,
        processor,
        Duration::from_millis(config.matrix.sync_timeout_ms),
    );
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let sync_cancel = cancel.clone();
    let sync = tokio::spawn(async move {
        let result = sync_loop.run(events_tx, sync_cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "sync loop failed");
            sync_cancel.cancel();
        }
        result
    });

    let in_flight = TaskTracker::new();
    dispatch_events(&engine, events_rx, &in_flight).await;

    // The channel closes only once the sync loop has returned.
    cancel.cancel();
    info!("shutting down");

    let sync_result = join_result(sync.await, "sync loop");
    let server_result = join_result(server.await, "webhook listener");

    shutdown::drain_tasks(&in_flight, DRAIN_TIMEOUT).await;
    engine.drain(DRAIN_TIMEOUT).await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close identity store cleanly");
    }
    info!("deskbridge stopped");

    sync_result.and(server_result)
}

/// Spawns one tracked task per room event until the channel closes.
///
/// Per-room ordering is enforced inside the engine by the room lock, so
/// events from different rooms proceed in parallel.
async fn dispatch_events(
    engine: &Engine,
    mut events: mpsc::Receiver<RoomEvent>,
    tasks: &TaskTracker,
) {
    while let Some(event) = events.recv().await {
        let span = info_span!(
            "room_event",
            room_id = %event.room_id,
            event_id = %event.event_id,
        );
        let engine = engine.clone();
        tasks.spawn(
            async move {
                if let Err(e) = engine.handle_room_event(event).await {
                    error!(error = %e, "failed to bridge room event");
                }
            }
            .instrument(span),
        );
    }
}

fn join_result(
    joined: Result<Result<(), BridgeError>, tokio::task::JoinError>,
    task: &str,
) -> Result<(), BridgeError> {
    joined.map_err(|e| BridgeError::Internal(format!("{task} task panicked: {e}")))?
}

fn required_secret(
    resolved: Result<Option<String>, std::io::Error>,
    key: &str,
) -> Result<String, BridgeError> {
    match resolved {
        Ok(Some(secret)) if !secret.is_empty() => Ok(secret),
        Ok(_) => Err(BridgeError::Config(format!("{key} is not set"))),
        Err(e) => Err(BridgeError::Config(format!("failed to read {key}_file: {e}"))),
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn default_filter(level: &str) -> String {
    format!("deskbridge={level},warn")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_level_to_deskbridge() {
        assert_eq!(default_filter("debug"), "deskbridge=debug,warn");
    }

    #[test]
    fn missing_and_empty_secrets_are_config_errors() {
        let err = required_secret(Ok(None), "matrix.access_token").unwrap_err();
        assert!(matches!(err, BridgeError::Config(ref m) if m.contains("matrix.access_token")));

        let err = required_secret(Ok(Some(String::new())), "chatwoot.access_token").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = required_secret(Err(io), "chatwoot.access_token").unwrap_err();
        assert!(err.to_string().contains("chatwoot.access_token_file"));

        assert_eq!(required_secret(Ok(Some("tok".into())), "k").unwrap(), "tok");
    }

    #[tokio::test]
    async fn panicked_task_becomes_internal_error() {
        let handle = tokio::spawn(async {
            if true {
                panic!("boom");
            }
            Ok::<(), BridgeError>(())
        });
        let err = join_result(handle.await, "sync loop").unwrap_err();
        assert!(matches!(err, BridgeError::Internal(ref m) if m.starts_with("sync loop task panicked")));
    }
}
