use std::net::SocketAddr;
use std::sync::Arc;

use api_server::http;
use chrono::Utc;
use shared::config::ApiConfig;
use shared::dispatch::Dispatcher;
use shared::store::RecordsClient;
use shared::transport::MessagingClient;
use tokio::time::{self, Duration};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=debug,shared=debug,axum=info".to_string()),
        )
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let store = RecordsClient::new(
        &config.records_api_base_url,
        &config.records_api_token,
        &config.records_table_id,
    );
    let transport = MessagingClient::new(
        &config.messaging_api_base_url,
        &config.channel_access_token,
    );

    let dispatcher = Arc::new(Dispatcher::new(
        config.session_ttl_seconds,
        Arc::new(store),
        Arc::new(transport),
        config.reminder_recipients.clone(),
        config.display_time_zone.clone(),
    ));

    spawn_session_sweep(dispatcher.clone(), config.session_sweep_seconds);

    let app = http::build_router(http::AppState {
        dispatcher,
        channel_secret: config.channel_secret.clone(),
    });

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "127.0.0.1:8080".parse().expect("valid default bind addr"));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind should succeed");

    info!(
        "api server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    axum::serve(listener, app).await.expect("server should run");
}

/// Idle sessions are swept periodically so the per-user state map cannot
/// grow without bound.
fn spawn_session_sweep(dispatcher: Arc<Dispatcher>, sweep_seconds: u64) {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_secs(sweep_seconds.max(1)));
        loop {
            ticker.tick().await;
            let evicted = dispatcher.sessions().evict_expired(Utc::now()).await;
            if evicted > 0 {
                info!(evicted, "session sweep evicted idle sessions");
            } else {
                debug!("session sweep found no idle sessions");
            }
        }
    });
}
