use std::sync::Arc;

use chrono::Utc;
use shared::config::WorkerConfig;
use shared::reminder;
use shared::schedule::{format_local_time_hhmm, next_daily_run_after};
use shared::store::{EventStore, RecordsClient};
use shared::transport::{MessagingClient, MessagingTransport};
use tokio::signal;
use tokio::time::{self, Duration};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "worker=debug,shared=debug".to_string()),
        )
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read worker config: {err}");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn EventStore> = Arc::new(RecordsClient::new(
        &config.records_api_base_url,
        &config.records_api_token,
        &config.records_table_id,
    ));
    let transport: Arc<dyn MessagingTransport> = Arc::new(MessagingClient::new(
        &config.messaging_api_base_url,
        &config.channel_access_token,
    ));

    info!(
        "reminder worker starting (daily at {} {})",
        format_local_time_hhmm(config.reminder_local_time_minutes),
        config.reminder_time_zone
    );

    loop {
        let now = Utc::now();
        let Some(next_run) = next_daily_run_after(
            now,
            &config.reminder_time_zone,
            config.reminder_local_time_minutes,
        ) else {
            error!("could not compute the next reminder trigger; retrying in an hour");
            if wait_or_shutdown(Duration::from_secs(3600)).await {
                break;
            }
            continue;
        };

        let sleep_duration = (next_run - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_run = %next_run.to_rfc3339(), "sleeping until next reminder trigger");

        if wait_or_shutdown(sleep_duration).await {
            break;
        }

        // A failed run produces no notifications this cycle and is retried
        // on the next scheduled trigger.
        if let Err(err) = reminder::run_once(
            store.as_ref(),
            transport.as_ref(),
            &config.reminder_recipients,
            &config.display_time_zone,
            Utc::now(),
        )
        .await
        {
            error!("reminder run failed: {err}");
        }
    }

    info!("reminder worker stopped");
}

/// Sleeps for `duration`, returning true if a shutdown signal arrived first.
async fn wait_or_shutdown(duration: Duration) -> bool {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            true
        }
        _ = time::sleep(duration) => false,
    }
}
