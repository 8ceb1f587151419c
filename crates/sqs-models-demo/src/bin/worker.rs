//! # Worker
//!
//! Polls for [`AsyncTask`] records, deletes each one it handled and then
//! simulates long-running work.
//!
//! Tunables (environment):
//! - `WORKER_POLL`: seconds to wait after an empty poll (default 1)
//! - `WORKER_SLEEP`: seconds of simulated work per batch (default 10)
//! - `WORKER_MAX_MESSAGES`: records fetched per poll (default 2)

use sqs_models::{ReceiveOptions, Record};
use sqs_models_demo::{connect, env_or, env_seconds, init_tracing, AsyncTask};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let poll_time = env_seconds("WORKER_POLL", 1.0)?;
    let sleep_time = env_seconds("WORKER_SLEEP", 10.0)?;
    let messages_per_cycle: u32 = env_or("WORKER_MAX_MESSAGES", 2)?;
    // Keeps the task type bound
    let _registry = connect().await?;

    let options = ReceiveOptions::for_model()
        .with_max_messages(messages_per_cycle)
        .with_wait_time_seconds(5);

    loop {
        let incoming = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = Record::<AsyncTask>::from_queue(options.clone()) => result,
        };

        let pause = match incoming {
            Ok(tasks) if !tasks.is_empty() => {
                for mut task in tasks {
                    info!(uuid = %task.uuid, message = %task.message, "Deleting task");
                    if let Err(e) = task.delete_from_queue().await {
                        warn!(uuid = %task.uuid, error = %e, "Failed to delete task");
                    }
                }
                info!(seconds = sleep_time.as_secs_f64(), "Simulating long running work");
                sleep_time
            }
            Ok(_) => {
                info!(seconds = poll_time.as_secs_f64(), "No tasks found");
                poll_time
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Receive failed, retrying");
                poll_time
            }
            Err(e) => return Err(e.into()),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("Worker stopped");
    Ok(())
}
