//! # Sender
//!
//! Enqueues an [`AsyncTask`] every `SENDER_SLEEP` seconds (default 5) until
//! interrupted.

use sqs_models::Record;
use sqs_models_demo::{connect, env_seconds, init_tracing, AsyncTask};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let sleep_time = env_seconds("SENDER_SLEEP", 5.0)?;
    // Keeps the task type bound
    let _registry = connect().await?;

    let mut counter: u64 = 0;
    loop {
        let mut task = Record::try_new(AsyncTask::new(format!("This is message {}", counter)))?;
        task.to_queue(None).await?;
        info!(
            uuid = %task.uuid,
            message_id = ?task.message_id().map(|id| id.as_str()),
            "Sent task"
        );
        counter += 1;

        info!(seconds = sleep_time.as_secs_f64(), "Sleeping");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(sleep_time) => {}
        }
    }

    info!(sent = counter, "Sender stopped");
    Ok(())
}
