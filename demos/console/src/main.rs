use std::time::Duration;

use anyhow::Context;
use taskwatch::{notifier::LogNotifier, prelude::*};
use taskwatch_http::{ClientConfig, HttpTaskClient};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "taskwatch.toml";

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::load(CONFIG_PATH)
        .context("loading client config")?
        .with_env_overrides();
    let client = HttpTaskClient::new(&config).context("building http client")?;
    tracing::info!(base_url = client.base_url(), "Connecting to task backend");

    let taskwatch = TaskWatch::new(client)
        .with_endpoints(config.artifacts.clone())
        .with_poll_config(PollConfig::default().with_max_attempts(60))
        .with_cadence(CadenceConfig::default())
        .with_reminders(LogNotifier, ReminderConfig::default());

    let stats = taskwatch.client().stats().await?;
    println!(
        "{} tasks: {} completed, {} pending, {} failed",
        stats.total, stats.completed, stats.pending, stats.failed
    );

    let task = NewTask::builder(ToolType::Chart)
        .with_title("Monthly revenue")
        .with_parameter("chart_type", "bar")
        .with_parameter(
            "data",
            serde_json::json!({"labels": ["North", "South"], "values": [120, 95]}),
        )
        .build();
    let handle = taskwatch.submit(task).await?;
    println!("Submitted task {}", handle.job_id());

    tokio::select! {
        outcome = handle.outcome() => report(outcome),
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted, stopping task {}", handle.job_id());
            taskwatch.cancel(handle.job_id()).await?;
        }
    }

    let today = chrono::Utc::now().date_naive();
    let upcoming: Vec<_> = taskwatch
        .events()
        .snapshot()
        .into_iter()
        .filter(|event| event.start_time.date_naive() >= today)
        .take(5)
        .collect();
    for event in upcoming {
        println!("Upcoming: {} at {}", event.title, event.start_time);
    }

    // Leave the reminder loop one tick to catch anything due right now.
    tokio::time::sleep(Duration::from_millis(100)).await;
    taskwatch.graceful_shutdown().await?;
    Ok(())
}

fn report(outcome: PollOutcome) {
    match outcome {
        PollOutcome::Completed(completion) if completion.outcome.is_failure() => println!(
            "Task finished but reported a failure: {}",
            completion.outcome.failure_reason().unwrap_or("unknown")
        ),
        PollOutcome::Completed(completion) => match completion.download {
            Some(download) => println!("Task completed, download {}", download.url),
            None => println!("Task completed"),
        },
        PollOutcome::Failed { message, .. } => println!("Task failed: {message}"),
        PollOutcome::TimedOut { attempts } => {
            println!("Gave up waiting after {attempts} status checks")
        }
        PollOutcome::Cancelled => println!("Stopped watching the task"),
    }
}
