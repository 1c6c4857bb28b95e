use std::sync::Arc;

use anyhow::Result;
use repo_sync::{Feedback, RemoteDescriptor, RepositoryId, SyncEngine, SyncOptions, TaskOutcome};

use super::format;

/// Print feedback items to stderr.
pub fn print_feedback(feedback: &[Feedback]) {
    for item in feedback {
        eprintln!("{item}");
    }
}

/// Run a sync task to completion. Fails when the task report is FAILED.
pub async fn run(
    engine: &Arc<SyncEngine>,
    repository: RepositoryId,
    remote: RemoteDescriptor,
    options: SyncOptions,
    json: bool,
) -> Result<()> {
    if !json {
        println!("Syncing {repository} from {}...", remote.url);
    }

    let mut handle = engine.start_sync_with(repository, remote, options);
    let task = handle.id();
    while let Some(state) = handle.next_state().await {
        tracing::debug!(%task, %state, "sync state changed");
        if state.is_terminal() {
            break;
        }
    }
    let report = handle.wait().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_feedback(&report.feedback);
    }

    match &report.outcome {
        TaskOutcome::Completed(result) => {
            if !json {
                if result.version_created {
                    println!(
                        "Created version {} (+{} -{}).",
                        result.latest_version,
                        result.added.len(),
                        result.removed.len()
                    );
                    format::print_changes(&result.added, &result.removed);
                } else {
                    println!("Already up to date at version {}.", result.latest_version);
                }
                println!("{}", format::summary_line(&result.summary));
            }
            Ok(())
        }
        TaskOutcome::Failed(error) => {
            anyhow::bail!("{task} failed: {}", error.description)
        }
    }
}
