use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::common::AppState;

/// Run evaluation passes on a schedule until `shutdown` flips to `true`.
///
/// A pass whose failures include store timeouts or store errors is retried
/// with a fixed delay, up to `EVAL_RETRY_MAX` times. Re-running a pass is
/// safe: rules already transitioned see their alert and keep it.
///
/// Each tick first delivers commands left `queued`, which on the first tick
/// covers anything stranded by a previous run.
pub async fn run_evaluation(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval_secs = state.config.eval_interval_seconds;

    tracing::info!(
        interval_secs,
        concurrency = state.config.eval_concurrency,
        "Starting rule evaluation scheduler"
    );

    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = state.dispatcher.deliver_pending().await {
            tracing::error!(error = %e, "Failed to load queued commands");
        }

        if !run_pass_with_retry(&state, &mut shutdown).await {
            break;
        }
    }

    tracing::info!("Rule evaluation scheduler stopped");
}

/// Returns `false` when shutdown was requested while waiting to retry.
async fn run_pass_with_retry(state: &AppState, shutdown: &mut watch::Receiver<bool>) -> bool {
    let retry_delay_secs = state.config.eval_retry_delay_seconds;
    let max_retries = state.config.eval_retry_max;
    let mut retries = 0;

    loop {
        let retry = match state.engine.run_pass(Utc::now(), Some(shutdown.clone())).await {
            Ok(report) if !report.has_transient_failures() => {
                tracing::debug!(
                    evaluated = report.evaluated,
                    failed = report.failures.len(),
                    "Evaluation pass completed"
                );
                false
            }
            Ok(report) => {
                retries += 1;
                if retries <= max_retries {
                    tracing::warn!(
                        failed = report.failures.len(),
                        retry = retries,
                        max_retries,
                        delay_secs = retry_delay_secs,
                        "Evaluation pass hit store errors, retrying"
                    );
                    true
                } else {
                    tracing::error!(
                        failed = report.failures.len(),
                        max_retries,
                        "Evaluation pass hit store errors after max retries"
                    );
                    false
                }
            }
            Err(e) => {
                retries += 1;
                if retries <= max_retries {
                    tracing::error!(
                        error = %e,
                        retry = retries,
                        max_retries,
                        "Evaluation pass failed, retrying"
                    );
                    true
                } else {
                    tracing::error!(
                        error = %e,
                        max_retries,
                        "Evaluation pass failed after max retries"
                    );
                    false
                }
            }
        };

        if !retry {
            return true;
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(retry_delay_secs)) => {}
            _ = shutdown.changed() => return false,
        }
    }
}
