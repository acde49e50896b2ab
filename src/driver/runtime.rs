//! Local chained runtime
//!
//! Stands in for the storage trigger mechanism: every trigger event received
//! on the channel becomes an independent invocation on its own tokio task.
//! With chaining on, each object an invocation writes into a watched bucket
//! produces a follow-up event for that object, so one raw object flows
//! transform -> moderation -> sentiment without a central orchestrator.
//!
//! Invocations run concurrently and complete in any order. Failed
//! invocations are logged and counted; they are not retried.

use super::{InvocationReport, Pipeline, PipelineError, TriggerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Totals across every invocation the runtime ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSummary {
    pub invocations: u64,
    pub failed: u64,
    pub records: u64,
    pub skipped: u64,
    pub follow_ups: u64,
}

/// Follow-up events for objects `report` wrote into watched buckets.
pub fn follow_up_events(pipeline: &Pipeline, report: &InvocationReport) -> Vec<TriggerEvent> {
    report
        .written()
        .filter(|object| pipeline.route(&object.bucket).is_some())
        .map(|object| TriggerEvent::from_objects([object.clone()]))
        .collect()
}

fn spawn_invocation(
    tasks: &mut JoinSet<Result<InvocationReport, PipelineError>>,
    pipeline: &Arc<Pipeline>,
    event: TriggerEvent,
) {
    let pipeline = Arc::clone(pipeline);
    tasks.spawn(async move { pipeline.handle(&event).await });
}

/// Run invocations until the channel closes and every in-flight (and
/// chained) invocation has finished.
pub async fn run_chained(
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::Receiver<TriggerEvent>,
    chain: bool,
) -> RuntimeSummary {
    log::info!("🚀 Starting pipeline runtime");
    log::info!("   ├─ Chaining: {}", if chain { "enabled" } else { "disabled" });
    log::info!("   └─ Waiting for trigger events...");

    let mut tasks = JoinSet::new();
    let mut summary = RuntimeSummary::default();
    let mut accepting = true;

    loop {
        tokio::select! {
            received = rx.recv(), if accepting => match received {
                Some(event) => spawn_invocation(&mut tasks, &pipeline, event),
                None => {
                    log::info!("🔄 Trigger channel closed, draining {} in-flight invocations", tasks.len());
                    accepting = false;
                }
            },

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                summary.invocations += 1;
                match joined {
                    Ok(Ok(report)) => {
                        summary.records += report.records() as u64;
                        summary.skipped += report.skipped() as u64;
                        if chain {
                            for event in follow_up_events(&pipeline, &report) {
                                summary.follow_ups += 1;
                                spawn_invocation(&mut tasks, &pipeline, event);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        summary.failed += 1;
                        log::error!("❌ Invocation failed: {}", e);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        log::error!("❌ Invocation task panicked: {}", e);
                    }
                }
            }

            else => break,
        }
    }

    log::info!(
        "✅ Pipeline runtime stopped: {} invocations ({} failed), {} records, {} skipped lines",
        summary.invocations,
        summary.failed,
        summary.records,
        summary.skipped
    );
    summary
}
