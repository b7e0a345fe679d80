// Interval scheduler - fires each workflow runner on its own cadence
//
// Every workflow gets one background loop. A tick that arrives while
// the previous pass is still running joins it through the runner's
// guard instead of stacking a second pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use crate::guard::RunOutcome;
use crate::settlement::engine::{Workflow, WorkflowRunner};

/// Anything the scheduler can fire on a timer
#[async_trait::async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fire(&self) -> RunOutcome;
}

#[async_trait::async_trait]
impl<W: Workflow> Trigger for WorkflowRunner<W> {
    fn name(&self) -> &'static str {
        WorkflowRunner::name(self)
    }

    async fn fire(&self) -> RunOutcome {
        self.trigger().await
    }
}

/// One scheduled trigger with its cadence
pub struct ScheduleEntry {
    pub trigger: Arc<dyn Trigger>,
    pub every: Duration,
}

/// Spawn the background loops; returns their handles so the caller can
/// keep them alive for the life of the process.
pub fn start(entries: Vec<ScheduleEntry>) -> Vec<JoinHandle<()>> {
    entries
        .into_iter()
        .map(|entry| {
            tokio::spawn(async move {
                info!(
                    "⏰ {} scheduled every {}s",
                    entry.trigger.name(),
                    entry.every.as_secs()
                );
                let mut ticker = interval(entry.every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // First tick completes immediately: run once at startup
                loop {
                    ticker.tick().await;
                    match entry.trigger.fire().await {
                        RunOutcome::Executed => {}
                        RunOutcome::Joined => {
                            info!("{}: tick joined an in-flight pass", entry.trigger.name())
                        }
                    }
                }
            })
        })
        .collect()
}
