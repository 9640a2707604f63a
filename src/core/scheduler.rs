use crate::domain::ports::Poller;
use crate::utils::error::{PingError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A poller run at a fixed rate after an initial delay.
#[derive(Clone)]
pub struct ScheduledJob {
    pub poller: Arc<dyn Poller>,
    pub initial_delay: Duration,
    pub period: Duration,
}

/// 固定頻率排程器，每個工作在獨立的 tokio task 中執行
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(
        &mut self,
        poller: Arc<dyn Poller>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<()> {
        if period.is_zero() {
            return Err(PingError::InvalidConfigValueError {
                field: format!("schedule period of '{}'", poller.name()),
                value: "0".to_string(),
                reason: "Period must be greater than zero".to_string(),
            });
        }

        self.jobs.push(ScheduledJob {
            poller,
            initial_delay,
            period,
        });
        Ok(())
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Spawn one task per job. Tasks exit once `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|job| {
                tracing::info!(
                    "⏰ Scheduling '{}' every {:?} (initial delay {:?})",
                    job.poller.name(),
                    job.period,
                    job.initial_delay
                );
                tokio::spawn(run_job(job, shutdown.clone()))
            })
            .collect()
    }
}

async fn run_job(job: ScheduledJob, shutdown: CancellationToken) {
    let name = job.poller.name().to_string();
    let mut interval = tokio::time::interval_at(Instant::now() + job.initial_delay, job.period);
    // 落後時立即補跑，維持固定頻率
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut runs: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        runs += 1;
        tracing::debug!("Running scheduled poll '{}' (#{})", name, runs);

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::warn!("Scheduled poll '{}' interrupted by shutdown", name);
                break;
            }
            result = job.poller.poll() => match result {
                Ok(report) => tracing::debug!(
                    "✅ '{}' started {} received {} records in {} batches ({} skipped) in {:?}",
                    name,
                    report.started_at.format("%H:%M:%S%.3f"),
                    report.record_count(),
                    report.batches.len(),
                    report.skipped,
                    report.elapsed
                ),
                // 暫時性錯誤只警告，等下一輪再試
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "⚠️ Scheduled poll '{}' failed, retrying next run: {} (Category: {:?})",
                        name,
                        e,
                        e.category()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Scheduled poll '{}' failed: {} (Category: {:?}, Severity: {:?})",
                        name,
                        e,
                        e.category(),
                        e.severity()
                    );
                    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
                }
            }
        }
    }

    tracing::info!("🛑 Scheduled job '{}' stopped after {} runs", name, runs);
}
