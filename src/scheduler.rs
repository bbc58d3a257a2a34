//! Background scheduler for the daily membership sweep.
//!
//! The sweep is the only long-lived background task. It is not
//! time-critical: a delayed run only postpones downgrades, which the login
//! path also applies lazily.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::state::SharedState;

pub struct Scheduler {
    state: Arc<SharedState>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: Arc<SharedState>, config: SchedulerConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// One sweep, outside any schedule. Used by the CLI `sweep` command.
    pub async fn run_once(&self) -> Result<u32> {
        Ok(self.state.membership.sweep_expired().await?)
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                if let Err(e) = state.membership.sweep_expired().await {
                    error!("Scheduled membership sweep failed: {}", e);
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let hours = u64::from(self.config.sweep_interval_hours.max(1));
        info!("Scheduler running every {} hours", hours);

        let mut sweep_interval = interval(Duration::from_secs(hours * 60 * 60));
        // First tick fires immediately; skip it so startup stays quiet.
        sweep_interval.tick().await;

        loop {
            sweep_interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            if let Err(e) = self.state.membership.sweep_expired().await {
                error!("Scheduled membership sweep failed: {}", e);
            }
        }

        Ok(())
    }
}
