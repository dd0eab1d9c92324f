use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::service::mirror::VolumeMirror;
use crate::service::reclaim::{Reclaimer, SweepReport};
use crate::utils::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    ExpireTrash,
    RepairOrphans,
    ExpireSessions,
}

impl Sweep {
    pub const ALL: [Sweep; 3] = [Sweep::ExpireTrash, Sweep::RepairOrphans, Sweep::ExpireSessions];
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sweep::ExpireTrash => "trash expiry",
            Sweep::RepairOrphans => "orphan repair",
            Sweep::ExpireSessions => "session expiry",
        };
        f.write_str(name)
    }
}

/// Runs one sweep and reports its outcome to the operator. Never fails.
pub async fn run_sweep(
    reclaimer: &Reclaimer,
    notifier: &dyn Notifier,
    sweep: Sweep,
) -> Option<SweepReport> {
    let result: Result<SweepReport> = match sweep {
        Sweep::ExpireTrash => reclaimer.expire_trash(Utc::now()).await,
        Sweep::RepairOrphans => reclaimer.repair_orphans().await,
        Sweep::ExpireSessions => reclaimer.expire_sessions(Utc::now()).await,
    };

    match result {
        Ok(report) if report.is_clean() => {
            info!("{sweep} finished, {} item(s) removed", report.removed);
            if report.removed > 0 && sweep != Sweep::ExpireSessions {
                notifier.system_success(&format!(
                    "{sweep} removed {} item(s)",
                    report.removed
                ));
            }
            Some(report)
        }
        Ok(report) => {
            error!("{sweep} finished with {} failure(s)", report.failed.len());
            notifier.system_error(&format!("{sweep} incomplete"), &report.failed.join("\n"));
            Some(report)
        }
        Err(err) => {
            error!("{sweep} failed: {err}");
            notifier.system_error(&format!("{sweep} failed"), &err.to_string());
            None
        }
    }
}

/// Starts one timer per sweep plus the volume mirror. The first pass of each
/// runs right away.
pub fn spawn_scheduler(
    reclaimer: Arc<Reclaimer>,
    mirror: Arc<VolumeMirror>,
    notifier: Arc<dyn Notifier>,
    schedule: &ScheduleConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let sweep_period = Duration::from_secs(schedule.sweep_interval_secs);
    let mut handles: Vec<JoinHandle<()>> = Sweep::ALL
        .into_iter()
        .map(|sweep| {
            let reclaimer = reclaimer.clone();
            let notifier = notifier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut timer = interval(sweep_period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = timer.tick() => {}
                    }
                    run_sweep(&reclaimer, notifier.as_ref(), sweep).await;
                }
                debug!("{sweep} loop stopped");
            })
        })
        .collect();

    if mirror.is_enabled() {
        let mirror_period = Duration::from_secs(schedule.mirror_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut timer = interval(mirror_period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }
                // the mirror reports its own failures
                if let Err(err) = mirror.run().await {
                    error!("Volume mirror failed: {err}");
                }
            }
            debug!("volume mirror loop stopped");
        }));
    }

    handles
}
