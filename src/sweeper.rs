//! Background eviction of expired attachments and tokens.
//!
//! Lazy expiry on read catches most stale records; the sweeper bounds the
//! disk and memory held by attachments nobody asks for again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{AttachmentVault, TokenRegistry};

/// How long `stop` waits for an in-flight pass before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attachments: usize,
    pub tokens: usize,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic sweeper over the vault and the token registry.
pub struct Sweeper {
    vault: Arc<AttachmentVault>,
    tokens: Arc<TokenRegistry>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl Sweeper {
    pub fn new(vault: Arc<AttachmentVault>, tokens: Arc<TokenRegistry>, interval: Duration) -> Self {
        Self {
            vault,
            tokens,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Run one pass now.
    pub async fn run_once(&self) -> SweepReport {
        sweep(&self.vault, &self.tokens).await
    }

    /// Start the background task. The first pass runs immediately.
    ///
    /// Starting a running sweeper restarts it: the old task is told to stop
    /// and finishes any in-flight pass on its own.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if let Some(old) = running.take() {
            debug!("Restarting sweeper");
            let _ = old.stop_tx.send(true);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let vault = Arc::clone(&self.vault);
        let tokens = Arc::clone(&self.tokens);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&vault, &tokens).await;
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("Sweeper task exited");
        });

        info!(interval_ms = period.as_millis() as u64, "Sweeper started");
        *running = Some(Running { stop_tx, handle });
    }

    /// `true` while the background task is active.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Signal the task to stop and wait for it, aborting after a grace period.
    ///
    /// Calling `stop` on a stopped sweeper does nothing.
    pub async fn stop(&self) {
        let taken = self.running.lock().take();
        let Some(Running { stop_tx, mut handle }) = taken else {
            return;
        };
        let _ = stop_tx.send(true);

        if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
            warn!("Sweeper did not stop in time, aborting");
            handle.abort();
        }
        info!("Sweeper stopped");
    }
}

async fn sweep(vault: &AttachmentVault, tokens: &TokenRegistry) -> SweepReport {
    let report = SweepReport {
        attachments: vault.sweep_expired().await,
        tokens: tokens.purge_expired(),
    };
    if report.attachments > 0 || report.tokens > 0 {
        info!(
            attachments = report.attachments,
            tokens = report.tokens,
            "Swept expired entries"
        );
    } else {
        debug!("Sweep found nothing to evict");
    }
    report
}
