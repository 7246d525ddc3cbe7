pub mod notifier;

use anyhow::Result;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::mail::Mailbox;

use crate::daemon::notifier::{Embed, Notifier};

pub struct DaemonConfig {
    pub sender: String,
    pub interval: Duration,
    pub max_results: u32,
}

/// Outcome of one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub relayed: usize,
    pub delivery_failures: usize,
}

/// Cancels the polling loop. Cloneable trigger side, e.g. for a Ctrl-C handler.
#[derive(Clone)]
pub struct ShutdownTrigger(Sender<()>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.0.send(());
    }
}

pub struct Shutdown(Receiver<()>);

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = mpsc::channel();
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl Shutdown {
    /// Sleep for `period` unless shutdown is requested first. Returns true on shutdown.
    fn wait(&self, period: Duration) -> bool {
        match self.0.recv_timeout(period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// One tick: list unread from the sender, relay each, then mark it read.
///
/// A failed delivery is logged and the message is still marked read.
/// Any mailbox error aborts the rest of the tick.
pub fn poll_once(
    mailbox: &dyn Mailbox,
    notifier: &dyn Notifier,
    cfg: &DaemonConfig,
) -> Result<TickReport> {
    let mut report = TickReport::default();

    let ids = mailbox.list_unread_from(&cfg.sender, cfg.max_results)?;
    if ids.is_empty() {
        log::debug!("No unread mail from {}", cfg.sender);
        return Ok(report);
    }

    for id in ids {
        let summary = mailbox.fetch_summary(&id)?;
        let embed = Embed::for_message(&summary);

        match notifier.send(&embed) {
            Ok(()) => report.relayed += 1,
            Err(e) => {
                log::error!("Failed to relay message {id}: {e:#}");
                report.delivery_failures += 1;
            }
        }

        mailbox.mark_read(&id)?;
        log::debug!("Marked {id} as read");
    }

    Ok(report)
}

/// Poll until shutdown. Tick errors are logged and never stop the loop.
pub fn run_daemon(
    mailbox: &dyn Mailbox,
    notifier: &dyn Notifier,
    cfg: &DaemonConfig,
    shutdown: &Shutdown,
) -> Result<()> {
    log::info!(
        "Polling for unread mail from {} every {}s",
        cfg.sender,
        cfg.interval.as_secs()
    );

    loop {
        match poll_once(mailbox, notifier, cfg) {
            Ok(report) if report.relayed + report.delivery_failures > 0 => {
                log::info!(
                    "Relayed {} message(s), {} delivery failure(s)",
                    report.relayed,
                    report.delivery_failures
                );
            }
            Ok(_) => {}
            Err(e) => log::error!("Error checking emails: {e:#}"),
        }

        if shutdown.wait(cfg.interval) {
            log::info!("Shutdown requested; stopping poller");
            return Ok(());
        }
    }
}
