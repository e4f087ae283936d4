use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

use super::{Alert, AlertDispatcher};

/// Runs an `AlertDispatcher` on its own thread so slow channels (SMTP, HTTP,
/// speech) never stall the frame loop. Queued alerts are delivered in order;
/// `stop` waits for the queue to drain.
pub struct DispatchWorker {
    tx: Option<Sender<Alert>>,
    join: Option<JoinHandle<usize>>,
}

impl DispatchWorker {
    pub fn spawn(dispatcher: AlertDispatcher) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Alert>();
        let join = std::thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || {
                let mut dispatched = 0usize;
                for alert in rx {
                    let report = dispatcher.dispatch(&alert);
                    if !report.all_delivered() {
                        log::warn!(
                            "alert for {} delivered via {} of {} channels",
                            alert.location,
                            report.delivered.len(),
                            report.delivered.len() + report.failed.len()
                        );
                    }
                    dispatched += 1;
                }
                dispatched
            })
            .map_err(|e| anyhow!("failed to spawn alert worker: {}", e))?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
        })
    }

    pub fn submit(&self, alert: Alert) -> Result<()> {
        self.tx
            .as_ref()
            .ok_or_else(|| anyhow!("alert worker already stopped"))?
            .send(alert)
            .map_err(|_| anyhow!("alert worker thread exited"))
    }

    /// Close the queue, deliver what is pending, and return how many alerts
    /// the worker dispatched over its lifetime.
    pub fn stop(mut self) -> Result<usize> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<usize> {
        self.tx.take();
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("alert worker thread panicked")),
            None => Ok(0),
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}
