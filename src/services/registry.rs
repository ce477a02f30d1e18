//! Best-effort registry synchronisation
//!
//! Pushes never block the caller. Updates are queued and written in order by a
//! single worker; updates that pile up while a write is retried are folded
//! into one.

use crate::{
    config::RegistryConfig,
    registry_client::{RegistryClient, RegistryUpdate},
};
use log::{debug, error, warn};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl From<&RegistryConfig> for RetryPolicy {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RegistrySync {
    tx: Option<mpsc::UnboundedSender<RegistryUpdate>>,
}

impl RegistrySync {
    /// Spawn the write worker for `device_id`
    pub fn spawn<R>(client: R, device_id: String, retry: RetryPolicy) -> (Self, JoinHandle<()>)
    where
        R: RegistryClient + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(client, device_id, rx, retry));

        (Self { tx: Some(tx) }, worker)
    }

    /// A sink that drops every update
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn push(&self, update: RegistryUpdate) {
        let Some(tx) = &self.tx else {
            debug!("registry disabled, dropping {update:?}");
            return;
        };

        if tx.send(update).is_err() {
            error!("registry worker stopped, update dropped");
        }
    }
}

async fn run_worker<R>(
    client: R,
    device_id: String,
    mut rx: mpsc::UnboundedReceiver<RegistryUpdate>,
    retry: RetryPolicy,
) where
    R: RegistryClient,
{
    while let Some(mut update) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            update = update.merge(newer);
        }

        write_with_retry(&client, &device_id, &update, retry).await;
    }

    debug!("registry worker finished");
}

async fn write_with_retry<R>(client: &R, device_id: &str, update: &RegistryUpdate, retry: RetryPolicy)
where
    R: RegistryClient,
{
    let mut backoff = retry.backoff;

    for attempt in 1..=retry.attempts {
        match client.merge(device_id, update).await {
            Ok(()) => {
                debug!("registry updated: {update:?}");
                return;
            }
            Err(e) => warn!(
                "registry write attempt {attempt}/{} failed: {e:#}",
                retry.attempts
            ),
        }

        if attempt < retry.attempts {
            sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    error!("giving up registry write {update:?}, next status push will retry");
}
