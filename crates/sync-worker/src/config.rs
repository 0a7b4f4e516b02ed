use std::time::Duration;

/// Poll loop tuning for [`SyncWorker`](crate::SyncWorker).
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Delay between claim attempts.
    pub poll_interval: Duration,
    /// Maximum rows claimed per tick.
    pub batch_size: usize,
    /// Key that unseals stored destination credentials. Destinations
    /// without credentials work without it.
    pub credential_key: Option<[u8; 32]>,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            credential_key: None,
        }
    }
}

impl SyncWorkerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_credential_key(mut self, key: [u8; 32]) -> Self {
        self.credential_key = Some(key);
        self
    }
}
