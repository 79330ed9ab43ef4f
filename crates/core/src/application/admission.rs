// Admission Control
// Bounds how many execution environments may exist at once

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Held for the lifetime of one job; dropping it frees the slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Semaphore-backed admission layer in front of the lifecycle manager
pub struct AdmissionControl {
    slots: Arc<Semaphore>,
    max_slots: usize,
    acquire_timeout: Duration,
}

impl AdmissionControl {
    /// # Arguments
    /// * `max_slots` - Concurrent jobs allowed (at least 1)
    /// * `acquire_timeout` - How long a job may queue for a slot
    pub fn new(max_slots: usize, acquire_timeout: Duration) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
            acquire_timeout,
        }
    }

    /// Wait for a slot, or fail with `Throttled` once the timeout elapses
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.slots).acquire_owned(),
        )
        .await
        .map_err(|_| {
            warn!(
                max_slots = self.max_slots,
                timeout_ms = self.acquire_timeout.as_millis() as u64,
                "Admission queue timed out"
            );
            AppError::Throttled(format!(
                "all {} worker slots busy for {}ms",
                self.max_slots,
                self.acquire_timeout.as_millis()
            ))
        })?
        .map_err(|_| AppError::Throttled("admission closed".to_string()))?;

        debug!(available = self.available(), "Admission slot acquired");
        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Refuse new jobs and wait for in-flight ones to return their slots.
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let all = self.max_slots as u32;
        let drained = tokio::time::timeout(timeout, self.slots.acquire_many(all))
            .await
            .map(|res| res.is_ok())
            .unwrap_or(false);
        self.slots.close();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let admission = AdmissionControl::new(2, Duration::from_millis(20));

        let a = admission.acquire().await.unwrap();
        let _b = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);

        let err = admission.acquire().await.unwrap_err();
        assert!(matches!(err, AppError::Throttled(_)));

        drop(a);
        tokio_test::assert_ok!(admission.acquire().await);
    }

    #[tokio::test]
    async fn test_zero_slots_clamped_to_one() {
        let admission = AdmissionControl::new(0, Duration::from_millis(10));
        assert_eq!(admission.max_slots(), 1);
        tokio_test::assert_ok!(admission.acquire().await);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let admission = Arc::new(AdmissionControl::new(1, Duration::from_millis(10)));
        let permit = admission.acquire().await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(permit);
        });

        assert!(admission.drain(Duration::from_secs(1)).await);
        tokio_test::assert_err!(admission.acquire().await);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let admission = AdmissionControl::new(1, Duration::from_millis(10));
        let _permit = admission.acquire().await.unwrap();

        assert!(!admission.drain(Duration::from_millis(20)).await);
    }
}
