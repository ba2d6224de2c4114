//! Admission control and deadline scaling.
//!
//! At most `capacity` jobs hold a slot at once; the rest wait in FIFO order.
//! Every job that has entered the gate, running or waiting, is counted as
//! outstanding, and that count sets how long a new job may take.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skewbot_common::error::{SkewError, SkewResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate shared by all renders in the process.
#[derive(Debug, Clone)]
pub struct RenderGate {
    slots: Arc<Semaphore>,
    capacity: usize,
    outstanding: Arc<AtomicUsize>,
}

impl RenderGate {
    /// Create a gate with `capacity` slots. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs that have entered the gate and not yet left, running or queued.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Jobs currently holding a slot.
    pub fn running(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Register a job. The returned ticket records the outstanding count
    /// including this job, and releases it when dropped.
    pub fn enqueue(&self) -> GateTicket {
        let at_entry = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        GateTicket {
            slots: self.slots.clone(),
            outstanding: self.outstanding.clone(),
            at_entry,
        }
    }
}

/// A job's place in the gate, before or while it holds a slot.
#[derive(Debug)]
pub struct GateTicket {
    slots: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    at_entry: usize,
}

impl GateTicket {
    /// Outstanding jobs, this one included, when the ticket was issued.
    pub fn outstanding_at_entry(&self) -> usize {
        self.at_entry
    }

    /// Wait for a slot. Waiters are admitted in arrival order.
    pub async fn admit(self) -> SkewResult<GatePermit> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SkewError::Cancelled)?;
        Ok(GatePermit {
            _permit: permit,
            _ticket: self,
        })
    }
}

impl Drop for GateTicket {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A held slot. Dropping it frees the slot and the outstanding count.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    _ticket: GateTicket,
}

/// Scales the base deadline by how far the queue is past capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    base: Duration,
}

impl TimeoutPolicy {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// `base * max(1, outstanding - capacity)`.
    pub fn deadline(&self, outstanding: usize, capacity: usize) -> Duration {
        let factor = outstanding.saturating_sub(capacity).max(1);
        self.base
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_bounds_running_jobs() {
        let gate = RenderGate::new(2);
        let a = gate.enqueue().admit().await.unwrap();
        let _b = gate.enqueue().admit().await.unwrap();
        assert_eq!(gate.running(), 2);

        let waiting = gate.enqueue();
        assert_eq!(waiting.outstanding_at_entry(), 3);
        let pending = tokio::spawn(async move { waiting.admit().await.map(|_| ()) });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        assert_eq!(gate.outstanding(), 3);

        drop(a);
        pending.await.unwrap().unwrap();
        assert_eq!(gate.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_dropping_queued_ticket_releases_count() {
        let gate = RenderGate::new(1);
        let _running = gate.enqueue().admit().await.unwrap();
        let queued = gate.enqueue();
        assert_eq!(gate.outstanding(), 2);

        let admit = tokio::spawn(queued.admit());
        tokio::task::yield_now().await;
        admit.abort();
        assert!(admit.await.unwrap_err().is_cancelled());

        assert_eq!(gate.outstanding(), 1);
        assert_eq!(gate.running(), 1);
    }

    #[tokio::test]
    async fn test_waiters_are_admitted_in_arrival_order() {
        let gate = RenderGate::new(1);
        let held = gate.enqueue().admit().await.unwrap();
        let admitted = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for index in 0..3 {
            let ticket = gate.enqueue();
            let admitted = admitted.clone();
            waiters.push(tokio::spawn(async move {
                let _permit = ticket.admit().await.unwrap();
                admitted.lock().unwrap().push(index);
                tokio::task::yield_now().await;
            }));
            // Let this waiter reach the semaphore queue before the next one.
            tokio::task::yield_now().await;
        }
        assert!(admitted.lock().unwrap().is_empty());
        assert_eq!(gate.outstanding(), 4);

        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*admitted.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(RenderGate::new(0).capacity(), 1);
    }

    #[test]
    fn test_deadline_scaling() {
        let policy = TimeoutPolicy::new(Duration::from_secs(5));
        let cases = [
            (1, 1, 1),
            (2, 1, 1),
            (3, 1, 2),
            (6, 1, 5),
            (4, 4, 1),
            (7, 4, 3),
            (0, 2, 1),
        ];
        for (outstanding, capacity, factor) in cases {
            assert_eq!(
                policy.deadline(outstanding, capacity),
                Duration::from_secs(5 * factor),
                "outstanding={outstanding} capacity={capacity}"
            );
        }
    }
}
