//! Fixed-size worker pool with explicit task handles.
//!
//! Jobs are blocking closures. At most `size` of them run at once on the
//! runtime's blocking threads; the rest queue on a semaphore. Each
//! submission returns a [`TaskHandle`] through which the result (or the
//! panic) is collected. Workers never touch shared manager state.

use std::{
    any::Any,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Semaphore, watch};

use crate::JobError;

type Slot<T> = Arc<Mutex<Option<Result<T, JobError>>>>;

/// Completion handle of one submitted job.
pub struct TaskHandle<T> {
    done: watch::Receiver<bool>,
    slot: Slot<T>,
}

impl<T> TaskHandle<T> {
    /// Whether the job has finished (successfully or not).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let reported = *self.done.borrow();
        reported || self.done.has_changed().is_err()
    }

    /// Takes the result if the job has finished.
    ///
    /// Returns `None` while the job is still running, and also after the
    /// result has been taken once.
    pub fn try_take(&self) -> Option<Result<T, JobError>> {
        if !self.is_finished() {
            return None;
        }
        let taken = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let reported = *self.done.borrow();
        if taken.is_none() && !reported {
            // The driving task went away without reporting.
            return Some(Err(JobError::Cancelled));
        }
        taken
    }

    /// Resolves once the job has finished. Does not consume the result.
    pub fn finished(&self) -> impl Future<Output = ()> + Send + use<T> {
        let mut done = self.done.clone();
        async move {
            // An error means the sender is gone, which also counts as done.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }
}

/// A fixed number of concurrent blocking workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of workers.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Queues `job` and returns its completion handle.
    ///
    /// Must be called from within a tokio runtime. A panicking job is
    /// reported as [`JobError::Panicked`].
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, JobError> + Send + 'static,
    {
        let (tx, done) = watch::channel(false);
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let task_slot = Arc::clone(&slot);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => {
                    let result = match tokio::task::spawn_blocking(job).await {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => Err(JobError::Panicked {
                            message: panic_message(&*e.into_panic()),
                        }),
                        Err(_) => Err(JobError::Cancelled),
                    };
                    drop(permit);
                    result
                }
                Err(_) => Err(JobError::Cancelled),
            };
            *task_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            tx.send_replace(true);
        });

        TaskHandle { done, slot }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn returns_result_through_handle() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(|| Ok(21 * 2));
        handle.finished().await;
        assert!(handle.is_finished());
        assert_eq!(handle.try_take().unwrap().unwrap(), 42);
        assert!(handle.try_take().is_none());
    }

    #[tokio::test]
    async fn captures_panics() {
        let pool = WorkerPool::new(1);
        let handle = pool.submit::<(), _>(|| panic!("worker exploded"));
        handle.finished().await;
        match handle.try_take() {
            Some(Err(JobError::Panicked { message })) => assert_eq!(message, "worker exploded"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unfinished_job_has_no_result() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let handle = pool.submit(move || {
            rx.recv().ok();
            Ok(())
        });
        assert!(handle.try_take().is_none());
        tx.send(()).unwrap();
        handle.finished().await;
        assert!(handle.try_take().unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn never_exceeds_pool_size() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for handle in &handles {
            handle.finished().await;
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(handles.iter().all(|h| h.try_take().unwrap().is_ok()));
    }
}
