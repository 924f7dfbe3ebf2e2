use std::sync::Arc;

use tokio::sync::Semaphore;

/// Synchronization utility which sends a notification to all consumers
/// *once*, used for the gateway's shutdown signal.
///
/// - Multi-producer and multi-consumer - simply clone to get another handle.
/// - Every clone observes a signal at-most-once. If the signal has already
///   been sent, new clones can still observe it once.
/// - Consumers can receive signals that were sent prior to subscribing to
///   the channel (unlike [`tokio::sync::broadcast`]).
/// - It is safe to send a signal multiple times (e.g. by accident).
///
/// The implementation (ab)uses the fact that calling [`acquire`] on a
/// [`Semaphore`] with 0 permits only returns once the [`Semaphore`] has been
/// closed.
///
/// [`acquire`]: Semaphore::acquire
#[derive(Debug)]
pub struct NotifyOnce {
    inner: Arc<Semaphore>,
    have_recved: bool,
}

impl NotifyOnce {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(0)),
            have_recved: false,
        }
    }

    /// Send a signal, causing all actors waiting on this channel to complete
    /// their call to [`recv`](Self::recv).
    pub fn send(&self) {
        self.inner.close();
    }

    /// Wait for a signal.
    ///
    /// NOTE: if this handle has already observed a signal, this future will
    /// never return!
    pub async fn recv(&mut self) {
        if self.have_recved {
            std::future::pending().await
        } else {
            self.inner
                .acquire()
                .await
                .map_err(|_| ())
                .expect_err("Shouldn't've been able to acquire a permit");
            self.have_recved = true;
        }
    }

    /// Waits for a signal, taking ownership of the handle. Useful for
    /// graceful shutdown APIs which require `impl Future<Output = ()> + 'static`.
    pub async fn recv_owned(mut self) {
        self.recv().await
    }

    /// Immediately returns whether a signal has been sent, without consuming
    /// it for a later call to [`recv`](Self::recv).
    #[must_use]
    pub fn try_recv(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Clone for NotifyOnce {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            have_recved: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[test]
    fn multiple_sends_doesnt_panic() {
        let shutdown = NotifyOnce::new();
        shutdown.send();
        shutdown.send();
    }

    #[test]
    fn only_yields_shutdown_once() {
        let shutdown1 = NotifyOnce::new();
        let mut shutdown2 = shutdown1.clone();

        let mut recv_task = tokio_test::task::spawn(shutdown2.recv());
        assert_pending!(recv_task.poll());

        shutdown1.send();

        assert!(recv_task.is_woken());
        assert_ready!(recv_task.poll());
        drop(recv_task);

        let mut recv_task2 = tokio_test::task::spawn(shutdown2.recv());
        assert_pending!(recv_task2.poll());
        shutdown1.send();
        // still pending: this handle already observed a signal once.
        assert_pending!(recv_task2.poll());
        drop(recv_task2);

        let mut shutdown3 = shutdown2.clone();
        let mut recv_task3 = tokio_test::task::spawn(shutdown3.recv());
        assert_ready!(recv_task3.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_after_close_is_ok() {
        let shutdown1 = NotifyOnce::new();
        let mut shutdown2 = shutdown1.clone();
        time::sleep(Duration::from_secs(1)).await;
        shutdown1.send();
        time::timeout(Duration::from_nanos(1), shutdown2.recv())
            .await
            .expect("Did not finish immediately");

        let mut shutdown3 = shutdown2.clone();
        assert!(shutdown3.try_recv());
    }
}
