use std::{
    borrow::Cow,
    fmt::{self, Display},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{StreamExt, stream::FuturesUnordered};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle},
};
use tracing::{Instrument, debug, error, info, warn};

use crate::notify_once::NotifyOnce;

/// Errors that can occur when joining [`GwTask`]s.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Static task finished prematurely: {name}")]
    PrematureFinish { name: Cow<'static, str> },
    #[error("Some tasks failed to finish on time: {hung_tasks:?}")]
    Hung { hung_tasks: Vec<String> },
}

/// The gateway's 'standard' way of handling structured task concurrency and
/// shutdown.
///
/// - "static" tasks are intended to run until the end of the process
///   lifetime (the HTTP server's accept loop). To prevent partial failures,
///   this helper triggers a shutdown if any static task finishes
///   prematurely.
/// - "ephemeral" tasks finish on their own without causing the overall
///   program to exit (e.g. the Ctrl+C handler).
/// - All task handles are polled so that panics are propagated.
/// - After a shutdown signal is received, this helper waits for all
///   remaining tasks to complete, up to `shutdown_timeout`.
pub async fn try_join_tasks_and_shutdown(
    static_tasks: Vec<GwTask<()>>,
    mut eph_tasks_rx: mpsc::Receiver<GwTask<()>>,
    mut shutdown: NotifyOnce,
    shutdown_timeout: Duration,
) -> Result<(), Error> {
    if static_tasks.is_empty() {
        shutdown.recv().await;
        return Ok(());
    }

    let mut static_tasks = static_tasks
        .into_iter()
        .map(GwTask::logged)
        .collect::<FuturesUnordered<_>>();
    let mut ephemeral_tasks = FuturesUnordered::new();

    let mut result = Ok(());

    loop {
        tokio::select! {
            biased;
            () = shutdown.recv() => break,
            Some(task) = eph_tasks_rx.recv() => {
                debug!("Received ephemeral task: {name}", name = task.name());
                ephemeral_tasks.push(task.logged());
            }
            Some(name) = ephemeral_tasks.next() => {
                debug!("Ephemeral task finished: {name}");
            }
            Some(name) = static_tasks.next() => {
                result = Err(Error::PrematureFinish { name });
                break shutdown.send();
            }
        }
    }

    let mut all_tasks = static_tasks
        .into_iter()
        .chain(ephemeral_tasks)
        .collect::<FuturesUnordered<_>>();

    let shutdown_timeout_fut = tokio::time::sleep(shutdown_timeout);
    tokio::pin!(shutdown_timeout_fut);

    while !all_tasks.is_empty() {
        tokio::select! {
            Some(_name) = all_tasks.next() => (),
            () = &mut shutdown_timeout_fut => {
                let hung_tasks = all_tasks
                    .iter()
                    .map(|task| task.name().to_owned())
                    .collect::<Vec<_>>();
                return Err(Error::Hung { hung_tasks });
            }
        }
    }

    result
}

/// Shorthand to call [`try_join_tasks_and_shutdown`] and log any errors,
/// useful when the callsite needs a `Future<Output = ()> + Send + 'static`.
pub async fn join_tasks_and_shutdown(
    name: &str,
    static_tasks: Vec<GwTask<()>>,
    eph_tasks_rx: mpsc::Receiver<GwTask<()>>,
    shutdown: NotifyOnce,
    shutdown_timeout: Duration,
) {
    let result = try_join_tasks_and_shutdown(
        static_tasks,
        eph_tasks_rx,
        shutdown,
        shutdown_timeout,
    )
    .await;

    match result {
        Ok(()) => info!("{name} tasks finished."),
        Err(e) => error!("{name} tasks errored: {e:#}"),
    }
}

/// A thin wrapper around [`tokio::task::JoinHandle`] that:
///
/// 1. propagates panics instead of catching them.
/// 2. adds the `#[must_use]` lint so spawned tasks are joined or explicitly
///    detached.
///
/// [Structured Concurrency]: https://www.wikiwand.com/en/Structured_concurrency
#[must_use]
pub struct GwTask<T> {
    task: JoinHandle<T>,
    name: Cow<'static, str>,
}

/// A [`Future`] that wraps [`GwTask`] so its result is logged when it
/// finishes. The inner `T` is discarded; the output is the task's name.
pub struct LoggedGwTask<T>(GwTask<T>);

struct TaskOutputDisplay<'a> {
    name: &'a str,
    result: Result<(), &'a JoinError>,
}

impl<T> GwTask<T> {
    pub fn from_tokio(
        handle: JoinHandle<T>,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            task: handle,
            name: name.into(),
        }
    }

    /// Spawns a named task which inherits the current tracing span.
    #[inline]
    pub fn spawn<F>(name: impl Into<Cow<'static, str>>, future: F) -> GwTask<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let span = tracing::Span::current();
        Self::spawn_with_span(name, span, future)
    }

    /// Spawns a named task with a custom tracing span.
    #[inline]
    pub fn spawn_with_span<F>(
        name: impl Into<Cow<'static, str>>,
        span: tracing::Span,
        future: F,
    ) -> GwTask<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        debug!("Spawning task: {name}");
        Self {
            task: tokio::spawn(future.instrument(span)),
            name,
        }
    }

    /// Drop the task handle, letting it continue running in the background.
    #[inline]
    pub fn detach(self) {
        drop(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Instrument a [`GwTask`] so that its result is logged when it finishes.
    #[inline]
    pub fn logged(self) -> LoggedGwTask<T> {
        LoggedGwTask(self)
    }

    #[inline]
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl<T> Future for GwTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let result = match result {
            Ok(val) => Ok(val),
            Err(join_err) => match join_err.try_into_panic() {
                Ok(panic_reason) => {
                    error!("Task '{name}' panicked!", name = self.name());
                    std::panic::resume_unwind(panic_reason)
                }
                Err(join_err) => Err(join_err),
            },
        };

        Poll::Ready(result)
    }
}

impl<T> LoggedGwTask<T> {
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl<T> Future for LoggedGwTask<T> {
    type Output = Cow<'static, str>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            let msg = TaskOutputDisplay {
                name: self.name(),
                result: result.as_ref().map(|_| ()),
            };

            match &result {
                Ok(_) => info!("{msg}"),
                Err(e) if e.is_cancelled() => warn!("{msg}"),
                Err(_) => error!("{msg}"),
            }

            self.0.name.clone()
        })
    }
}

impl Display for TaskOutputDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_label = match &self.result {
            Ok(_) => "finished",
            Err(e) if e.is_cancelled() => "cancelled",
            Err(_) => "panicked",
        };

        write!(f, "Task '{name}' {join_label}", name = self.name)?;
        if let Err(e) = self.result {
            write!(f, ": {e:#}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn spawn_and_join() {
        let task = GwTask::spawn("test", async { 42 });
        assert_eq!(task.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn try_join_tasks_and_shutdown_on_signal() {
        let shutdown = NotifyOnce::new();
        let static_tasks = vec![GwTask::spawn("server", {
            let mut shutdown = shutdown.clone();
            async move {
                shutdown.recv().await;
            }
        })];
        let (_tx, rx) = mpsc::channel(1);

        let mut signal = shutdown.clone();
        signal.send();

        let result = try_join_tasks_and_shutdown(
            static_tasks,
            rx,
            shutdown,
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_ok());
    }
}
