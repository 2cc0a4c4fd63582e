use std::{
    any::Any,
    fmt::{Display, Formatter},
    future::Future,
    panic,
    pin::pin,
    sync::Arc,
    time::Duration,
};

use futures_util::{
    future::{select, Either},
    FutureExt,
};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    pending_tasks::PendingTasks,
    shutdown::{Shutdown, ShutdownGuard, ShutdownSignal},
};

/// Reason a critical task stopped the process, with the name of the task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task panicked; the payload is downcasted to a string, if possible.
    Panicked {
        task_name: String,
        error: Option<String>,
    },

    /// The task returned an error.
    Failed { task_name: String, error: String },
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Panicked {
                task_name,
                error: Some(error),
            } => write!(f, "Critical task `{task_name}` panicked: `{error}`"),
            Self::Panicked {
                task_name,
                error: None,
            } => write!(f, "Critical task `{task_name}` panicked"),
            Self::Failed { task_name, error } => {
                write!(f, "Critical task `{task_name}` failed: {error}")
            }
        }
    }
}

impl TaskError {
    fn panicked(task_name: &str, error: Box<dyn Any + Send>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(value) => Some(*value),
            Err(error) => match error.downcast::<&str>() {
                Ok(value) => Some(value.to_string()),
                Err(_) => None,
            },
        };

        Self::Panicked {
            task_name: task_name.to_string(),
            error,
        }
    }

    fn failed(task_name: &str, error: anyhow::Error) -> Self {
        Self::Failed {
            task_name: task_name.to_string(),
            error: format!("{error:#}"),
        }
    }

    pub fn task_name(&self) -> &str {
        match self {
            Self::Panicked { task_name, .. } | Self::Failed { task_name, .. } => task_name,
        }
    }
}

/// [`TaskManager`] spawns and tracks long running tasks,
/// watches for task failures and manages graceful shutdown
/// on critical task failures and external signals.
pub struct TaskManager {
    /// Tokio's runtime [`Handle`].
    tokio_handle: Handle,
    /// Channel's sender tasked with reporting failures from tasks.
    failed_tasks_tx: mpsc::UnboundedSender<TaskError>,
    /// Channel's receiver tasked with receiving failures from tasks.
    failed_tasks_rx: mpsc::UnboundedReceiver<TaskError>,
    /// Async-capable shutdown signal that can be sent to tasks.
    shutdown_signal: ShutdownSignal,
    /// Tasks holding a [`ShutdownGuard`], waited on during graceful shutdown.
    pending_tasks: Arc<PendingTasks>,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (failed_tasks_tx, failed_tasks_rx) = mpsc::unbounded_channel();

        Self {
            tokio_handle,
            failed_tasks_tx,
            failed_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
            pending_tasks: Arc::new(PendingTasks::new(0)),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor::new(
            self.tokio_handle.clone(),
            self.failed_tasks_tx.clone(),
            self.shutdown_signal.clone(),
            self.pending_tasks.clone(),
        )
    }

    /// waits until any task fails, returns `Err(first_error)`
    /// returns `Ok(())` if shutdown message is received instead
    fn wait_for_task_failure(&mut self, shutdown: Shutdown) -> Result<(), TaskError> {
        self.tokio_handle.block_on(async {
            tokio::select! {
                msg = self.failed_tasks_rx.recv() => {
                    match msg {
                        Some(error) => Err(error),
                        None => Ok(())
                    }
                }
                _ = shutdown.wait_for_shutdown() => {
                    Ok(())
                }
            }
        })
    }

    /// Get shutdown signal trigger
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Wait for all guarded tasks to complete, returning true.
    /// If timeout is provided, wait until timeout;
    /// return false if tasks have not completed by this time.
    fn wait_for_graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let wait = self.pending_tasks.clone().wait_for_zero();

        let finished = self.tokio_handle.block_on(async move {
            match timeout {
                Some(t) => tokio::time::timeout(t, wait).await.is_ok(),
                None => {
                    wait.await;
                    true
                }
            }
        });

        if finished {
            debug!("gracefully shut down");
        } else {
            debug!(
                remaining = self.pending_tasks.current(),
                "graceful shutdown timed out"
            );
        }
        finished
    }

    /// Add signal listeners (INT, and TERM on unix) and send shutdown when one arrives.
    pub fn start_signal_listeners(&self) {
        let shutdown_signal = self.shutdown_signal();

        self.tokio_handle.spawn(async move {
            let signal = wait_for_termination_signal().await;

            warn!(%signal, "Got termination signal. Initiating shutdown");
            shutdown_signal.send()
        });
    }

    /// Blocks until either a critical task fails or shutdown is requested, then signals every
    /// task to stop and waits for the guarded ones.
    pub fn monitor(mut self, shutdown_timeout: Option<Duration>) -> Result<(), TaskError> {
        let res = self.wait_for_task_failure(self.shutdown_signal.subscribe());

        self.shutdown_signal.send();
        let shutdown_in_time = self.wait_for_graceful_shutdown(shutdown_timeout);

        if !shutdown_in_time {
            info!("Shutdown timeout expired; Forced shutdown");
        }

        res
    }
}

async fn wait_for_termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "INT",
                _ = term.recv() => "TERM",
            },
            Err(err) => {
                warn!(%err, "could not install TERM handler, listening for INT only");
                let _ = tokio::signal::ctrl_c().await;
                "INT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "INT"
    }
}

/// A type that can spawn new tasks
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    /// Handle to the tokio runtime.
    tokio_handle: Handle,
    /// Sender half for reporting failures from tasks
    failed_tasks_tx: mpsc::UnboundedSender<TaskError>,
    /// send shutdown signals to tasks
    shutdown_signal: ShutdownSignal,
    /// tasks holding a shutdown guard
    pending_tasks: Arc<PendingTasks>,
}

impl TaskExecutor {
    fn new(
        tokio_handle: Handle,
        failed_tasks_tx: mpsc::UnboundedSender<TaskError>,
        shutdown_signal: ShutdownSignal,
        pending_tasks: Arc<PendingTasks>,
    ) -> Self {
        Self {
            tokio_handle,
            failed_tasks_tx,
            shutdown_signal,
            pending_tasks,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.tokio_handle
    }

    /// Trigger for the shutdown of every task spawned through this executor.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Spawn future as task inside tokio runtime.
    /// The task is dropped once shutdown is signalled.
    /// Returning an error or panicking will trigger shutdown.
    pub fn spawn_critical_async(
        &self,
        name: &'static str,
        fut: impl Future<Output = anyhow::Result<()>> + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        let failed_tasks_tx = self.failed_tasks_tx.clone();
        let shutdown = self.shutdown_signal.subscribe();

        let task = async move {
            let task = pin!(catch_task_failure(name, fut, failed_tasks_tx));
            let shutdown = pin!(shutdown.wait_for_shutdown());
            if let Either::Left(_) = select(shutdown, task).await {
                debug!(%name, "critical task dropped on shutdown");
            }
        };
        info!(%name, "Starting critical async task");
        self.tokio_handle.spawn(task)
    }

    /// Spawn future in tokio runtime.
    /// Should check `ShutdownGuard` passed to closure to trigger own shutdown manually.
    /// Returning an error or panicking will trigger shutdown.
    pub fn spawn_critical_async_with_shutdown<F>(
        &self,
        name: &'static str,
        async_func: impl FnOnce(ShutdownGuard) -> F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let failed_tasks_tx = self.failed_tasks_tx.clone();
        let shutdown = ShutdownGuard::new(
            self.shutdown_signal.subscribe(),
            self.pending_tasks.clone(),
        );
        let fut = async_func(shutdown);

        info!(%name, "Starting critical async task");
        self.tokio_handle
            .spawn(catch_task_failure(name, fut, failed_tasks_tx))
    }
}

async fn catch_task_failure(
    name: &'static str,
    fut: impl Future<Output = anyhow::Result<()>>,
    failed_tasks_tx: mpsc::UnboundedSender<TaskError>,
) {
    let task_error = match panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {
            debug!(%name, "critical task exited");
            return;
        }
        Ok(Err(err)) => TaskError::failed(name, err),
        Err(payload) => TaskError::panicked(name, payload),
    };

    error!(%name, err = %task_error, "critical task failed");
    let _ = failed_tasks_tx.send(task_error);
}
