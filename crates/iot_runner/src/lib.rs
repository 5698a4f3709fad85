//! Runs the long-lived processes of a service side by side and shuts them
//! down together.
//!
//! Every app process receives the same [`CancellationToken`]. The token is
//! cancelled on SIGINT/SIGTERM, when a process fails, or when the caller
//! cancels it. Closers then run once, bounded by a timeout, whatever the
//! outcome.
//!
//! ```no_run
//! use iot_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(if result.is_ok() { 0 } else { 1 });
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process; resolves when it finishes or is cancelled.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup run after every app process has stopped.
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

pub struct Runner {
    app_processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// A runner with a 10 second closer timeout that listens for signals.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    pub fn with_app_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push(Box::new(|token| Box::pin(process(token))));
        self
    }

    /// Add an already boxed process, as returned by `into_runner_process`
    pub fn with_boxed_app_process(mut self, process: AppProcess) -> Self {
        self.app_processes.push(process);
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Do not install SIGINT/SIGTERM handlers; shutdown then only happens
    /// through the token or a failing process.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run every process until shutdown, then the closers.
    ///
    /// Returns the first process error, if any.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for process in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move { process(process_token).await });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    tracing::debug!("app process completed");
                }
                Ok(Err(err)) => {
                    if !token.is_cancelled() {
                        tracing::error!("app process error: {:#}", err);
                        first_error = Some(err);
                        token.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!("app process panicked: {}", err);
                    if !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                        token.cancel();
                    }
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        // give the remaining processes a chance to observe the cancellation
        token.cancel();
        while let Some(result) = join_set.join_next().await {
            if let Ok(Err(err)) = result {
                tracing::debug!("app process stopped with error after shutdown: {:#}", err);
            }
        }

        if !self.closers.is_empty() {
            tracing::info!("running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                tracing::info!("all processes stopped");
                Ok(())
            }
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => tracing::error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => tracing::error!("error setting up SIGTERM handler: {}", err),
        }
    });
}

/// Closers run concurrently; a failing closer does not stop the others.
async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!("closer error: {:#}", err),
            Err(err) => tracing::error!("closer panicked: {}", err),
        }
    }
}
