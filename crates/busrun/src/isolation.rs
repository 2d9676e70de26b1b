//! # Isolation Context
//!
//! Each hosted service runs its [`HostShell`] on a dedicated, named thread.
//! The shell is built on that thread and never leaves it; callers reach it
//! through [`IsolationContext::exec`], which ships a closure over a channel
//! and awaits the answer with a deadline, effectively a blocking RPC into
//! the context.
//!
//! A panic inside the context is caught at the boundary. The caller receives
//! [`IsolationError::Crashed`], the context stops serving, and nothing on
//! the caller's side is affected.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::environment::ContextId;
use crate::environment::Environment;
use crate::shell::HostShell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolationError {
    /// The context thread could not be started.
    Spawn(String),
    /// The context has shut down and accepts no more calls.
    Terminated(ContextId),
    /// A call panicked inside the context.
    Crashed { context: ContextId, message: String },
    /// No answer arrived before the deadline.
    Timeout { context: ContextId, after: Duration },
}

impl std::fmt::Display for IsolationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to spawn isolation context: {}", msg),
            Self::Terminated(id) => write!(f, "Isolation context {} has terminated", id),
            Self::Crashed { context, message } => {
                write!(f, "Isolation context {} crashed: {}", context, message)
            }
            Self::Timeout { context, after } => {
                write!(f, "Isolation context {} did not answer within {:?}", context, after)
            }
        }
    }
}

impl std::error::Error for IsolationError {}

pub type Result<T> = std::result::Result<T, IsolationError>;

/// Work for the context thread. Returns `true` when the work panicked.
type Job = Box<dyn FnOnce(&mut HostShell) -> bool + Send>;

/// Signals the owner when the context thread finishes, however it finishes.
struct ExitSignal(Option<oneshot::Sender<()>>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

pub struct IsolationContext {
    id: ContextId,
    name: String,
    env: Arc<Environment>,
    jobs: Option<mpsc::UnboundedSender<Job>>,
    exited: Option<oneshot::Receiver<()>>,
    call_timeout: Duration,
    unloaded: bool,
}

impl IsolationContext {
    /// Creates a context and builds its shell inside it with `factory`.
    ///
    /// The first context created in an environment becomes the owner of the
    /// shared port table.
    pub fn spawn<F>(env: Arc<Environment>, name: &str, factory: F) -> Result<Self>
    where
        F: FnOnce(Arc<Environment>) -> HostShell + Send + 'static,
    {
        let id = env.register_context(name);
        env.designate_owner(id);

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel::<Job>();
        let (exit_tx, exit_rx) = oneshot::channel();
        let thread_env = Arc::clone(&env);

        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", name, id))
            .spawn(move || serve(id, thread_env, factory, jobs_rx, ExitSignal(Some(exit_tx))));

        if let Err(e) = spawned {
            env.remove_context(id);
            return Err(IsolationError::Spawn(e.to_string()));
        }

        tracing::info!(context = %id, name, "isolation context created");
        let call_timeout = env.config().call_timeout;
        Ok(Self {
            id,
            name: name.to_string(),
            env,
            jobs: Some(jobs_tx),
            exited: Some(exit_rx),
            call_timeout,
            unloaded: false,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f` against the shell inside the context and returns its result.
    pub async fn exec<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut HostShell) -> R + Send + 'static,
        R: Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(IsolationError::Terminated(self.id))?;

        let (reply_tx, reply_rx) = oneshot::channel::<std::thread::Result<R>>();
        let job: Job = Box::new(move |shell| {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(shell)));
            let panicked = outcome.is_err();
            let _ = reply_tx.send(outcome);
            panicked
        });
        jobs.send(job).map_err(|_| IsolationError::Terminated(self.id))?;

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Err(_) => Err(IsolationError::Timeout {
                context: self.id,
                after: self.call_timeout,
            }),
            Ok(Err(_)) => Err(IsolationError::Terminated(self.id)),
            Ok(Ok(Err(panic))) => Err(IsolationError::Crashed {
                context: self.id,
                message: panic_message(panic.as_ref()),
            }),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    /// Tears the context down: the shell is disposed on its own thread and
    /// the context leaves the environment's registry.
    ///
    /// Waits at most `timeout` for the thread to finish. A thread that does
    /// not finish in time is abandoned; the context is deregistered either
    /// way.
    pub async fn unload(mut self, timeout: Duration) -> Result<()> {
        self.jobs.take();
        let exited = self.exited.take();
        self.unloaded = true;
        self.env.remove_context(self.id);

        let Some(exited) = exited else {
            return Ok(());
        };
        match tokio::time::timeout(timeout, exited).await {
            Ok(_) => {
                tracing::info!(context = %self.id, name = %self.name, "isolation context unloaded");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    context = %self.id,
                    name = %self.name,
                    ?timeout,
                    "isolation context did not wind down in time, abandoning it"
                );
                Err(IsolationError::Timeout {
                    context: self.id,
                    after: timeout,
                })
            }
        }
    }
}

impl Drop for IsolationContext {
    fn drop(&mut self) {
        if self.unloaded {
            return;
        }
        // Closing the channel lets the thread dispose its shell and exit.
        self.jobs.take();
        self.env.remove_context(self.id);
        tracing::debug!(context = %self.id, name = %self.name, "isolation context dropped");
    }
}

impl std::fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn serve<F>(
    id: ContextId,
    env: Arc<Environment>,
    factory: F,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    _exit: ExitSignal,
) where
    F: FnOnce(Arc<Environment>) -> HostShell,
{
    let mut shell = match catch_unwind(AssertUnwindSafe(|| factory(env))) {
        Ok(shell) => shell,
        Err(panic) => {
            tracing::error!(
                context = %id,
                error = %panic_message(panic.as_ref()),
                "host shell construction panicked"
            );
            return;
        }
    };

    while let Some(job) = jobs.blocking_recv() {
        if job(&mut shell) {
            tracing::error!(
                context = %id,
                consumer = %shell.identity(),
                "isolation context crashed, no longer serving"
            );
            break;
        }
    }

    if catch_unwind(AssertUnwindSafe(|| shell.dispose())).is_err() {
        tracing::error!(context = %id, "host shell panicked while disposing");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
