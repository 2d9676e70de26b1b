//! # Launcher
//!
//! The process-level entry point. Services are registered explicitly; the
//! first command-line argument decides between installing them and running
//! them until shutdown.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;

use crate::bootstrap::Bootstrapper;
use crate::bootstrap::ServiceDefinition;
use crate::bootstrap::ServiceHandle;
use crate::environment::Environment;

/// Argument that selects the install path.
pub const INSTALL_TOKEN: &str = "install";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Install,
    Run,
}

impl Invocation {
    /// Reads the invocation from process arguments, program name first.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match args.into_iter().nth(1) {
            Some(arg) if arg.as_ref() == INSTALL_TOKEN => Self::Install,
            _ => Self::Run,
        }
    }
}

pub struct Launcher {
    env: Arc<Environment>,
    services: Vec<Bootstrapper>,
}

impl Launcher {
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            services: Vec::new(),
        }
    }

    /// A launcher on the process-wide [`Environment::global`].
    pub fn global() -> Self {
        Self::new(Environment::global())
    }

    pub fn register(mut self, definition: ServiceDefinition) -> Self {
        self.services
            .push(Bootstrapper::new(definition, Arc::clone(&self.env)));
        self
    }

    pub fn services(&self) -> &[Bootstrapper] {
        &self.services
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Runs initial deployment for every registered service, in order.
    pub async fn install(&self) -> anyhow::Result<()> {
        for service in &self.services {
            service
                .initial_deployment()
                .await
                .with_context(|| format!("installing {}", service.name()))?;
        }
        tracing::info!(services = self.services.len(), "installation complete");
        Ok(())
    }

    /// Builds and starts every registered service.
    ///
    /// If one fails, the services already running are stopped before the
    /// error is returned.
    pub async fn start_all(&self) -> anyhow::Result<RunningServices> {
        let mut running = RunningServices::default();

        for service in &self.services {
            let handle = match service.build_hosted_service().await {
                Ok(handle) => handle,
                Err(e) => {
                    running.stop_all().await;
                    return Err(e).with_context(|| format!("building {}", service.name()));
                }
            };
            if let Err(e) = service.on_started(&handle).await {
                service.on_stopped(handle).await;
                running.stop_all().await;
                return Err(e).with_context(|| format!("starting {}", service.name()));
            }
            running.services.push((service.clone(), handle));
        }

        tracing::info!(services = running.len(), "all services started");
        Ok(running)
    }

    /// Dispatches on `args`. For a normal run, services stay up until
    /// `shutdown` resolves.
    pub async fn run<I, S, F>(&self, args: I, shutdown: F) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Future<Output = ()>,
    {
        crate::logging::init();

        match Invocation::from_args(args) {
            Invocation::Install => self.install().await,
            Invocation::Run => {
                let running = self.start_all().await?;
                shutdown.await;
                tracing::info!("shutdown requested");
                running.stop_all().await;
                Ok(())
            }
        }
    }
}

/// Services started by [`Launcher::start_all`], in start order.
#[derive(Default)]
pub struct RunningServices {
    services: Vec<(Bootstrapper, ServiceHandle)>,
}

impl RunningServices {
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.services.iter().map(|(_, handle)| handle)
    }

    /// Stops every service, most recently started first.
    pub async fn stop_all(mut self) {
        while let Some((service, handle)) = self.services.pop() {
            service.on_stopped(handle).await;
        }
    }
}
