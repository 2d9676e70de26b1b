//! # Bootstrap Adapter
//!
//! Turns a [`ServiceDefinition`] into a running hosted service. A single,
//! non-generic [`Bootstrapper`] does this for any definition:
//!
//! - [`build_hosted_service`](Bootstrapper::build_hosted_service) spawns a
//!   fresh isolation context, builds the host shell inside it and configures
//!   it. If configuration fails the context is torn down before returning.
//! - [`on_started`](Bootstrapper::on_started) starts the shell under the
//!   definition's bootstrap policy.
//! - [`on_stopped`](Bootstrapper::on_stopped) stops and disposes the shell,
//!   then unloads the context. It never fails.
//! - [`initial_deployment`](Bootstrapper::initial_deployment) provisions the
//!   service in a throwaway context that is unloaded whatever happens.

use std::path::PathBuf;
use std::sync::Arc;

use busaddr::Protocol;
use busaddr::TypeName;

use crate::bus::BootstrapPolicy;
use crate::bus::BusConfiguration;
use crate::bus::BusFactory;
use crate::environment::ContextId;
use crate::environment::Environment;
use crate::environment::ServiceId;
use crate::isolation::IsolationContext;
use crate::isolation::IsolationError;
use crate::scanner::Assembly;
use crate::scanner::MessageConsumer;
use crate::shell::HostShell;
use crate::shell::ShellError;
use crate::shell::ShellState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// The isolation context failed, crashed or stopped answering.
    Isolation(IsolationError),
    /// The shell could not be configured. No context was left behind.
    Configuration(ShellError),
    Start(ShellError),
    Deployment(ShellError),
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolation(e) => write!(f, "{}", e),
            Self::Configuration(e) => write!(f, "Failed to build hosted service: {}", e),
            Self::Start(e) => write!(f, "Failed to start hosted service: {}", e),
            Self::Deployment(e) => write!(f, "Initial deployment failed: {}", e),
        }
    }
}

impl std::error::Error for BootstrapError {}

impl From<IsolationError> for BootstrapError {
    fn from(e: IsolationError) -> Self {
        Self::Isolation(e)
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// The consumer a service hosts and the assembly it was registered in.
#[derive(Clone, Debug)]
pub struct ConsumerType {
    pub name: TypeName,
    pub assembly: Arc<Assembly>,
}

impl ConsumerType {
    pub fn new(name: impl Into<TypeName>, assembly: Arc<Assembly>) -> Self {
        Self {
            name: name.into(),
            assembly,
        }
    }

    pub fn of<C: MessageConsumer>(assembly: Arc<Assembly>) -> Self {
        Self::new(C::type_name(), assembly)
    }
}

/// How to build the host shell inside a context.
#[derive(Clone)]
pub struct ShellSpec {
    pub protocol: Protocol,
    pub bus: BusFactory,
}

impl ShellSpec {
    pub fn new(protocol: Protocol, bus: BusFactory) -> Self {
        Self { protocol, bus }
    }

    fn build(&self, env: Arc<Environment>) -> HostShell {
        HostShell::new(env, self.protocol, (self.bus)())
    }
}

impl std::fmt::Debug for ShellSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSpec")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Everything needed to host one consumer.
#[derive(Clone, Debug)]
pub struct ServiceDefinition {
    pub consumer: ConsumerType,
    pub shell: ShellSpec,
    pub policy: BootstrapPolicy,
}

impl ServiceDefinition {
    pub fn new(consumer: ConsumerType, shell: ShellSpec) -> Self {
        Self {
            consumer,
            shell,
            policy: BootstrapPolicy::accept_all(),
        }
    }

    pub fn with_policy(mut self, policy: BootstrapPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Opaque handle on a built service, passed back to start and stop.
#[derive(Debug)]
pub struct ServiceHandle {
    id: ServiceId,
    name: String,
    context: IsolationContext,
}

impl ServiceHandle {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    pub async fn state(&self) -> std::result::Result<ShellState, IsolationError> {
        self.context.exec(|shell| shell.state()).await
    }

    /// The configuration the shell handed to its bus.
    pub async fn configuration(
        &self,
    ) -> std::result::Result<Option<BusConfiguration>, IsolationError> {
        self.context.exec(|shell| shell.configuration().cloned()).await
    }
}

#[derive(Clone, Debug)]
pub struct Bootstrapper {
    definition: ServiceDefinition,
    env: Arc<Environment>,
}

impl Bootstrapper {
    pub fn new(definition: ServiceDefinition, env: Arc<Environment>) -> Self {
        Self { definition, env }
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    /// Short consumer name, used for contexts, handles and the override file.
    pub fn name(&self) -> &str {
        self.definition.consumer.name.short_name()
    }

    /// Where the standalone override file for this consumer would live.
    pub fn configuration_path(&self) -> PathBuf {
        self.env.config().config_dir.join(format!("{}.config", self.name()))
    }

    /// The override file, unless it is known not to exist.
    ///
    /// A path that cannot be checked is still returned, so the overlay
    /// reports it instead of silently skipping the overrides.
    pub fn standalone_configuration_filename(&self) -> Option<PathBuf> {
        let path = self.configuration_path();
        match path.try_exists() {
            Ok(false) => None,
            Ok(true) | Err(_) => Some(path),
        }
    }

    pub async fn build_hosted_service(&self) -> Result<ServiceHandle> {
        let context = self.spawn_context()?;

        let outcome = context
            .exec(self.prepare())
            .await
            .map_err(BootstrapError::from)
            .and_then(|r| r.map_err(BootstrapError::Configuration));

        if let Err(e) = outcome {
            tracing::error!(
                service = %self.name(),
                context = %context.id(),
                error = %e,
                "failed to build hosted service"
            );
            self.discard(context).await;
            return Err(e);
        }

        let handle = ServiceHandle {
            id: self.env.next_service_id(),
            name: self.name().to_string(),
            context,
        };
        tracing::info!(
            service = %handle.id,
            name = %handle.name,
            context = %handle.context_id(),
            "hosted service built"
        );
        Ok(handle)
    }

    /// Starts the shell behind `handle`. Ports were claimed during
    /// configuration, so starting holds no lock on the port table.
    pub async fn on_started(&self, handle: &ServiceHandle) -> Result<()> {
        let policy = self.definition.policy.clone();
        handle
            .context
            .exec(move |shell| shell.start(&policy))
            .await?
            .map_err(BootstrapError::Start)?;

        tracing::info!(service = %handle.id, name = %handle.name, "hosted service started");
        Ok(())
    }

    /// Stops the service and unloads its context. Failures are logged; the
    /// context is released regardless.
    pub async fn on_stopped(&self, handle: ServiceHandle) {
        let ServiceHandle { id, name, context } = handle;

        let stopped = context
            .exec(|shell| {
                let outcome = match shell.state() {
                    ShellState::Started => shell.stop(),
                    _ => Ok(()),
                };
                shell.dispose();
                outcome
            })
            .await;
        match stopped {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    service = %id,
                    name = %name,
                    error = %e,
                    "hosted service stopped with errors"
                )
            }
            Err(e) => {
                tracing::warn!(
                    service = %id,
                    name = %name,
                    error = %e,
                    "hosted service context already gone"
                )
            }
        }

        self.discard(context).await;
        tracing::info!(service = %id, name = %name, "hosted service stopped");
    }

    /// Runs one-time provisioning in a throwaway context.
    pub async fn initial_deployment(&self) -> Result<()> {
        let context = self.spawn_context()?;
        let prepare = self.prepare();
        let policy = self.definition.policy.clone();
        let principal = self.env.config().deployment_principal();

        let outcome = context
            .exec(move |shell| {
                prepare(shell).map_err(BootstrapError::Configuration)?;
                shell
                    .initial_deployment(&policy, &principal)
                    .map_err(BootstrapError::Deployment)
            })
            .await
            .map_err(BootstrapError::from)
            .and_then(|r| r);

        self.discard(context).await;
        if let Err(e) = &outcome {
            tracing::error!(service = %self.name(), error = %e, "initial deployment failed");
        }
        outcome
    }

    fn spawn_context(&self) -> Result<IsolationContext> {
        let shell = self.definition.shell.clone();
        Ok(IsolationContext::spawn(Arc::clone(&self.env), self.name(), move |env| {
            shell.build(env)
        })?)
    }

    /// Binds the consumer and override file, then configures the shell.
    fn prepare(
        &self,
    ) -> impl FnOnce(&mut HostShell) -> std::result::Result<(), ShellError> + Send + 'static {
        let consumer = self.definition.consumer.clone();
        let override_file = self.standalone_configuration_filename();
        move |shell| {
            shell.set_consumer_type(consumer.name, consumer.assembly)?;
            shell.set_override_file(override_file)?;
            shell.configure()
        }
    }

    async fn discard(&self, context: IsolationContext) {
        if let Err(e) = context.unload(self.env.config().stop_timeout).await {
            tracing::warn!(
                service = %self.name(),
                error = %e,
                "isolation context unload incomplete"
            );
        }
    }
}
