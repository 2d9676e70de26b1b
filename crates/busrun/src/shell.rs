//! # Host Shell
//!
//! The object living inside an isolation context. It owns exactly one bus,
//! turns a consumer type into a bus configuration, and walks a strictly
//! linear lifecycle:
//!
//! ```text
//! Created --configure--> Configured --start--> Started --stop--> Stopped
//!    \______________________|____________________|__________________|
//!                                 dispose (any state) --> Disposed
//! ```
//!
//! Every transition is guarded against the current [`ShellState`]; there is
//! no way back out of `Disposed`.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use busaddr::Protocol;
use busaddr::TypeName;

use crate::bus::BootstrapPolicy;
use crate::bus::BusConfiguration;
use crate::bus::BusError;
use crate::bus::ServiceBus;
use crate::environment::Environment;
use crate::namer::EndpointNamer;
use crate::namer::NamerError;
use crate::overlay;
use crate::overlay::OverlayError;
use crate::ports::PortError;
use crate::scanner::Assembly;
use crate::scanner::ConsumerDescriptor;
use crate::scanner::scan_consumers;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShellState {
    Created,
    Configured,
    Started,
    Stopped,
    Disposed,
}

impl std::fmt::Display for ShellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Why building a bus configuration failed. The shell stays `Created`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    NoConsumer,
    UnknownConsumer { consumer: TypeName, assembly: String },
    Namer(NamerError),
    Overlay(OverlayError),
    Bus(BusError),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConsumer => write!(f, "No message consumer type set"),
            Self::UnknownConsumer { consumer, assembly } => {
                write!(f, "Consumer {} is not registered in assembly '{}'", consumer, assembly)
            }
            Self::Namer(e) => write!(f, "Endpoint derivation failed: {}", e),
            Self::Overlay(e) => write!(f, "Configuration overlay failed: {}", e),
            Self::Bus(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<NamerError> for ConfigurationError {
    fn from(e: NamerError) -> Self {
        Self::Namer(e)
    }
}

impl From<OverlayError> for ConfigurationError {
    fn from(e: OverlayError) -> Self {
        Self::Overlay(e)
    }
}

impl From<PortError> for ConfigurationError {
    fn from(e: PortError) -> Self {
        Self::Namer(NamerError::Ports(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    InvalidState { operation: &'static str, state: ShellState },
    /// Initial deployment and start cannot both run on one shell.
    AlreadyDeployed,
    Configuration(ConfigurationError),
    Bus(BusError),
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState { operation, state } => {
                write!(f, "Cannot {} a host shell that is {}", operation, state)
            }
            Self::AlreadyDeployed => write!(f, "Host shell already ran initial deployment"),
            Self::Configuration(e) => write!(f, "Configuration error: {}", e),
            Self::Bus(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<ConfigurationError> for ShellError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<BusError> for ShellError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

struct ConsumerBinding {
    consumer: TypeName,
    assembly: Arc<Assembly>,
}

pub struct HostShell {
    env: Arc<Environment>,
    protocol: Protocol,
    bus: Option<Box<dyn ServiceBus>>,
    binding: Option<ConsumerBinding>,
    override_file: Option<PathBuf>,
    configuration: Option<BusConfiguration>,
    state: ShellState,
    deployed: bool,
}

impl HostShell {
    pub fn new(env: Arc<Environment>, protocol: Protocol, bus: Box<dyn ServiceBus>) -> Self {
        Self {
            env,
            protocol,
            bus: Some(bus),
            binding: None,
            override_file: None,
            configuration: None,
            state: ShellState::Created,
            deployed: false,
        }
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    /// The configuration handed to the bus by the last successful
    /// [`configure`](Self::configure).
    pub fn configuration(&self) -> Option<&BusConfiguration> {
        self.configuration.as_ref()
    }

    /// The consumer type this shell hosts, for logs.
    pub fn identity(&self) -> String {
        match &self.binding {
            Some(binding) => binding.consumer.to_string(),
            None => "<unbound>".to_string(),
        }
    }

    pub fn set_consumer_type(&mut self, consumer: TypeName, assembly: Arc<Assembly>) -> Result<()> {
        self.require_state("bind", ShellState::Created)?;
        self.binding = Some(ConsumerBinding { consumer, assembly });
        Ok(())
    }

    /// Sets the standalone override file. `None` means "no overrides".
    pub fn set_override_file(&mut self, path: Option<PathBuf>) -> Result<()> {
        self.require_state("set the override file of", ShellState::Created)?;
        self.override_file = path;
        Ok(())
    }

    /// Builds the bus configuration and hands it to the bus.
    ///
    /// On failure the shell stays `Created` and may be configured again once
    /// the cause is fixed.
    pub fn configure(&mut self) -> Result<()> {
        self.require_state("configure", ShellState::Created)?;

        let configuration = self.build_configuration()?;
        let bus = self.bus.as_mut().ok_or(ShellError::InvalidState {
            operation: "configure",
            state: self.state,
        })?;
        bus.configure(configuration.clone())
            .map_err(ConfigurationError::Bus)?;

        tracing::info!(
            consumer = %self.identity(),
            send = %configuration.send_endpoint,
            receives = configuration.receive_endpoints.len(),
            "host configured"
        );
        self.configuration = Some(configuration);
        self.state = ShellState::Configured;
        Ok(())
    }

    fn build_configuration(&self) -> std::result::Result<BusConfiguration, ConfigurationError> {
        let binding = self.binding.as_ref().ok_or(ConfigurationError::NoConsumer)?;
        if !binding.assembly.contains(&binding.consumer) {
            return Err(ConfigurationError::UnknownConsumer {
                consumer: binding.consumer.clone(),
                assembly: binding.assembly.name().to_string(),
            });
        }

        let consumers: Vec<ConsumerDescriptor> = scan_consumers(&binding.assembly).collect();

        let mut namer = EndpointNamer::new(self.protocol, self.env.config().host.as_str());
        if self.protocol.requires_port() {
            namer = namer.with_ports(self.env.port_allocator()?);
        }

        // The hosted consumer first, then every scanned consumer, derived in
        // one allocator session.
        let mut types = Vec::with_capacity(consumers.len() + 1);
        types.push(binding.consumer.clone());
        types.extend(consumers.iter().map(|c| c.consumer_type.clone()));
        let mut endpoints = namer.derive_all(&types)?.into_iter();

        let send = endpoints.next().ok_or(ConfigurationError::NoConsumer)?;
        let mut configuration = BusConfiguration::new(send);
        for (descriptor, endpoint) in consumers.iter().zip(endpoints) {
            for message in &descriptor.message_types {
                configuration = configuration.receive(message.clone(), endpoint.clone());
            }
        }

        Ok(overlay::patch(configuration, self.override_file.as_deref())?)
    }

    /// Starts message processing under `policy`. Legal once, from
    /// `Configured`.
    pub fn start(&mut self, policy: &BootstrapPolicy) -> Result<()> {
        self.require_state("start", ShellState::Configured)?;
        if self.deployed {
            return Err(ShellError::AlreadyDeployed);
        }
        let bus = self.bus.as_mut().ok_or(ShellError::InvalidState {
            operation: "start",
            state: self.state,
        })?;
        bus.start(policy)?;

        self.state = ShellState::Started;
        tracing::info!(consumer = %self.identity(), policy = %policy.id(), "host started");
        Ok(())
    }

    /// One-time provisioning. Legal from `Configured` and leaves the state
    /// untouched, but rules out a later [`start`](Self::start).
    pub fn initial_deployment(&mut self, policy: &BootstrapPolicy, principal: &str) -> Result<()> {
        self.require_state("deploy", ShellState::Configured)?;
        if self.deployed {
            return Err(ShellError::AlreadyDeployed);
        }
        let bus = self.bus.as_mut().ok_or(ShellError::InvalidState {
            operation: "deploy",
            state: self.state,
        })?;
        bus.initial_deployment(policy, principal)?;

        self.deployed = true;
        tracing::info!(
            consumer = %self.identity(),
            policy = %policy.id(),
            principal,
            "initial deployment complete"
        );
        Ok(())
    }

    /// Stops message processing and releases the bus. The shell is
    /// `Stopped` afterwards even if the bus reports a shutdown failure.
    pub fn stop(&mut self) -> Result<()> {
        self.require_state("stop", ShellState::Started)?;
        self.state = ShellState::Stopped;
        self.release_bus()
    }

    /// Releases the bus and everything else the shell holds. Legal from any
    /// state; calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.state == ShellState::Disposed {
            return;
        }
        let outcome = self.release_bus();
        self.state = ShellState::Disposed;
        match outcome {
            Ok(()) => tracing::info!(consumer = %self.identity(), "host disposed"),
            Err(e) => {
                tracing::warn!(consumer = %self.identity(), error = %e, "host disposed with errors")
            }
        }
    }

    fn release_bus(&mut self) -> Result<()> {
        match self.bus.take() {
            Some(mut bus) => Ok(bus.dispose()?),
            None => Ok(()),
        }
    }

    fn require_state(&self, operation: &'static str, state: ShellState) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(ShellError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub fn override_file(&self) -> Option<&Path> {
        self.override_file.as_deref()
    }
}

impl Drop for HostShell {
    fn drop(&mut self) {
        self.dispose();
    }
}
