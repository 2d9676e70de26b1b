//! # In-memory recording bus
//!
//! A [`ServiceBus`] that performs no I/O and records every call it receives.
//! The [`BusProbe`] side stays with the caller, so whatever happened inside
//! an isolation context can be inspected from outside it.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::bus::BootstrapPolicy;
use crate::bus::BusConfiguration;
use crate::bus::BusError;
use crate::bus::BusFactory;
use crate::bus::Result;
use crate::bus::ServiceBus;

/// One call observed by a [`RecordingBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Configured(BusConfiguration),
    Started { policy: String },
    Deployed { policy: String, principal: String },
    Disposed,
}

#[derive(Default)]
struct ProbeState {
    events: Vec<BusEvent>,
    fail_start: Option<String>,
    fail_dispose: Option<String>,
}

/// Caller-side view of every [`RecordingBus`] built from it.
#[derive(Clone, Default)]
pub struct BusProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl BusProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory producing buses that report to this probe.
    pub fn factory(&self) -> BusFactory {
        let probe = self.clone();
        Arc::new(move || Box::new(RecordingBus::new(probe.clone())) as Box<dyn ServiceBus>)
    }

    /// Makes every subsequent `start` fail with `reason`.
    pub fn fail_start(&self, reason: impl Into<String>) {
        self.lock().fail_start = Some(reason.into());
    }

    /// Makes every subsequent `dispose` fail with `reason`.
    pub fn fail_dispose(&self, reason: impl Into<String>) {
        self.lock().fail_dispose = Some(reason.into());
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().events.clone()
    }

    /// The most recent configuration any bus received.
    pub fn last_configuration(&self) -> Option<BusConfiguration> {
        self.lock().events.iter().rev().find_map(|event| match event {
            BusEvent::Configured(config) => Some(config.clone()),
            _ => None,
        })
    }

    pub fn count(&self, matches: impl Fn(&BusEvent) -> bool) -> usize {
        self.lock().events.iter().filter(|e| matches(e)).count()
    }

    fn record(&self, event: BusEvent) {
        self.lock().events.push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct RecordingBus {
    probe: BusProbe,
}

impl RecordingBus {
    pub fn new(probe: BusProbe) -> Self {
        Self { probe }
    }
}

impl ServiceBus for RecordingBus {
    fn configure(&mut self, configuration: BusConfiguration) -> Result<()> {
        self.probe.record(BusEvent::Configured(configuration));
        Ok(())
    }

    fn start(&mut self, policy: &BootstrapPolicy) -> Result<()> {
        if let Some(reason) = self.probe.lock().fail_start.clone() {
            return Err(BusError::Start(reason));
        }
        self.probe.record(BusEvent::Started {
            policy: policy.id().to_string(),
        });
        Ok(())
    }

    fn initial_deployment(&mut self, policy: &BootstrapPolicy, principal: &str) -> Result<()> {
        self.probe.record(BusEvent::Deployed {
            policy: policy.id().to_string(),
            principal: principal.to_string(),
        });
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        self.probe.record(BusEvent::Disposed);
        match self.probe.lock().fail_dispose.clone() {
            Some(reason) => Err(BusError::Shutdown(reason)),
            None => Ok(()),
        }
    }
}
