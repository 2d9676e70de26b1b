//! # Port Allocator
//!
//! Protocols that listen on explicit ports need one port per endpoint. The
//! table mapping a port-less address to its port is created once, by the
//! first isolation context to initialize (the owner), and published in the
//! [`Environment`](crate::environment::Environment)'s owner slot. Every other
//! context resolves a [`PortAllocator`], a cheap proxy onto the owner's table.
//!
//! Once an address has a port, it keeps it for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use busaddr::EndpointAddress;

use crate::environment::ContextId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// No isolation context has been designated as the table owner yet.
    Unavailable,
    /// Every port above the base has been handed out.
    Exhausted { address: String },
    /// The counter cannot be re-based once ports have been handed out.
    AlreadyAssigned { count: usize },
}

impl std::fmt::Display for PortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => {
                write!(f, "Port allocator unavailable: no owner context designated")
            }
            Self::Exhausted { address } => write!(f, "No ports left to assign to {}", address),
            Self::AlreadyAssigned { count } => {
                write!(f, "Cannot re-base port counter: {} ports already assigned", count)
            }
        }
    }
}

impl std::error::Error for PortError {}

pub type Result<T> = std::result::Result<T, PortError>;

struct TableState {
    assignments: HashMap<EndpointAddress, u16>,
    // Wider than u16 so running past the last port is detectable.
    next_port: u32,
}

/// The owner's table. Only reachable through [`PortAllocator`].
pub(crate) struct PortTable {
    owner: ContextId,
    state: Mutex<TableState>,
}

impl PortTable {
    pub(crate) fn new(owner: ContextId, base_port: u16) -> Self {
        Self {
            owner,
            state: Mutex::new(TableState {
                assignments: HashMap::new(),
                next_port: u32::from(base_port),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        // Every mutation leaves the table consistent, so a poisoned lock is
        // still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle onto the shared port table.
#[derive(Clone)]
pub struct PortAllocator {
    table: Arc<PortTable>,
}

impl PortAllocator {
    pub(crate) fn new(table: Arc<PortTable>) -> Self {
        Self { table }
    }

    /// The isolation context that owns the table.
    pub fn owner(&self) -> ContextId {
        self.table.owner
    }

    /// Returns `address` with its port populated, allocating one on first use.
    pub fn assign(&self, address: &EndpointAddress) -> Result<EndpointAddress> {
        self.session().assign(address)
    }

    /// Opens a mutual-exclusion scope over the table.
    ///
    /// All assignments made through one session are atomic with respect to
    /// other sessions, so a service can derive its whole endpoint set without
    /// another service claiming ports in between.
    pub fn session(&self) -> PortSession<'_> {
        PortSession {
            state: self.table.lock(),
        }
    }

    /// Moves the allocation counter to `port`. Only legal before any port
    /// has been assigned.
    pub fn start_with_port(&self, port: u16) -> Result<()> {
        let mut state = self.table.lock();
        if !state.assignments.is_empty() {
            return Err(PortError::AlreadyAssigned {
                count: state.assignments.len(),
            });
        }
        state.next_port = u32::from(port);
        tracing::debug!(port, "port allocator re-based");
        Ok(())
    }

    /// Snapshot of every assignment, ordered by port.
    pub fn assignments(&self) -> Vec<(EndpointAddress, u16)> {
        let state = self.table.lock();
        let mut all: Vec<_> = state
            .assignments
            .iter()
            .map(|(addr, port)| (addr.clone(), *port))
            .collect();
        all.sort_by_key(|(_, port)| *port);
        all
    }
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("owner", &self.table.owner)
            .finish_non_exhaustive()
    }
}

/// An open mutual-exclusion scope over the port table.
pub struct PortSession<'a> {
    state: MutexGuard<'a, TableState>,
}

impl PortSession<'_> {
    pub fn assign(&mut self, address: &EndpointAddress) -> Result<EndpointAddress> {
        let key = address.without_port();
        if let Some(port) = self.state.assignments.get(&key) {
            return Ok(key.with_port(*port));
        }

        let port = u16::try_from(self.state.next_port).map_err(|_| PortError::Exhausted {
            address: key.to_string(),
        })?;
        self.state.assignments.insert(key.clone(), port);
        self.state.next_port += 1;

        tracing::debug!(endpoint = %key, port, "port assigned");
        Ok(key.with_port(port))
    }
}
