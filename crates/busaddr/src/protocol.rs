//! Queue protocols understood by the endpoint namer.

use std::fmt;
use std::str::FromStr;

/// The wire protocol an endpoint is reached through.
///
/// Each protocol has its own URI scheme and its own rules for which
/// characters a queue name may contain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Machine-local message queues. Addresses carry no port.
    Msmq,
    /// Peer-to-peer queues listening on an explicit TCP port per endpoint.
    RhinoQueues,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Msmq, Protocol::RhinoQueues];

    /// URI scheme used in the textual form of an address.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Msmq => "msmq",
            Self::RhinoQueues => "rhino.queues",
        }
    }

    /// Whether every endpoint of this protocol must be given a port.
    pub fn requires_port(self) -> bool {
        matches!(self, Self::RhinoQueues)
    }

    /// Whether `.` is disallowed in queue names of this protocol.
    pub fn forbids_dots(self) -> bool {
        matches!(self, Self::RhinoQueues)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.scheme().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownScheme(s.to_string()))
    }
}

/// A scheme that does not name any known [`Protocol`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScheme(pub String);

impl fmt::Display for UnknownScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown queue protocol scheme: '{}'", self.0)
    }
}

impl std::error::Error for UnknownScheme {}
