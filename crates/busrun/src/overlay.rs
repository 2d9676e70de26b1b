//! # Configuration Overlay
//!
//! A hosted service may ship a standalone override file next to it. The
//! overlay is sparse: only attributes present in the file replace values of
//! the generated configuration, nothing is ever defaulted.
//!
//! The file is TOML. The overrides live in the `bus` table of the facility
//! whose `id` is [`FACILITY_ID`]:
//!
//! ```toml
//! [[facility]]
//! id = "rhino.esb"
//!
//! [facility.bus]
//! numberOfRetries = 12
//! threadCount = 4
//! loadBalancerEndpoint = "msmq://localhost/balancer"
//! logEndpoint = "msmq://localhost/log"
//! ```
//!
//! A missing file, a missing facility or a missing `bus` table all mean "no
//! overrides". A file that exists but cannot be read or parsed is an error.

use std::path::Path;

use busaddr::EndpointAddress;
use serde::Deserialize;

use crate::bus::BusConfiguration;

/// Id of the facility section that carries bus overrides.
pub const FACILITY_ID: &str = "rhino.esb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    /// The file exists but could not be read.
    Read { path: String, error: String },
    /// The file is not a well-formed override document.
    Parse { path: String, error: String },
    /// An endpoint attribute does not parse as an endpoint address.
    InvalidEndpoint { path: String, attribute: &'static str, error: String },
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, error } => {
                write!(f, "Failed to read override file {}: {}", path, error)
            }
            Self::Parse { path, error } => {
                write!(f, "Failed to parse override file {}: {}", path, error)
            }
            Self::InvalidEndpoint { path, attribute, error } => {
                write!(f, "Invalid {} in override file {}: {}", attribute, path, error)
            }
        }
    }
}

impl std::error::Error for OverlayError {}

pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    facility: Vec<Facility>,
}

#[derive(Debug, Deserialize)]
struct Facility {
    id: Option<String>,
    bus: Option<BusElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusElement {
    number_of_retries: Option<u32>,
    thread_count: Option<u32>,
    load_balancer_endpoint: Option<String>,
    log_endpoint: Option<String>,
}

/// The attributes an override file may set. Each is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideAttributes {
    pub number_of_retries: Option<u32>,
    pub thread_count: Option<u32>,
    pub load_balancer_endpoint: Option<EndpointAddress>,
    pub logging_endpoint: Option<EndpointAddress>,
}

impl OverrideAttributes {
    /// Reads the overrides from `path`. A missing file gives no overrides; a
    /// path whose existence cannot be checked is a read error.
    pub fn load(path: &Path) -> Result<Self> {
        let exists = path.try_exists().map_err(|e| OverlayError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        if !exists {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| OverlayError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses an override document. `origin` names the source in errors.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let document: Document = toml::from_str(content).map_err(|e| OverlayError::Parse {
            path: origin.to_string(),
            error: e.to_string(),
        })?;

        let Some(bus) = document
            .facility
            .into_iter()
            .find(|f| f.id.as_deref() == Some(FACILITY_ID))
            .and_then(|f| f.bus)
        else {
            return Ok(Self::default());
        };

        let endpoint =
            |attribute: &'static str, text: Option<String>| -> Result<Option<EndpointAddress>> {
                text.map(|t| {
                    t.parse::<EndpointAddress>().map_err(|e| OverlayError::InvalidEndpoint {
                        path: origin.to_string(),
                        attribute,
                        error: e.to_string(),
                    })
                })
                .transpose()
            };

        Ok(Self {
            number_of_retries: bus.number_of_retries,
            thread_count: bus.thread_count,
            load_balancer_endpoint: endpoint("loadBalancerEndpoint", bus.load_balancer_endpoint)?,
            logging_endpoint: endpoint("logEndpoint", bus.log_endpoint)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies every present attribute to `config`.
    pub fn apply(self, mut config: BusConfiguration) -> BusConfiguration {
        if let Some(n) = self.number_of_retries {
            config = config.retries(n);
        }
        if let Some(n) = self.thread_count {
            config = config.threads(n);
        }
        if let Some(endpoint) = self.load_balancer_endpoint {
            config = config.load_balancer(endpoint);
        }
        if let Some(endpoint) = self.logging_endpoint {
            config = config.logging(endpoint);
        }
        config
    }
}

/// Patches `config` with the overrides found at `path`.
///
/// No path, or a path that does not exist, returns `config` unchanged.
pub fn patch(config: BusConfiguration, path: Option<&Path>) -> Result<BusConfiguration> {
    let Some(path) = path else {
        return Ok(config);
    };
    let overrides = OverrideAttributes::load(path)?;
    if overrides.is_empty() {
        return Ok(config);
    }
    tracing::debug!(file = %path.display(), ?overrides, "applying configuration overrides");
    Ok(overrides.apply(config))
}
