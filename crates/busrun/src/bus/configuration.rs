//! The configuration handed to a bus when a hosted service is configured.

use busaddr::EndpointAddress;
use busaddr::TypeName;

/// Endpoints and tuning for one bus instance.
///
/// Built fresh for each host, then patched by the configuration overlay.
/// Setters consume and return `self` so generation and patching read as one
/// chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfiguration {
    pub send_endpoint: EndpointAddress,
    /// Ordered `(message type, endpoint)` pairs.
    pub receive_endpoints: Vec<(TypeName, EndpointAddress)>,
    pub number_of_retries: Option<u32>,
    pub thread_count: Option<u32>,
    pub load_balancer_endpoint: Option<EndpointAddress>,
    pub logging_endpoint: Option<EndpointAddress>,
}

impl BusConfiguration {
    pub fn new(send_endpoint: EndpointAddress) -> Self {
        Self {
            send_endpoint,
            receive_endpoints: Vec::new(),
            number_of_retries: None,
            thread_count: None,
            load_balancer_endpoint: None,
            logging_endpoint: None,
        }
    }

    pub fn receive(mut self, message: TypeName, endpoint: EndpointAddress) -> Self {
        self.receive_endpoints.push((message, endpoint));
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.number_of_retries = Some(n);
        self
    }

    pub fn threads(mut self, n: u32) -> Self {
        self.thread_count = Some(n);
        self
    }

    pub fn load_balancer(mut self, endpoint: EndpointAddress) -> Self {
        self.load_balancer_endpoint = Some(endpoint);
        self
    }

    pub fn logging(mut self, endpoint: EndpointAddress) -> Self {
        self.logging_endpoint = Some(endpoint);
        self
    }

    /// The endpoint registered for `message`, if any.
    pub fn endpoint_for(&self, message: &TypeName) -> Option<&EndpointAddress> {
        self.receive_endpoints
            .iter()
            .find(|(m, _)| m == message)
            .map(|(_, endpoint)| endpoint)
    }
}
