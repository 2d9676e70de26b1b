//! # busaddr
//!
//! Queue endpoint addresses for hosted message consumers.
//!
//! A consumer's queue address is derived purely from its type name: the
//! fully-qualified name is made safe for the queueing system by a fixed
//! substitution table and combined with a protocol scheme and a host.
//!
//! ```rust
//! use busaddr::EndpointAddress;
//! use busaddr::Protocol;
//! use busaddr::TypeName;
//!
//! let name = TypeName::new("shop.billing.InvoiceConsumer");
//! let addr = EndpointAddress::for_type(Protocol::Msmq, "localhost", &name);
//! assert_eq!(addr.to_string(), "msmq://localhost/shop.billing.InvoiceConsumer");
//!
//! let parsed: EndpointAddress = "rhino.queues://localhost:2201/Foo_Bar".parse().unwrap();
//! assert_eq!(parsed.port(), Some(2201));
//! ```

pub mod address;
pub mod name;
pub mod protocol;

pub use address::AddressError;
pub use address::EndpointAddress;
pub use name::INVALID_QUEUE_NAME_CHARACTERS;
pub use name::SUBSTITUTE;
pub use name::TypeName;
pub use name::make_queue_name_safe;
pub use protocol::Protocol;
