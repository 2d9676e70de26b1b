//! # Bus-type Scanner
//!
//! Consumers declare the messages they handle up front. An [`Assembly`] is
//! an ordered manifest of the types a service ships; [`scan_consumers`]
//! walks it and yields one [`ConsumerDescriptor`] per concrete consumer.
//!
//! ```rust
//! use busrun::consumes;
//! use busrun::scanner::Assembly;
//! use busrun::scanner::MessageConsumer;
//! use busrun::scanner::scan_consumers;
//!
//! struct Ping;
//! struct PingConsumer;
//!
//! impl MessageConsumer for PingConsumer {
//!     fn consumes() -> Vec<busrun::TypeName> {
//!         consumes![Ping]
//!     }
//! }
//!
//! let assembly = Assembly::new("pings").consumer::<PingConsumer>();
//! assert_eq!(scan_consumers(&assembly).count(), 1);
//! ```

use std::sync::Arc;

use busaddr::TypeName;

/// A type that handles bus messages.
pub trait MessageConsumer: 'static {
    /// Every message type this consumer handles.
    fn consumes() -> Vec<TypeName>;

    fn type_name() -> TypeName {
        TypeName::of::<Self>()
    }
}

/// Expands to the `Vec<TypeName>` of the listed message types.
#[macro_export]
macro_rules! consumes {
    ($($message:ty),* $(,)?) => {
        vec![$($crate::busaddr::TypeName::of::<$message>()),*]
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Concrete,
    Abstract,
    Interface,
}

/// One entry of an [`Assembly`] manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeEntry {
    pub name: TypeName,
    pub kind: TypeKind,
    /// Declared message types; `None` for types that are not consumers.
    pub consumes: Option<Vec<TypeName>>,
}

impl TypeEntry {
    pub fn plain(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Concrete,
            consumes: None,
        }
    }

    pub fn consumer(name: impl Into<TypeName>, consumes: Vec<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Concrete,
            consumes: Some(consumes),
        }
    }

    pub fn with_kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    fn is_concrete_consumer(&self) -> bool {
        self.kind == TypeKind::Concrete && self.consumes.is_some()
    }
}

/// An ordered manifest of the types a hosted service ships.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assembly {
    name: String,
    types: Vec<TypeEntry>,
}

impl Assembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `C` with the message types it declares.
    pub fn consumer<C: MessageConsumer>(self) -> Self {
        self.register(TypeEntry::consumer(C::type_name(), C::consumes()))
    }

    pub fn register(mut self, entry: TypeEntry) -> Self {
        self.types.push(entry);
        self
    }

    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.types.iter().any(|t| &t.name == name)
    }

    pub fn into_shared(self) -> Arc<Assembly> {
        Arc::new(self)
    }
}

/// A concrete consumer and the message types it handles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerDescriptor {
    pub consumer_type: TypeName,
    pub message_types: Vec<TypeName>,
}

/// Lazy, restartable walk over the consumers of an assembly.
///
/// A clone continues independently from the same position; calling
/// [`scan_consumers`] again starts over from the first entry.
#[derive(Clone)]
pub struct ConsumerScan<'a> {
    types: std::slice::Iter<'a, TypeEntry>,
}

impl Iterator for ConsumerScan<'_> {
    type Item = ConsumerDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.types.by_ref().find(|t| t.is_concrete_consumer()).map(|t| {
            let mut message_types: Vec<TypeName> = Vec::new();
            for message in t.consumes.iter().flatten() {
                if !message_types.contains(message) {
                    message_types.push(message.clone());
                }
            }
            ConsumerDescriptor {
                consumer_type: t.name.clone(),
                message_types,
            }
        })
    }
}

/// Every concrete consumer in `assembly`, in registration order.
pub fn scan_consumers(assembly: &Assembly) -> ConsumerScan<'_> {
    ConsumerScan {
        types: assembly.types.iter(),
    }
}
