//! # Type names and queue-name substitution
//!
//! Queue names are derived from fully-qualified type names. Characters the
//! queueing systems reject are replaced by [`SUBSTITUTE`]. The substitute is
//! never itself in the table, so the substitution is total and applying it
//! twice gives the same result as applying it once.

use std::fmt;

use crate::protocol::Protocol;

/// Characters no queue name may contain, whatever the protocol.
pub const INVALID_QUEUE_NAME_CHARACTERS: [char; 7] = ['\\', ';', '\r', '\n', '+', ',', '"'];

/// Replacement for every disallowed character.
pub const SUBSTITUTE: char = '_';

/// Rewrites `name` into a queue name that is safe for `protocol`.
pub fn make_queue_name_safe(name: &str, protocol: Protocol) -> String {
    name.chars()
        .map(|c| if is_disallowed(c, protocol) { SUBSTITUTE } else { c })
        .collect()
}

fn is_disallowed(c: char, protocol: Protocol) -> bool {
    INVALID_QUEUE_NAME_CHARACTERS.contains(&c) || (c == '.' && protocol.forbids_dots())
}

/// A fully-qualified, dot-separated type name such as `shop.billing.Invoice`.
///
/// Names taken from Rust types have their `::` path separators rendered as
/// `.`, so `my_crate::orders::Ping` becomes `my_crate.orders.Ping`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fully-qualified name of the Rust type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().replace("::", "."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The last segment of the name, ignoring any generic arguments.
    ///
    /// `shop.billing.Invoice` gives `Invoice`; `a.Wrapper<b.Inner>` gives
    /// `Wrapper`.
    pub fn short_name(&self) -> &str {
        let base = match self.0.find('<') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        };
        base.rsplit('.').next().unwrap_or(base)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
