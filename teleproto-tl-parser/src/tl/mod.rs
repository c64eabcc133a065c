//! Syntax tree of a TL declaration.

mod definition;
mod parameter;
mod ty;

pub use definition::Definition;
pub use parameter::{Parameter, ParameterType};
pub use ty::Type;

/// Which section of the schema a declaration came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// A constructor, declared before `---functions---`.
    Types,
    /// A remote procedure, declared after `---functions---`.
    Functions,
}

/// The `flags.N` part of a conditional parameter such as `flags.2?string`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flag {
    /// Name of the `#` field holding the bit.
    pub name: String,
    /// Bit index.
    pub index: u32,
}
