//! TL binary codec plus the types generated from the bundled schemas.
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`types`]     | Concrete constructors (bare types) as `struct`s            |
//! | [`functions`] | RPC functions as `struct`s implementing [`RemoteCall`]     |
//! | [`enums`]     | Boxed types as closed `enum`s                              |
//! | [`registry`]  | Constructor id to name lookup built from schema text       |
//!
//! ```rust
//! use teleproto_tl_types::{Deserializable, Serializable, enums, functions};
//!
//! let ping = functions::Ping { ping_id: 7 };
//! let bytes = ping.to_bytes();
//! assert_eq!(&bytes[..4], &0x7abe77ecu32.to_le_bytes());
//!
//! let pong = enums::Pong::Pong(teleproto_tl_types::types::Pong { msg_id: 1, ping_id: 7 });
//! assert_eq!(enums::Pong::from_bytes(&pong.to_bytes()).unwrap(), pong);
//! ```

#![deny(unsafe_code)]
#![allow(clippy::large_enum_variant)]

pub mod deserialize;
pub mod registry;
pub mod serialize;

include!(concat!(env!("OUT_DIR"), "/generated_common.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_types.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_functions.rs"));
include!(concat!(env!("OUT_DIR"), "/generated_enums.rs"));

pub use deserialize::{Cursor, Deserializable};
pub use registry::SchemaRegistry;
pub use serialize::Serializable;

/// Constructor id of the boxed `Vector` type.
pub const VECTOR_ID: u32 = 0x1cb5c415;

/// Bare `vector<T>`: a count followed by the items, no constructor id.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Bytes passed through without interpretation.
///
/// Stands in for generic `!X` payloads: it encodes as the raw bytes and
/// decodes by taking everything left in the cursor, so it must be the
/// last value in a bounded stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Every generated type has a 32-bit constructor id.
pub trait Identifiable {
    /// The id declared in (or derived from) the schema.
    const CONSTRUCTOR_ID: u32;
}

/// A function that can be invoked remotely; `Return` is the reply type.
pub trait RemoteCall: Serializable {
    /// Type the peer answers with.
    type Return: Deserializable;
}
