//! MTProto 1.0 connection engine.
//!
//! Both ends of a connection live here as sans-IO state machines:
//! * [`ClientConnection`] runs the key exchange, wraps the first request in
//!   `invokeWithLayer(initConnection(..))` and matches replies to
//!   [`PendingCall`]s.
//! * [`ServerConnection`] answers the key exchange, validates message ids and
//!   salts, handles service messages itself and queues API requests through
//!   the [`OperationFactory`] list of its [`Server`].
//!
//! [`net`] drives both over TCP with tokio; [`MemoryTransport`] drives them
//! in tests.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod file_transfer;
pub mod memory;
pub mod net;
pub mod operations;
pub mod server;
pub mod status;

pub use client::{ClientConnection, PendingCall};
pub use config::{ClientConfig, DcAddress, ServerConfig};
pub use credentials::{CredentialStore, FileStore, MemoryStore, SessionCredentials};
pub use errors::{ConnectionError, InvocationError, RpcError, TransferError};
pub use file_transfer::{FileTransfer, TransferKind, UploadPart};
pub use memory::MemoryTransport;
pub use net::{TcpClient, serve};
pub use server::{
    AuthKeyStore, ClientInfo, Context, MemoryAuthKeyStore, Operation, OperationFactory, Registry, Reply, Server,
    ServerConnection, UserRecord,
};
pub use status::{Status, StatusChange, StatusReason, StatusTracker};
