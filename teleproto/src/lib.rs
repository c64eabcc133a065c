//! # teleproto
//!
//! An MTProto 1.0 implementation covering both ends of a connection. The
//! sub-crates are re-exported here:
//!
//! | Sub-crate             | Role                                                  |
//! |-----------------------|-------------------------------------------------------|
//! | `teleproto-tl-parser` | Parse `.tl` schema files into an AST                  |
//! | `teleproto-tl-gen`    | Generate Rust source from the AST (build-time)        |
//! | `teleproto-tl-types`  | Generated types, functions and enums; the TL codec    |
//! | `teleproto-crypto`    | AES-IGE, RSA, DH, factorization, `AuthKey`            |
//! | `teleproto-mtproto`   | Key exchange, encrypted framing, salts, transports    |
//! | `teleproto-engine`    | Connection status, RPC dispatch, file transfer, tokio |
//!
//! ## Quick start: loopback server and client
//!
//! ```rust,no_run
//! use teleproto::{ClientConfig, Server, ServerConfig, TcpClient};
//! use teleproto::tl::functions;
//!
//! # async fn demo(keys: Vec<teleproto::crypto::rsa::PrivateKey>, client_config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::new(ServerConfig::with_keys(keys));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4430").await?;
//! tokio::spawn(teleproto::serve(listener, server.clone()));
//!
//! let client = TcpClient::connect("127.0.0.1:4430", client_config).await?;
//! let config = client.invoke(&functions::help::GetConfig {}).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`teleproto_tl_types`]: generated constructors, functions and enums.
pub use teleproto_tl_types as tl;

/// Re-export of [`teleproto_mtproto`]: key exchange, sessions, envelopes, transports.
pub use teleproto_mtproto as mtproto;

/// Re-export of [`teleproto_crypto`]: AES-IGE, SHA, RSA, DH, `AuthKey`.
pub use teleproto_crypto as crypto;

/// Re-export of [`teleproto_engine`]: connection engines and the tokio driver.
pub use teleproto_engine as engine;

/// Re-export of [`teleproto_tl_parser`] (requires `feature = "parser"`).
#[cfg(feature = "parser")]
pub use teleproto_tl_parser as parser;

/// Re-export of [`teleproto_tl_gen`] (requires `feature = "codegen"`).
#[cfg(feature = "codegen")]
pub use teleproto_tl_gen as codegen;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use teleproto_crypto::AuthKey;
pub use teleproto_engine::{
    ClientConfig, ClientConnection, ConnectionError, FileTransfer, InvocationError, Operation, OperationFactory,
    PendingCall, Reply, RpcError, Server, ServerConfig, ServerConnection, SessionCredentials, Status, TcpClient,
    serve,
};
pub use teleproto_mtproto::authentication::RsaKeyTable;
pub use teleproto_tl_types::{Deserializable, Identifiable, LAYER, RemoteCall, Serializable};
