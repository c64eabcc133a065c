//! Client and server configuration.

use std::sync::Arc;
use std::time::Duration;

use teleproto_crypto::{DhParams, rsa};
use teleproto_mtproto::SaltConfig;
use teleproto_mtproto::authentication::RsaKeyTable;

// ─── ClientConfig ─────────────────────────────────────────────────────────────

/// Configuration for [`crate::ClientConnection`] and [`crate::net::TcpClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Data center the client talks to.
    pub dc_id: i32,
    pub api_id: i32,
    pub api_hash: String,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
    /// Layer announced in `invokeWithLayer` (default: the bundled schema's).
    pub layer: i32,
    /// Server keys the client trusts during the key exchange.
    pub rsa_keys: RsaKeyTable,
    /// How long the TCP driver waits for the key exchange.
    pub handshake_timeout: Duration,
    /// How long the TCP driver waits for each reply.
    pub rpc_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dc_id: 1,
            api_id: 0,
            api_hash: String::new(),
            device_model: "Linux".to_string(),
            system_version: "1.0".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            system_lang_code: "en".to_string(),
            lang_pack: String::new(),
            lang_code: "en".to_string(),
            layer: teleproto_tl_types::LAYER,
            rsa_keys: RsaKeyTable::default(),
            handshake_timeout: Duration::from_secs(15),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

/// A data center address advertised by `help.getConfig`.
#[derive(Clone, Debug, PartialEq)]
pub struct DcAddress {
    pub id: i32,
    pub ip: String,
    pub port: i32,
}

/// Configuration for [`crate::Server`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// This server's data center id.
    pub dc_id: i32,
    /// Keys offered during the key exchange. Without any, every key
    /// exchange fails.
    pub rsa_keys: Arc<[rsa::PrivateKey]>,
    pub dh: DhParams,
    pub salts: SaltConfig,
    /// Replies longer than this are gzip-packed when that saves space.
    pub gzip_threshold: usize,
    /// Oldest acceptable client message id, relative to server time.
    pub max_past_msg_id: Duration,
    /// Newest acceptable client message id, relative to server time.
    pub max_future_msg_id: Duration,
    /// Digits in a login code.
    pub login_code_length: usize,
    /// How long a login code stays usable.
    pub login_code_ttl: Duration,
    /// How long `account.updateStatus(offline=false)` keeps a user online.
    pub online_period: Duration,
    /// Reported by `help.getNearestDc`.
    pub country: String,
    pub dc_options: Vec<DcAddress>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dc_id: 1,
            rsa_keys: Arc::from(Vec::new()),
            dh: DhParams::default(),
            salts: SaltConfig::default(),
            gzip_threshold: teleproto_mtproto::envelope::GZIP_THRESHOLD,
            max_past_msg_id: Duration::from_secs(300),
            max_future_msg_id: Duration::from_secs(30),
            login_code_length: 5,
            login_code_ttl: Duration::from_secs(300),
            online_period: Duration::from_secs(300),
            country: "US".to_string(),
            dc_options: vec![DcAddress { id: 1, ip: "127.0.0.1".to_string(), port: 4430 }],
        }
    }
}

impl ServerConfig {
    /// Defaults plus `keys`.
    pub fn with_keys(keys: Vec<rsa::PrivateKey>) -> Self {
        Self { rsa_keys: Arc::from(keys), ..Self::default() }
    }
}
