//! Request dispatch: factories, operations and the deferred queue.
//!
//! Every request body is offered to the registered factories in order; the
//! first one whose [`OperationFactory::claims`] returns `true` decodes it
//! into an [`Operation`]. Operations are only queued while a packet is being
//! decoded, and run once the whole packet has been taken apart.

use std::collections::VecDeque;
use std::sync::Arc;

use teleproto_mtproto::MessageId;
use teleproto_mtproto::envelope::constructor_id;
use teleproto_tl_types::{Blob, Deserializable, Identifiable, Serializable, deserialize, functions};
use tracing::debug;

use crate::config::ServerConfig;
use crate::errors::RpcError;
use crate::server::registry::Registry;

// ─── Session metadata ─────────────────────────────────────────────────────────

/// What the client told us about itself through the connection wrappers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientInfo {
    /// Layer from `invokeWithLayer`.
    pub layer: Option<i32>,
    pub api_id: Option<i32>,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub system_lang_code: String,
    pub lang_pack: String,
    pub lang_code: String,
}

// ─── Operation ────────────────────────────────────────────────────────────────

/// What an operation answers with.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// A serialized result.
    Ok(Vec<u8>),
    /// An `rpc_error`.
    Error(RpcError),
    /// A well-formed answer for a call this server does not really support.
    NotImplemented(Vec<u8>),
}

impl Reply {
    pub fn ok<T: Serializable>(value: &T) -> Self {
        Self::Ok(value.to_bytes())
    }

    pub fn not_implemented<T: Serializable>(value: &T) -> Self {
        Self::NotImplemented(value.to_bytes())
    }

    /// The bytes placed inside `rpc_result`.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Ok(bytes) | Self::NotImplemented(bytes) => bytes,
            Self::Error(e) => e.to_tl().to_bytes(),
        }
    }
}

impl From<RpcError> for Reply {
    fn from(e: RpcError) -> Self {
        Self::Error(e)
    }
}

/// What an operation may touch while it runs.
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub config: &'a ServerConfig,
    pub client: &'a ClientInfo,
    pub auth_key_id: u64,
    pub session_id: u64,
    /// Server time, Unix seconds.
    pub now: u64,
    signed_in: bool,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a Registry, config: &'a ServerConfig, client: &'a ClientInfo, auth_key_id: u64, session_id: u64, now: u64) -> Self {
        Self { registry, config, client, auth_key_id, session_id, now, signed_in: false }
    }

    /// The user bound to this connection's auth key.
    pub fn user_id(&self) -> Option<i32> {
        self.registry.bound_user(self.auth_key_id)
    }

    /// Like [`Context::user_id`], but `401` when nobody is signed in.
    pub fn require_user(&self) -> Result<i32, RpcError> {
        self.user_id().ok_or_else(RpcError::unauthorized)
    }

    /// Binds the auth key to `user_id`.
    pub fn sign_in(&mut self, user_id: i32) {
        self.registry.bind(self.auth_key_id, user_id);
        self.signed_in = true;
    }

    /// Whether [`Context::sign_in`] was called.
    pub fn signed_in(&self) -> bool {
        self.signed_in
    }
}

/// A decoded request waiting to run.
pub trait Operation: Send {
    fn run(self: Box<Self>, ctx: &mut Context<'_>) -> Reply;
}

/// Decodes the requests it claims into operations.
pub trait OperationFactory: Send + Sync {
    /// Used in log messages.
    fn name(&self) -> &str;

    fn claims(&self, constructor_id: u32) -> bool;

    fn create(&self, constructor_id: u32, body: &[u8]) -> Result<Box<dyn Operation>, deserialize::Error>;
}

/// Decodes `body` as `O` and boxes it.
pub fn decode_operation<O>(body: &[u8]) -> Result<Box<dyn Operation>, deserialize::Error>
where
    O: Operation + Deserializable + 'static,
{
    Ok(Box::new(O::from_bytes(body)?))
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// Why a request could not be queued.
#[derive(Debug, PartialEq)]
pub enum DispatchError {
    /// No factory claims the constructor.
    Unclaimed { id: u32 },
    /// The claiming factory could not decode the body.
    Decode { id: u32, error: deserialize::Error },
    /// A connection wrapper nested inside the same wrapper.
    NestedWrapper { id: u32 },
    /// Fewer than four bytes.
    Empty,
}

impl DispatchError {
    /// The `rpc_error` sent back for this failure.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Unclaimed { .. } => RpcError::bad_request("INPUT_METHOD_INVALID"),
            Self::Decode { .. } | Self::Empty => RpcError::bad_request("INPUT_FETCH_FAIL"),
            Self::NestedWrapper { .. } => RpcError::bad_request("CONNECTION_LAYER_INVALID"),
        }
    }
}

/// An operation and the message it answers.
pub struct Deferred {
    pub req_msg_id: MessageId,
    pub operation: Box<dyn Operation>,
}

/// Turns request bodies into queued operations.
pub struct Dispatcher {
    factories: Vec<Arc<dyn OperationFactory>>,
    queue: VecDeque<Deferred>,
}

impl Dispatcher {
    pub fn new(factories: Vec<Arc<dyn OperationFactory>>) -> Self {
        Self { factories, queue: VecDeque::new() }
    }

    /// Decodes `body` and queues the operation; nothing runs yet.
    ///
    /// `invokeWithLayer` and `initConnection` update `client` and their
    /// inner query is dispatched in their place. Each may appear at most
    /// once per request. `client` only changes if the inner query is
    /// queued.
    pub fn enqueue(&mut self, req_msg_id: MessageId, body: &[u8], client: &mut ClientInfo) -> Result<(), DispatchError> {
        let mut staged = client.clone();
        self.enqueue_wrapped(req_msg_id, body, &mut staged, false, false)?;
        *client = staged;
        Ok(())
    }

    fn enqueue_wrapped(
        &mut self,
        req_msg_id: MessageId,
        body: &[u8],
        client: &mut ClientInfo,
        seen_layer: bool,
        seen_init: bool,
    ) -> Result<(), DispatchError> {
        let id = constructor_id(body).ok_or(DispatchError::Empty)?;

        if id == functions::InvokeWithLayer::<Blob>::CONSTRUCTOR_ID {
            if seen_layer {
                return Err(DispatchError::NestedWrapper { id });
            }
            let wrapper = functions::InvokeWithLayer::<Blob>::from_bytes(body).map_err(|error| DispatchError::Decode { id, error })?;
            debug!("[teleproto] client layer {}", wrapper.layer);
            client.layer = Some(wrapper.layer);
            return self.enqueue_wrapped(req_msg_id, &wrapper.query.0, client, true, seen_init);
        }
        if id == functions::InitConnection::<Blob>::CONSTRUCTOR_ID {
            if seen_init {
                return Err(DispatchError::NestedWrapper { id });
            }
            let init = functions::InitConnection::<Blob>::from_bytes(body).map_err(|error| DispatchError::Decode { id, error })?;
            debug!("[teleproto] client {} {} (api_id {})", init.device_model, init.app_version, init.api_id);
            client.api_id = Some(init.api_id);
            client.device_model = init.device_model;
            client.system_version = init.system_version;
            client.app_version = init.app_version;
            client.system_lang_code = init.system_lang_code;
            client.lang_pack = init.lang_pack;
            client.lang_code = init.lang_code;
            return self.enqueue_wrapped(req_msg_id, &init.query.0, client, seen_layer, true);
        }

        let factory = self.factories.iter().find(|f| f.claims(id)).ok_or(DispatchError::Unclaimed { id })?;
        let operation = factory.create(id, body).map_err(|error| DispatchError::Decode { id, error })?;
        debug!("[teleproto] {id:#010x} queued by {}", factory.name());
        self.queue.push_back(Deferred { req_msg_id, operation });
        Ok(())
    }

    /// Next queued operation, oldest first.
    pub fn pop(&mut self) -> Option<Deferred> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
