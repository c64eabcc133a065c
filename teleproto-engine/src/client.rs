//! Client side of a connection, sans-IO.
//!
//! [`ClientConnection::connect`] starts the key exchange (or resumes saved
//! credentials); packets from the server go to
//! [`ClientConnection::process_incoming`]. Requests are sent with
//! [`ClientConnection::invoke`], which returns a [`PendingCall`] resolved
//! exactly once by the matching reply. Nothing here times out: deadlines
//! belong to whoever drives the transport.

use std::collections::HashMap;
use std::marker::PhantomData;

use teleproto_mtproto::authentication::{self, ClientHandshake, ClientStep};
use teleproto_mtproto::envelope::{self, GZIP_PACKED_ID, MSG_CONTAINER_ID, RPC_RESULT_ID};
use teleproto_mtproto::message::{MessageIdGenerator, packet_key_id};
use teleproto_mtproto::transport::Transport;
use teleproto_mtproto::{EncryptedSession, MessageId, MessageIdMode, TransportErrorCode, unix_time};
use teleproto_tl_types::{Blob, Deserializable, Identifiable, RemoteCall, Serializable, enums, functions, types};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::SessionCredentials;
use crate::errors::{ConnectionError, InvocationError, RpcError};
use crate::status::{Status, StatusChange, StatusReason, StatusTracker};

type Outcome = Result<Vec<u8>, InvocationError>;

/// Service calls that must not be wrapped in `invokeWithLayer`.
const SERVICE_CALLS: [u32; 4] = [
    functions::Ping::CONSTRUCTOR_ID,
    functions::PingDelayDisconnect::CONSTRUCTOR_ID,
    functions::GetFutureSalts::CONSTRUCTOR_ID,
    functions::DestroySession::CONSTRUCTOR_ID,
];

// ─── PendingCall ──────────────────────────────────────────────────────────────

/// A sent request waiting for its reply.
pub struct PendingCall<T> {
    msg_id: MessageId,
    rx: oneshot::Receiver<Outcome>,
    _reply: PhantomData<fn() -> T>,
}

impl<T: Deserializable> PendingCall<T> {
    /// Id the request was first sent under. Resends after a salt or clock
    /// correction use new ids but resolve this same call.
    pub fn msg_id(&self) -> MessageId {
        self.msg_id
    }

    /// Waits for the reply.
    pub async fn wait(self) -> Result<T, InvocationError> {
        decode(self.rx.await.unwrap_or(Err(InvocationError::Dropped)))
    }

    /// The reply, if it has arrived.
    pub fn try_take(&mut self) -> Option<Result<T, InvocationError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(decode(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(InvocationError::Dropped)),
        }
    }
}

fn decode<T: Deserializable>(outcome: Outcome) -> Result<T, InvocationError> {
    Ok(T::from_bytes(&outcome?)?)
}

struct Pending {
    /// First id, handed out in [`PendingCall::msg_id`].
    first_id: MessageId,
    /// Constructor of the request inside any wrappers.
    request_id: u32,
    body: Vec<u8>,
    tx: oneshot::Sender<Outcome>,
}

// ─── ClientConnection ─────────────────────────────────────────────────────────

/// Client side of one connection.
pub struct ClientConnection<T: Transport> {
    config: ClientConfig,
    transport: T,
    status: StatusTracker,
    handshake: Option<ClientHandshake>,
    session: Option<EncryptedSession>,
    resume: Option<SessionCredentials>,
    salt: u64,
    pending: HashMap<MessageId, Pending>,
    acks: Vec<i64>,
    initialized: bool,
    user_id: Option<i32>,
}

impl<T: Transport> ClientConnection<T> {
    /// A connection that will run the key exchange.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            status: StatusTracker::new(),
            handshake: None,
            session: None,
            resume: None,
            salt: 0,
            pending: HashMap::new(),
            acks: Vec::new(),
            initialized: false,
            user_id: None,
        }
    }

    /// A connection that reuses `credentials` instead of a key exchange.
    pub fn with_credentials(config: ClientConfig, transport: T, credentials: SessionCredentials) -> Self {
        Self { resume: Some(credentials), ..Self::new(config, transport) }
    }

    pub fn status(&self) -> Status {
        self.status.status()
    }

    /// Receives every later status change.
    pub fn subscribe(&self) -> watch::Receiver<StatusChange> {
        self.status.subscribe()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// User bound to the auth key, once signed in.
    pub fn user_id(&self) -> Option<i32> {
        self.user_id
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Starts the key exchange, or goes straight to [`Status::HasDhKey`]
    /// with saved credentials.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        self.status.advance(Status::Connecting, StatusReason::Local)?;
        self.status.advance(Status::Connected, StatusReason::Local)?;

        if let Some(creds) = self.resume.take() {
            let mut session = EncryptedSession::client(creds.auth_key);
            session.session_mut().msg_ids().set_time_offset(creds.time_offset);
            self.session = Some(session);
            self.salt = creds.salt;
            self.user_id = creds.user_id;
            info!("[teleproto] resuming saved session on DC{}", creds.dc_id);
            self.status.advance(Status::HasDhKey, StatusReason::Local)?;
            if self.user_id.is_some() {
                self.status.advance(Status::Signed, StatusReason::Local)?;
            }
            return Ok(());
        }

        let mut handshake = ClientHandshake::new(self.config.rsa_keys.clone());
        let first = handshake.start().inspect_err(|_| self.status.fail(StatusReason::Local))?;
        self.handshake = Some(handshake);
        self.send_raw(&first)
    }

    /// Credentials that let a later connection skip the key exchange.
    pub fn export_credentials(&self) -> Option<SessionCredentials> {
        let session = self.session.as_ref()?;
        Some(SessionCredentials {
            dc_id: self.config.dc_id,
            auth_key: session.auth_key().clone(),
            salt: self.salt,
            time_offset: session.session().time_offset(),
            user_id: self.user_id,
        })
    }

    // ── Sending ────────────────────────────────────────────────────────────

    /// Sends `request` and returns a handle to its typed reply.
    pub fn invoke<R: RemoteCall>(&mut self, request: &R) -> Result<PendingCall<R::Return>, InvocationError> {
        self.send_request(request.to_bytes())
    }

    /// Sends a serialized request. The very first API request is wrapped in
    /// `invokeWithLayer(initConnection(..))`.
    pub fn send_request<Reply: Deserializable>(&mut self, body: Vec<u8>) -> Result<PendingCall<Reply>, InvocationError> {
        if !self.status.status().has_key() {
            return Err(InvocationError::NotReady);
        }
        let request_id = envelope::constructor_id(&body).unwrap_or_default();
        let body = if !self.initialized && !SERVICE_CALLS.contains(&request_id) {
            self.initialized = true;
            self.wrap_first(body)
        } else {
            body
        };

        self.flush_acks().map_err(connection_to_invocation)?;
        let msg_id = self.send_encrypted(&body, true).map_err(connection_to_invocation)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(msg_id, Pending { first_id: msg_id, request_id, body, tx });
        debug!("[teleproto] sent {request_id:#010x} as {msg_id}");
        Ok(PendingCall { msg_id, rx, _reply: PhantomData })
    }

    fn wrap_first(&self, body: Vec<u8>) -> Vec<u8> {
        let c = &self.config;
        functions::InvokeWithLayer {
            layer: c.layer,
            query: functions::InitConnection {
                api_id: c.api_id,
                device_model: c.device_model.clone(),
                system_version: c.system_version.clone(),
                app_version: c.app_version.clone(),
                system_lang_code: c.system_lang_code.clone(),
                lang_pack: c.lang_pack.clone(),
                lang_code: c.lang_code.clone(),
                query: Blob(body),
            },
        }
        .to_bytes()
    }

    /// Sends queued acknowledgements, if any.
    pub fn flush_acks(&mut self) -> Result<(), ConnectionError> {
        if self.acks.is_empty() || self.session.is_none() {
            return Ok(());
        }
        let ack = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids: std::mem::take(&mut self.acks) });
        self.send_encrypted(&ack.to_bytes(), false).map(drop)
    }

    fn send_encrypted(&mut self, body: &[u8], content_related: bool) -> Result<MessageId, ConnectionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };
        let (packet, msg_id) = session.seal(self.salt, body, content_related, MessageIdMode::Client)?;
        self.send_raw(&packet)?;
        Ok(msg_id)
    }

    fn send_raw(&mut self, packet: &[u8]) -> Result<(), ConnectionError> {
        self.transport.send(packet).map_err(|e| ConnectionError::Send(e.to_string()))
    }

    // ── Receiving ──────────────────────────────────────────────────────────

    /// Handles one packet from the server.
    pub fn process_incoming(&mut self, packet: &[u8]) -> Result<(), ConnectionError> {
        match self.status.status() {
            Status::Failed => return Err(ConnectionError::Failed),
            Status::Disconnected | Status::Connecting => return Err(ConnectionError::NotConnected),
            _ => {}
        }
        if let Some(code) = TransportErrorCode::from_bytes(packet) {
            warn!("[teleproto] server closed the connection: {code}");
            self.fail(StatusReason::Remote, || InvocationError::Transport(code));
            return Err(ConnectionError::Transport(code));
        }
        if let Some(handshake) = self.handshake.as_mut() {
            return match handshake.handle(packet) {
                Ok(ClientStep::Send(next)) => self.send_raw(&next),
                Ok(ClientStep::Done(finished)) => {
                    self.handshake = None;
                    let mut session = EncryptedSession::client(finished.auth_key);
                    session.session_mut().msg_ids().set_time_offset(finished.time_offset);
                    self.session = Some(session);
                    self.salt = finished.first_salt;
                    self.status.advance(Status::HasDhKey, StatusReason::Remote)
                }
                Err(e) => {
                    warn!("[teleproto] key exchange failed: {e}");
                    let reason = match e {
                        authentication::Error::DhParamsFail
                        | authentication::Error::DhGenRetry
                        | authentication::Error::DhGenFail => StatusReason::Remote,
                        _ => StatusReason::Local,
                    };
                    self.status.fail(reason);
                    Err(e.into())
                }
            };
        }
        if packet_key_id(packet) == Some(0) {
            self.fail(StatusReason::Remote, || InvocationError::Dropped);
            return Err(ConnectionError::UnexpectedPlaintext);
        }
        let opened = match self.session.as_mut() {
            Some(session) => session.open(packet),
            None => return Err(ConnectionError::NotConnected),
        };
        let message = match opened {
            Ok(message) => message,
            Err(e) => {
                warn!("[teleproto] dropping connection: {e}");
                self.fail(StatusReason::Remote, || InvocationError::Dropped);
                return Err(e.into());
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.session_mut().note_received(message.msg_id);
        }
        if message.seq_no & 1 == 1 {
            self.acks.push(message.msg_id.0 as i64);
        }
        self.handle_body(message.msg_id, &message.body)
    }

    fn handle_body(&mut self, msg_id: MessageId, body: &[u8]) -> Result<(), ConnectionError> {
        let Some(id) = envelope::constructor_id(body) else {
            warn!("[teleproto] empty message {msg_id}");
            return Ok(());
        };
        match id {
            MSG_CONTAINER_ID => match envelope::parse_container(body) {
                Ok(messages) => {
                    for inner in messages {
                        if inner.seq_no & 1 == 1 {
                            self.acks.push(inner.msg_id.0 as i64);
                        }
                        self.handle_body(inner.msg_id, &inner.body)?;
                    }
                }
                Err(e) => warn!("[teleproto] bad container {msg_id}: {e}"),
            },
            GZIP_PACKED_ID => match envelope::gzip_unpacked(body) {
                Ok(inner) => self.handle_body(msg_id, &inner)?,
                Err(e) => warn!("[teleproto] bad gzip_packed {msg_id}: {e}"),
            },
            RPC_RESULT_ID => self.handle_rpc_result(body),
            types::Pong::CONSTRUCTOR_ID => match enums::Pong::from_bytes(body) {
                Ok(enums::Pong::Pong(pong)) => self.resolve(MessageId(pong.msg_id as u64), Ok(body.to_vec())),
                Err(e) => warn!("[teleproto] bad pong: {e}"),
            },
            types::FutureSalts::CONSTRUCTOR_ID => match enums::FutureSalts::from_bytes(body) {
                Ok(enums::FutureSalts::FutureSalts(salts)) => {
                    self.resolve(MessageId(salts.req_msg_id as u64), Ok(body.to_vec()))
                }
                Err(e) => warn!("[teleproto] bad future_salts: {e}"),
            },
            types::NewSessionCreated::CONSTRUCTOR_ID => match enums::NewSession::from_bytes(body) {
                Ok(enums::NewSession::Created(created)) => {
                    debug!("[teleproto] new session, salt {:016x}", created.server_salt);
                    self.salt = created.server_salt as u64;
                }
                Err(e) => warn!("[teleproto] bad new_session_created: {e}"),
            },
            types::BadServerSalt::CONSTRUCTOR_ID | types::BadMsgNotification::CONSTRUCTOR_ID => {
                match enums::BadMsgNotification::from_bytes(body) {
                    Ok(notice) => self.handle_bad_msg(msg_id, notice)?,
                    Err(e) => warn!("[teleproto] bad bad_msg_notification: {e}"),
                }
            }
            types::MsgsAck::CONSTRUCTOR_ID => debug!("[teleproto] ack received"),
            other => debug!("[teleproto] ignoring {other:#010x}"),
        }
        Ok(())
    }

    fn handle_rpc_result(&mut self, body: &[u8]) {
        let (req_msg_id, result) = match envelope::parse_rpc_result(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("[teleproto] bad rpc_result: {e}");
                return;
            }
        };
        let result = match envelope::unwrap_gzip(result) {
            Ok(result) => result,
            Err(e) => {
                self.resolve(req_msg_id, Err(e.into()));
                return;
            }
        };
        match envelope::constructor_id(&result) {
            Some(types::RpcError::CONSTRUCTOR_ID) => {
                let outcome = match enums::RpcError::from_bytes(&result) {
                    Ok(e) => Err(InvocationError::Rpc(RpcError::from(e))),
                    Err(e) => Err(e.into()),
                };
                self.resolve(req_msg_id, outcome);
            }
            Some(types::auth::Authorization::CONSTRUCTOR_ID) => {
                if let Ok(enums::auth::Authorization::Authorization(auth)) = enums::auth::Authorization::from_bytes(&result) {
                    let user_id = match auth.user {
                        enums::User::User(user) => user.id,
                        enums::User::Empty(user) => user.id,
                    };
                    self.signed_in(user_id);
                }
                self.resolve(req_msg_id, Ok(result.into_owned()));
            }
            _ => {
                let logged_out = self.pending.get(&req_msg_id).is_some_and(|p| p.request_id == functions::auth::LogOut::CONSTRUCTOR_ID);
                if logged_out && bool::from_bytes(&result) == Ok(true) {
                    info!("[teleproto] logged out");
                    self.user_id = None;
                }
                self.resolve(req_msg_id, Ok(result.into_owned()));
            }
        }
    }

    fn signed_in(&mut self, user_id: i32) {
        info!("[teleproto] signed in as user {user_id}");
        self.user_id = Some(user_id);
        if self.status.status() == Status::HasDhKey {
            let _ = self.status.advance(Status::Signed, StatusReason::Remote);
        }
    }

    fn handle_bad_msg(&mut self, server_msg_id: MessageId, notice: enums::BadMsgNotification) -> Result<(), ConnectionError> {
        match notice {
            enums::BadMsgNotification::BadServerSalt(bad) => {
                debug!("[teleproto] server salt is now {:016x}", bad.new_server_salt);
                self.salt = bad.new_server_salt as u64;
                self.resend(MessageId(bad.bad_msg_id as u64))
            }
            enums::BadMsgNotification::BadMsgNotification(bad) if matches!(bad.error_code, 16 | 17) => {
                let offset = server_msg_id.unix_secs() as i64 - unix_time() as i64;
                warn!("[teleproto] clock off by {offset}s (code {}), correcting", bad.error_code);
                if let Some(session) = self.session.as_mut() {
                    let ids = session.session_mut().msg_ids();
                    *ids = MessageIdGenerator::new();
                    ids.set_time_offset(offset);
                }
                self.resend(MessageId(bad.bad_msg_id as u64))
            }
            enums::BadMsgNotification::BadMsgNotification(bad) => {
                warn!("[teleproto] message {} rejected with code {}", bad.bad_msg_id, bad.error_code);
                self.resolve(MessageId(bad.bad_msg_id as u64), Err(InvocationError::BadMessage { code: bad.error_code }));
                Ok(())
            }
        }
    }

    /// Sends a rejected request again under a new id.
    fn resend(&mut self, bad_msg_id: MessageId) -> Result<(), ConnectionError> {
        let Some(pending) = self.pending.remove(&bad_msg_id) else {
            debug!("[teleproto] nothing to resend for {bad_msg_id}");
            return Ok(());
        };
        let msg_id = self.send_encrypted(&pending.body, true)?;
        debug!("[teleproto] {} resent as {msg_id}", pending.first_id);
        self.pending.insert(msg_id, pending);
        Ok(())
    }

    fn resolve(&mut self, msg_id: MessageId, outcome: Outcome) {
        match self.pending.remove(&msg_id) {
            Some(pending) => {
                let _ = pending.tx.send(outcome);
            }
            None => debug!("[teleproto] reply for unknown {msg_id}"),
        }
    }

    /// Marks the connection failed, e.g. after the transport closed. Every
    /// pending call resolves with [`InvocationError::Dropped`].
    pub fn abort(&mut self, reason: StatusReason) {
        self.fail(reason, || InvocationError::Dropped);
    }

    /// Fails the connection and every pending call.
    fn fail(&mut self, reason: StatusReason, error: impl Fn() -> InvocationError) {
        self.status.fail(reason);
        for (_, pending) in self.pending.drain() {
            let _ = pending.tx.send(Err(error()));
        }
    }
}

fn connection_to_invocation(e: ConnectionError) -> InvocationError {
    match e {
        ConnectionError::Io(e) => InvocationError::Io(e),
        ConnectionError::Transport(code) => InvocationError::Transport(code),
        ConnectionError::NotConnected => InvocationError::NotReady,
        _ => InvocationError::Dropped,
    }
}
