//! One accepted client connection, sans-IO.
//!
//! Feed every packet to [`ServerConnection::process_incoming`]; replies are
//! pushed into the [`Transport`]. Plaintext packets drive the key exchange.
//! Encrypted packets are opened, checked and taken apart, with service
//! messages answered on the spot; API requests are queued and run once the
//! packet has been fully decoded.

use teleproto_crypto::DecryptError;
use teleproto_mtproto::encrypted::FramingError;
use teleproto_mtproto::envelope::{self, GZIP_PACKED_ID, MSG_CONTAINER_ID};
use teleproto_mtproto::message::packet_key_id;
use teleproto_mtproto::transport::Transport;
use teleproto_mtproto::{EncryptedSession, MessageId, MessageIdMode, SaltWindow, TransportErrorCode, dh_server, unix_time};
use teleproto_tl_types::{Deserializable, Identifiable, RawVec, Serializable, enums, functions, types};
use tracing::{debug, info, warn};

use crate::errors::ConnectionError;
use crate::server::Server;
use crate::server::dispatch::{ClientInfo, Context, Dispatcher, Reply};
use crate::status::{Status, StatusReason, StatusTracker};

/// bad_msg_notification codes.
const MSG_ID_TOO_LOW: i32 = 16;
const MSG_ID_TOO_HIGH: i32 = 17;
const MSG_ID_BAD_BITS: i32 = 18;
const BAD_SALT: i32 = 48;

/// Server side of one connection.
pub struct ServerConnection<T: Transport> {
    server: Server,
    transport: T,
    status: StatusTracker,
    handshake: Option<dh_server::ServerHandshake>,
    session: Option<EncryptedSession>,
    salts: Option<SaltWindow>,
    dispatcher: Dispatcher,
    client: ClientInfo,
}

impl<T: Transport> ServerConnection<T> {
    /// A connection whose transport is already open.
    pub fn new(server: Server, transport: T) -> Self {
        let status = StatusTracker::new();
        // The transport exists, so both steps happen at once.
        let _ = status.advance(Status::Connecting, StatusReason::Remote);
        let _ = status.advance(Status::Connected, StatusReason::Remote);
        let dispatcher = Dispatcher::new(server.factories());
        Self { server, transport, status, handshake: None, session: None, salts: None, dispatcher, client: ClientInfo::default() }
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// What the client reported through `initConnection`.
    pub fn client_info(&self) -> &ClientInfo {
        &self.client
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Auth key id in use, once known.
    pub fn auth_key_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.auth_key().id())
    }

    /// Handles one packet from the client.
    pub fn process_incoming(&mut self, packet: &[u8]) -> Result<(), ConnectionError> {
        if self.status.status() == Status::Failed {
            return Err(ConnectionError::Failed);
        }
        let Some(key_id) = packet_key_id(packet) else {
            self.status.fail(StatusReason::Remote);
            return Err(ConnectionError::Framing(FramingError::Crypto(DecryptError::InvalidBuffer)));
        };
        if key_id == 0 { self.handle_plain(packet) } else { self.handle_encrypted(key_id, packet) }
    }

    // ── Key exchange ───────────────────────────────────────────────────────

    fn handle_plain(&mut self, packet: &[u8]) -> Result<(), ConnectionError> {
        if self.session.is_some() {
            self.status.fail(StatusReason::Remote);
            return Err(ConnectionError::UnexpectedPlaintext);
        }
        let server = self.server.clone();
        let config = server.config();
        let handshake = self
            .handshake
            .get_or_insert_with(|| dh_server::ServerHandshake::new(config.rsa_keys.clone(), config.dh.clone()));

        match handshake.handle(packet) {
            Ok(dh_server::ServerStep::Reply(reply)) => self.send_raw(&reply),
            Ok(dh_server::ServerStep::Done { reply, finished }) => {
                self.send_raw(&reply)?;
                self.handshake = None;
                let key_id = finished.auth_key.id();
                self.server.registry().auth_keys().insert(finished.auth_key.clone());
                self.session = Some(EncryptedSession::server(finished.auth_key));
                self.salts = Some(SaltWindow::with_initial(config.salts.clone(), finished.first_salt, unix_time()));
                info!("[teleproto] auth key {key_id:016x} created");
                self.status.advance(Status::HasDhKey, StatusReason::Remote)
            }
            Err(e) => {
                warn!("[teleproto] key exchange failed: {e}");
                self.status.fail(StatusReason::Remote);
                Err(e.into())
            }
        }
    }

    /// Picks up a key created on an earlier connection.
    fn adopt_key(&mut self, key_id: u64) -> Result<(), ConnectionError> {
        let registry = self.server.registry();
        let Some(auth_key) = registry.auth_keys().get(key_id) else {
            warn!("[teleproto] unknown auth key {key_id:016x}");
            let _ = self.transport.send(&TransportErrorCode::InvalidAuthKey.to_bytes());
            self.status.fail(StatusReason::Local);
            return Err(ConnectionError::UnknownAuthKey { key_id });
        };
        let config = self.server.config();
        self.handshake = None;
        self.session = Some(EncryptedSession::server(auth_key));
        self.salts = Some(SaltWindow::new(config.salts.clone(), unix_time()));
        self.status.advance(Status::HasDhKey, StatusReason::Remote)?;
        if registry.bound_user(key_id).is_some() {
            self.status.advance(Status::Signed, StatusReason::Remote)?;
        }
        debug!("[teleproto] resumed auth key {key_id:016x}");
        Ok(())
    }

    // ── Encrypted traffic ──────────────────────────────────────────────────

    fn handle_encrypted(&mut self, key_id: u64, packet: &[u8]) -> Result<(), ConnectionError> {
        match self.auth_key_id() {
            Some(current) if current == key_id => {}
            Some(current) => {
                warn!("[teleproto] auth key changed from {current:016x} to {key_id:016x}");
                self.status.fail(StatusReason::Remote);
                return Err(ConnectionError::UnknownAuthKey { key_id });
            }
            None => self.adopt_key(key_id)?,
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };
        let message = match session.open(packet) {
            Ok(message) => message,
            Err(e) => {
                warn!("[teleproto] dropping connection: {e}");
                self.status.fail(StatusReason::Remote);
                return Err(e.into());
            }
        };
        let now = unix_time();

        if message.new_session {
            self.server.registry().open_session(key_id, message.session_id, now);
            let server_salt = self.server_salt(now);
            let notice = enums::NewSession::Created(types::NewSessionCreated {
                first_msg_id: message.msg_id.0 as i64,
                unique_id: i64::from_le_bytes(random_array()),
                server_salt: server_salt as i64,
            });
            self.send_encrypted(&notice.to_bytes(), true, MessageIdMode::ServerInitiative)?;
        }

        if let Some(code) = self.check_msg_id(message.msg_id, now) {
            return self.bad_msg(message.msg_id, message.seq_no, code, None);
        }
        let fresh = self.session.as_mut().is_some_and(|s| s.session_mut().note_received(message.msg_id));
        if !fresh {
            debug!("[teleproto] duplicate msg_id {}", message.msg_id);
            return Ok(());
        }
        let salt_ok = self.salts.as_mut().is_some_and(|s| s.check_salt(message.salt, now));
        if !salt_ok {
            let new_salt = self.server_salt(now);
            debug!("[teleproto] bad salt {:016x}, current {new_salt:016x}", message.salt);
            return self.bad_msg(message.msg_id, message.seq_no, BAD_SALT, Some(new_salt));
        }

        let mut acks = Vec::new();
        self.handle_body(message.msg_id, message.seq_no, &message.body, &mut acks)?;
        self.run_deferred(message.session_id)?;
        if !acks.is_empty() {
            let ack = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids: acks });
            self.send_encrypted(&ack.to_bytes(), false, MessageIdMode::ServerInitiative)?;
        }
        Ok(())
    }

    fn check_msg_id(&self, msg_id: MessageId, now: u64) -> Option<i32> {
        if !msg_id.is_client() {
            return Some(MSG_ID_BAD_BITS);
        }
        let config = self.server.config();
        let sent = msg_id.unix_secs();
        if sent + config.max_past_msg_id.as_secs() < now {
            Some(MSG_ID_TOO_LOW)
        } else if sent > now + config.max_future_msg_id.as_secs() {
            Some(MSG_ID_TOO_HIGH)
        } else {
            None
        }
    }

    fn bad_msg(&mut self, msg_id: MessageId, seq_no: u32, code: i32, new_salt: Option<u64>) -> Result<(), ConnectionError> {
        debug!("[teleproto] rejecting {msg_id} with code {code}");
        let body = match new_salt {
            Some(salt) => enums::BadMsgNotification::BadServerSalt(types::BadServerSalt {
                bad_msg_id: msg_id.0 as i64,
                bad_msg_seqno: seq_no as i32,
                error_code: code,
                new_server_salt: salt as i64,
            }),
            None => enums::BadMsgNotification::BadMsgNotification(types::BadMsgNotification {
                bad_msg_id: msg_id.0 as i64,
                bad_msg_seqno: seq_no as i32,
                error_code: code,
            }),
        };
        self.send_encrypted(&body.to_bytes(), false, MessageIdMode::ServerReply)
    }

    /// Answers service messages and queues API requests.
    fn handle_body(&mut self, msg_id: MessageId, seq_no: u32, body: &[u8], acks: &mut Vec<i64>) -> Result<(), ConnectionError> {
        let Some(id) = envelope::constructor_id(body) else {
            warn!("[teleproto] empty message {msg_id}");
            return Ok(());
        };
        let now = unix_time();
        match id {
            MSG_CONTAINER_ID => match envelope::parse_container(body) {
                Ok(messages) => {
                    for inner in messages {
                        self.handle_body(inner.msg_id, inner.seq_no, &inner.body, acks)?;
                    }
                }
                Err(e) => warn!("[teleproto] bad container {msg_id}: {e}"),
            },
            GZIP_PACKED_ID => match envelope::gzip_unpacked(body) {
                Ok(inner) => self.handle_body(msg_id, seq_no, &inner, acks)?,
                Err(e) => warn!("[teleproto] bad gzip_packed {msg_id}: {e}"),
            },
            types::MsgsAck::CONSTRUCTOR_ID => debug!("[teleproto] ack received"),
            functions::Ping::CONSTRUCTOR_ID | functions::PingDelayDisconnect::CONSTRUCTOR_ID => {
                let ping_id = match id {
                    functions::Ping::CONSTRUCTOR_ID => functions::Ping::from_bytes(body).map(|p| p.ping_id),
                    _ => functions::PingDelayDisconnect::from_bytes(body).map(|p| p.ping_id),
                };
                match ping_id {
                    Ok(ping_id) => {
                        let pong = enums::Pong::Pong(types::Pong { msg_id: msg_id.0 as i64, ping_id });
                        self.send_encrypted(&pong.to_bytes(), true, MessageIdMode::ServerReply)?;
                    }
                    Err(e) => warn!("[teleproto] bad ping {msg_id}: {e}"),
                }
            }
            functions::GetFutureSalts::CONSTRUCTOR_ID => match functions::GetFutureSalts::from_bytes(body) {
                Ok(request) => {
                    let salts = self.salts.as_mut().map(|s| s.salts(request.num.max(0) as usize, now)).unwrap_or_default();
                    let reply = enums::FutureSalts::FutureSalts(types::FutureSalts {
                        req_msg_id: msg_id.0 as i64,
                        now: now as i32,
                        salts: RawVec(
                            salts
                                .into_iter()
                                .map(|s| types::FutureSalt {
                                    valid_since: s.valid_since as i32,
                                    valid_until: s.valid_until as i32,
                                    salt: s.salt as i64,
                                })
                                .collect(),
                        ),
                    });
                    self.send_encrypted(&reply.to_bytes(), true, MessageIdMode::ServerReply)?;
                }
                Err(e) => warn!("[teleproto] bad get_future_salts {msg_id}: {e}"),
            },
            functions::DestroySession::CONSTRUCTOR_ID => match functions::DestroySession::from_bytes(body) {
                Ok(request) => {
                    let current = self.session.as_ref().and_then(|s| s.session().id());
                    let key_id = self.auth_key_id().unwrap_or_default();
                    let destroyed = Some(request.session_id as u64) != current
                        && self.server.registry().destroy_session(key_id, request.session_id as u64);
                    let reply = if destroyed {
                        enums::DestroySessionRes::DestroySessionOk(types::DestroySessionOk { session_id: request.session_id })
                    } else {
                        enums::DestroySessionRes::DestroySessionNone(types::DestroySessionNone { session_id: request.session_id })
                    };
                    self.send_result(msg_id, Reply::ok(&reply))?;
                }
                Err(e) => warn!("[teleproto] bad destroy_session {msg_id}: {e}"),
            },
            _ => {
                if seq_no & 1 == 1 {
                    acks.push(msg_id.0 as i64);
                }
                if let Err(e) = self.dispatcher.enqueue(msg_id, body, &mut self.client) {
                    warn!("[teleproto] cannot dispatch {}: {e:?}", self.server.describe(id));
                    self.send_result(msg_id, Reply::Error(e.to_rpc_error()))?;
                }
            }
        }
        Ok(())
    }

    /// Runs every operation queued while decoding the last packet.
    fn run_deferred(&mut self, session_id: u64) -> Result<(), ConnectionError> {
        let key_id = self.auth_key_id().unwrap_or_default();
        while let Some(deferred) = self.dispatcher.pop() {
            let server = self.server.clone();
            let mut ctx = Context::new(server.registry(), server.config(), &self.client, key_id, session_id, unix_time());
            let reply = deferred.operation.run(&mut ctx);
            if ctx.signed_in() && self.status.status() == Status::HasDhKey {
                self.status.advance(Status::Signed, StatusReason::Remote)?;
            }
            if let Reply::Error(e) = &reply {
                debug!("[teleproto] {} answered with {e}", deferred.req_msg_id);
            }
            self.send_result(deferred.req_msg_id, reply)?;
        }
        Ok(())
    }

    // ── Output ─────────────────────────────────────────────────────────────

    fn server_salt(&mut self, now: u64) -> u64 {
        self.salts.as_mut().map(|s| s.server_salt(now)).unwrap_or_default()
    }

    fn send_result(&mut self, req_msg_id: MessageId, reply: Reply) -> Result<(), ConnectionError> {
        let body = envelope::maybe_compress(reply.into_bytes(), self.server.config().gzip_threshold);
        let packet = envelope::rpc_result(req_msg_id, &body);
        self.send_encrypted(&packet, true, MessageIdMode::ServerReply)
    }

    fn send_encrypted(&mut self, body: &[u8], content_related: bool, mode: MessageIdMode) -> Result<(), ConnectionError> {
        let salt = self.server_salt(unix_time());
        let Some(session) = self.session.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };
        let (packet, _) = session.seal(salt, body, content_related, mode)?;
        self.send_raw(&packet)
    }

    fn send_raw(&mut self, packet: &[u8]) -> Result<(), ConnectionError> {
        self.transport.send(packet).map_err(|e| ConnectionError::Send(e.to_string()))
    }
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    buf
}
