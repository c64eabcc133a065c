//! Sans-IO MTProto authorization key generation, server side.
//!
//! Answers `req_pq`/`req_pq_multi`, `req_DH_params` and
//! `set_client_DH_params` in turn, then hands back the shared key.

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use teleproto_crypto::{AuthKey, DhParams, aes, generate_key_data_from_nonce, generate_pq, rsa, sha1};
use teleproto_tl_types::{Cursor, Deserializable, Identifiable, Serializable, deserialize, enums, functions, types};

use crate::authentication::{first_salt, trim_be};
use crate::message::{MessageIdGenerator, MessageIdMode, PlainMessage, PlainMessageError};

/// Errors from the server side of the key exchange. All of them abort the
/// exchange.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Plain(PlainMessageError),
    InvalidRequest { error: deserialize::Error },
    UnexpectedRequest { id: Option<u32> },
    InvalidNonce,
    InvalidServerNonce,
    UnknownFingerprint { fingerprint: i64 },
    Rsa(rsa::RsaError),
    InvalidInnerData { error: deserialize::Error },
    InvalidDataHash,
    InvalidPq,
    EncryptedDataNotPadded { len: usize },
    GParameterOutOfRange,
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(e) => write!(f, "{e}"),
            Self::InvalidRequest { error } => write!(f, "malformed handshake request: {error}"),
            Self::UnexpectedRequest { id: Some(id) } => write!(f, "unexpected handshake request {id:#010x}"),
            Self::UnexpectedRequest { id: None } => write!(f, "empty handshake request"),
            Self::InvalidNonce => write!(f, "nonce mismatch"),
            Self::InvalidServerNonce => write!(f, "server_nonce mismatch"),
            Self::UnknownFingerprint { fingerprint } => write!(f, "no private key with fingerprint {fingerprint}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::InvalidInnerData { error } => write!(f, "malformed inner data: {error}"),
            Self::InvalidDataHash => write!(f, "inner data hash mismatch"),
            Self::InvalidPq => write!(f, "p and q do not match the issued pq"),
            Self::EncryptedDataNotPadded { len } => write!(f, "encrypted data len {len} is not 16-byte aligned"),
            Self::GParameterOutOfRange => write!(f, "g_b is outside the safe range"),
            Self::Closed => write!(f, "key exchange is over"),
        }
    }
}

impl std::error::Error for Error {}

impl From<PlainMessageError> for Error {
    fn from(e: PlainMessageError) -> Self {
        Self::Plain(e)
    }
}

impl From<rsa::RsaError> for Error {
    fn from(e: rsa::RsaError) -> Self {
        Self::Rsa(e)
    }
}

/// The key both sides now share.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerFinished {
    /// The shared authorization key.
    pub auth_key: AuthKey,
    /// Initial server salt: `new_nonce[..8] XOR server_nonce[..8]`.
    pub first_salt: u64,
}

/// What to do after feeding a request to [`ServerHandshake::handle`].
#[derive(Debug)]
pub enum ServerStep {
    /// Send this plaintext packet and wait for the next request.
    Reply(Vec<u8>),
    /// Send `reply` (`dh_gen_ok`); the key is ready.
    Done {
        /// Plaintext packet to send.
        reply: Vec<u8>,
        /// The negotiated key.
        finished: ServerFinished,
    },
}

enum Stage {
    AwaitReqPq,
    AwaitDhParams { nonce: [u8; 16], server_nonce: [u8; 16], pq: u64 },
    AwaitClientDh { nonce: [u8; 16], server_nonce: [u8; 16], new_nonce: [u8; 32], a: [u8; 256] },
    Done,
    Failed,
}

/// Drives the server side of the key exchange for one connection.
pub struct ServerHandshake {
    keys: Arc<[rsa::PrivateKey]>,
    dh: DhParams,
    msg_ids: MessageIdGenerator,
    stage: Stage,
}

impl ServerHandshake {
    /// A handshake offering `keys` and the group `dh`.
    pub fn new(keys: Arc<[rsa::PrivateKey]>, dh: DhParams) -> Self {
        Self { keys, dh, msg_ids: MessageIdGenerator::new(), stage: Stage::AwaitReqPq }
    }

    /// Whether the key has been handed out.
    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    /// Feeds a plaintext packet from the client.
    pub fn handle(&mut self, packet: &[u8]) -> Result<ServerStep, Error> {
        let message = PlainMessage::from_bytes(packet)?;
        let body = &message.body[..];
        let id = crate::envelope::constructor_id(body);

        let stage = std::mem::replace(&mut self.stage, Stage::Failed);
        match (stage, id) {
            (Stage::AwaitReqPq, Some(functions::ReqPq::CONSTRUCTOR_ID)) => {
                let request: functions::ReqPq = parse(body)?;
                self.res_pq(request.nonce)
            }
            (Stage::AwaitReqPq, Some(functions::ReqPqMulti::CONSTRUCTOR_ID)) => {
                let request: functions::ReqPqMulti = parse(body)?;
                self.res_pq(request.nonce)
            }
            (Stage::AwaitDhParams { nonce, server_nonce, pq }, Some(functions::ReqDhParams::CONSTRUCTOR_ID)) => {
                self.server_dh_params(parse(body)?, nonce, server_nonce, pq, &crate::random_bytes())
            }
            (Stage::AwaitClientDh { nonce, server_nonce, new_nonce, a }, Some(functions::SetClientDhParams::CONSTRUCTOR_ID)) => {
                self.dh_gen(parse(body)?, nonce, server_nonce, new_nonce, &a)
            }
            (Stage::Done, _) => {
                self.stage = Stage::Done;
                Err(Error::Closed)
            }
            (Stage::Failed, _) => Err(Error::Closed),
            (_, id) => {
                warn!("[teleproto] unexpected handshake request {id:?}");
                Err(Error::UnexpectedRequest { id })
            }
        }
    }

    fn reply<S: Serializable>(&mut self, body: &S) -> Vec<u8> {
        PlainMessage { msg_id: self.msg_ids.next(MessageIdMode::ServerReply), body: body.to_bytes() }.to_bytes()
    }

    fn res_pq(&mut self, nonce: [u8; 16]) -> Result<ServerStep, Error> {
        let server_nonce = crate::random_bytes();
        let (p, q) = generate_pq();
        let pq = p * q;

        let response = enums::ResPq::ResPq(types::ResPq {
            nonce,
            server_nonce,
            pq: pq.to_be_bytes().to_vec(),
            server_public_key_fingerprints: self.keys.iter().map(|k| k.fingerprint()).collect(),
        });
        self.stage = Stage::AwaitDhParams { nonce, server_nonce, pq };
        debug!("[teleproto] resPQ sent");
        Ok(ServerStep::Reply(self.reply(&response)))
    }

    fn server_dh_params(
        &mut self,
        request: functions::ReqDhParams,
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        pq: u64,
        random: &[u8; 256 + 15],
    ) -> Result<ServerStep, Error> {
        check(request.nonce == nonce, Error::InvalidNonce)?;
        check(request.server_nonce == server_nonce, Error::InvalidServerNonce)?;

        let key = self
            .keys
            .iter()
            .find(|k| k.fingerprint() == request.public_key_fingerprint)
            .ok_or(Error::UnknownFingerprint { fingerprint: request.public_key_fingerprint })?;
        let block = key.decrypt(&request.encrypted_data)?;

        let (inner, used) = enums::PQInnerData::from_bytes_prefix(&block[20..])
            .map_err(|error| Error::InvalidInnerData { error })?;
        check(sha1!(&block[20..20 + used])[..] == block[..20], Error::InvalidDataHash)?;
        let enums::PQInnerData::PQInnerData(inner) = inner;

        check(inner.nonce == nonce, Error::InvalidNonce)?;
        check(inner.server_nonce == server_nonce, Error::InvalidServerNonce)?;
        check(inner.pq == pq.to_be_bytes(), Error::InvalidPq)?;
        let p = be_u64(&request.p).ok_or(Error::InvalidPq)?;
        let q = be_u64(&request.q).ok_or(Error::InvalidPq)?;
        check(p < q && p.checked_mul(q) == Some(pq), Error::InvalidPq)?;
        check(inner.p == trim_be(p) && inner.q == trim_be(q), Error::InvalidPq)?;

        let mut a = [0u8; 256];
        a.copy_from_slice(&random[..256]);
        let g_a = self.dh.public_value(&a).map_err(|_| Error::GParameterOutOfRange)?;

        let answer = enums::ServerDhInnerData::ServerDhInnerData(types::ServerDhInnerData {
            nonce,
            server_nonce,
            g: self.dh.g as i32,
            dh_prime: self.dh.prime_bytes(),
            g_a,
            server_time: crate::unix_time() as i32,
        })
        .to_bytes();

        let pad_len = (16 - ((20 + answer.len()) % 16)) % 16;
        let mut encrypted_answer = Vec::with_capacity(20 + answer.len() + pad_len);
        encrypted_answer.extend_from_slice(&sha1!(&answer));
        encrypted_answer.extend_from_slice(&answer);
        encrypted_answer.extend_from_slice(&random[256..256 + pad_len]);

        let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &inner.new_nonce);
        aes::ige_encrypt(&mut encrypted_answer, &tmp_key, &tmp_iv);

        let response = enums::ServerDhParams::Ok(types::ServerDhParamsOk { nonce, server_nonce, encrypted_answer });
        self.stage = Stage::AwaitClientDh { nonce, server_nonce, new_nonce: inner.new_nonce, a };
        debug!("[teleproto] server_DH_params_ok sent");
        Ok(ServerStep::Reply(self.reply(&response)))
    }

    fn dh_gen(
        &mut self,
        request: functions::SetClientDhParams,
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce: [u8; 32],
        a: &[u8; 256],
    ) -> Result<ServerStep, Error> {
        check(request.nonce == nonce, Error::InvalidNonce)?;
        check(request.server_nonce == server_nonce, Error::InvalidServerNonce)?;

        let mut data = request.encrypted_data;
        if data.len() % 16 != 0 || data.len() < 32 {
            return Err(Error::EncryptedDataNotPadded { len: data.len() });
        }
        let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        aes::ige_decrypt(&mut data, &tmp_key, &tmp_iv);

        let mut cursor = Cursor::from_slice(&data[20..]);
        let enums::ClientDhInnerData::ClientDhInnerData(inner) =
            enums::ClientDhInnerData::deserialize(&mut cursor).map_err(|error| Error::InvalidInnerData { error })?;
        check(sha1!(&data[20..20 + cursor.pos()])[..] == data[..20], Error::InvalidDataHash)?;

        check(inner.nonce == nonce, Error::InvalidNonce)?;
        check(inner.server_nonce == server_nonce, Error::InvalidServerNonce)?;
        check(self.dh.is_safe_value(&inner.g_b), Error::GParameterOutOfRange)?;

        let secret = self.dh.shared_secret(&inner.g_b, a).map_err(|_| Error::GParameterOutOfRange)?;
        let auth_key = AuthKey::from_bytes(secret);

        let response = enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk {
            nonce,
            server_nonce,
            new_nonce_hash1: auth_key.calc_new_nonce_hash(&new_nonce, 1),
        });
        info!("[teleproto] auth key {:016x} negotiated", auth_key.id());

        let finished = ServerFinished { auth_key, first_salt: first_salt(&new_nonce, &server_nonce) };
        self.stage = Stage::Done;
        Ok(ServerStep::Done { reply: self.reply(&response), finished })
    }
}

fn parse<T: Deserializable>(body: &[u8]) -> Result<T, Error> {
    T::from_bytes(body).map_err(|error| Error::InvalidRequest { error })
}

fn check(ok: bool, error: Error) -> Result<(), Error> {
    if ok { Ok(()) } else { Err(error) }
}

fn be_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}
