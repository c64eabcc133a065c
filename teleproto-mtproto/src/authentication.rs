//! Sans-IO MTProto authorization key generation, client side.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = authentication::step1()?;
//! // send req, receive resp
//! let (req, s2) = authentication::step2(s1, resp, &keys)?;
//! // send req, receive resp
//! let (req, s3) = authentication::step3(s2, resp)?;
//! // send req, receive resp
//! let done = authentication::finish(s3, resp)?;
//! // done.auth_key is ready
//! ```
//!
//! [`ClientHandshake`] drives the same steps over plaintext packets.

use std::fmt;

use log::{debug, info};
use teleproto_crypto::{AuthKey, DhParams, aes, factorize, generate_key_data_from_nonce, rsa, sha1};
use teleproto_tl_types::{Cursor, Deserializable, Serializable, enums, functions, types};

use crate::message::{MessageIdGenerator, MessageIdMode, PlainMessage, PlainMessageError};

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize { size: usize },
    FactorizationFailed { pq: u64 },
    UnknownFingerprints { fingerprints: Vec<i64> },
    Rsa(rsa::RsaError),
    DhParamsFail,
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData { error: teleproto_tl_types::deserialize::Error },
    InvalidDhPrime { bits: u64 },
    GParameterOutOfRange { name: &'static str },
    DhGenRetry,
    DhGenFail,
    InvalidAnswerHash { got: [u8; 20], expected: [u8; 20] },
    InvalidNewNonceHash { got: [u8; 16], expected: [u8; 16] },
    InvalidResponse { error: teleproto_tl_types::deserialize::Error },
    Plain(PlainMessageError),
    UnexpectedResponse { state: HandshakeState },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { got, expected } => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidPqSize { size } => write!(f, "pq size {size} invalid (expected 8)"),
            Self::FactorizationFailed { pq } => write!(f, "could not factorize pq={pq}"),
            Self::UnknownFingerprints { fingerprints } => write!(f, "no known fingerprint in {fingerprints:?}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::DhParamsFail => write!(f, "server returned DH params failure"),
            Self::InvalidServerNonce { got, expected } => {
                write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}")
            }
            Self::EncryptedResponseNotPadded { len } => {
                write!(f, "encrypted answer len {len} is not 16-byte aligned")
            }
            Self::InvalidDhInnerData { error } => write!(f, "DH inner data deserialization error: {error}"),
            Self::InvalidDhPrime { bits } => write!(f, "dh_prime has {bits} bits (expected 2048)"),
            Self::GParameterOutOfRange { name } => write!(f, "{name} is outside the safe range"),
            Self::DhGenRetry => write!(f, "DH gen retry requested"),
            Self::DhGenFail => write!(f, "DH gen failed"),
            Self::InvalidAnswerHash { got, expected } => {
                write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidNewNonceHash { got, expected } => {
                write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidResponse { error } => write!(f, "malformed handshake response: {error}"),
            Self::Plain(e) => write!(f, "{e}"),
            Self::UnexpectedResponse { state } => write!(f, "unexpected handshake packet in state {state:?}"),
        }
    }
}

impl From<rsa::RsaError> for Error {
    fn from(e: rsa::RsaError) -> Self {
        Self::Rsa(e)
    }
}

impl From<PlainMessageError> for Error {
    fn from(e: PlainMessageError) -> Self {
        Self::Plain(e)
    }
}

// ─── RSA key table ───────────────────────────────────────────────────────────

/// Server public keys the client trusts, looked up by fingerprint.
#[derive(Clone, Debug)]
pub struct RsaKeyTable {
    keys: Vec<(i64, rsa::Key)>,
}

impl RsaKeyTable {
    /// An empty table.
    pub fn empty() -> Self {
        Self { keys: Vec::new() }
    }

    /// A table with the given keys.
    pub fn from_keys(keys: impl IntoIterator<Item = rsa::Key>) -> Self {
        let mut table = Self::empty();
        for key in keys {
            table.insert(key);
        }
        table
    }

    /// Adds `key` under its fingerprint, replacing an existing entry.
    pub fn insert(&mut self, key: rsa::Key) {
        let fp = key.fingerprint();
        self.keys.retain(|(known, _)| *known != fp);
        self.keys.push((fp, key));
    }

    /// The key with fingerprint `fp`.
    pub fn get(&self, fp: i64) -> Option<&rsa::Key> {
        self.keys.iter().find(|(known, _)| *known == fp).map(|(_, key)| key)
    }

    /// First advertised fingerprint we have a key for.
    pub fn select(&self, advertised: &[i64]) -> Option<(i64, &rsa::Key)> {
        advertised.iter().find_map(|&fp| self.get(fp).map(|key| (fp, key)))
    }

    /// Fingerprints of all keys in the table.
    pub fn fingerprints(&self) -> Vec<i64> {
        self.keys.iter().map(|(fp, _)| *fp).collect()
    }
}

impl Default for RsaKeyTable {
    /// The production and test keys of the reference deployment.
    #[allow(clippy::unreadable_literal)]
    fn default() -> Self {
        Self::from_keys(
            [
                "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323",
                "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949",
            ]
            .into_iter()
            .filter_map(|n| rsa::Key::new(n, "65537")),
        )
    }
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
#[derive(Clone, Debug)]
pub struct Step1 {
    nonce: [u8; 16],
}

/// State after step 2.
#[derive(Clone, Debug)]
pub struct Step2 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}

/// State after step 3.
#[derive(Clone, Debug)]
pub struct Step3 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    gab: [u8; 256],
    time_offset: i64,
}

/// The final output of a successful auth key handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    /// The shared authorization key.
    pub auth_key: AuthKey,
    /// Clock skew in seconds relative to the server.
    pub time_offset: i64,
    /// Initial server salt: `new_nonce[..8] XOR server_nonce[..8]`.
    pub first_salt: u64,
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

/// Generate a `req_pq_multi` request. Returns the request + opaque state.
pub fn step1() -> Result<(functions::ReqPqMulti, Step1), Error> {
    do_step1(&crate::random_bytes())
}

fn do_step1(random: &[u8; 16]) -> Result<(functions::ReqPqMulti, Step1), Error> {
    let nonce = *random;
    Ok((functions::ReqPqMulti { nonce }, Step1 { nonce }))
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

const STEP2_RANDOM: usize = 32 + rsa::RANDOM_LEN;

/// Process `ResPQ` and generate `req_DH_params`.
pub fn step2(data: Step1, response: enums::ResPq, keys: &RsaKeyTable) -> Result<(functions::ReqDhParams, Step2), Error> {
    do_step2(data, response, keys, &crate::random_bytes::<STEP2_RANDOM>())
}

fn do_step2(
    data: Step1,
    response: enums::ResPq,
    keys: &RsaKeyTable,
    random: &[u8; STEP2_RANDOM],
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let Step1 { nonce } = data;
    let enums::ResPq::ResPq(res_pq) = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    let pq_bytes: [u8; 8] =
        res_pq.pq.as_slice().try_into().map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
    let pq = u64::from_be_bytes(pq_bytes);
    let (p, q) = factorize(pq).ok_or(Error::FactorizationFailed { pq })?;
    debug!("[teleproto] pq={pq} factorized into {p} * {q}");

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);
    let mut padding = [0u8; rsa::RANDOM_LEN];
    padding.copy_from_slice(&random[32..]);

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = enums::PQInnerData::PQInnerData(types::PQInnerData {
        pq: res_pq.pq.clone(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: res_pq.server_nonce,
        new_nonce,
    })
    .to_bytes();

    let (fingerprint, key) = keys
        .select(&res_pq.server_public_key_fingerprints)
        .ok_or_else(|| Error::UnknownFingerprints { fingerprints: res_pq.server_public_key_fingerprints.clone() })?;
    let ciphertext = rsa::encrypt_hashed(&pq_inner, key, &padding)?;

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: fingerprint,
            encrypted_data: ciphertext,
        },
        Step2 { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

/// Big-endian bytes without leading zeros.
pub(crate) fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `ServerDhParams` and generate `set_client_DH_params`.
pub fn step3(data: Step2, response: enums::ServerDhParams) -> Result<(functions::SetClientDhParams, Step3), Error> {
    // 256 for DH b, 16 for padding
    do_step3(data, response, &crate::random_bytes::<272>(), crate::unix_time() as i64)
}

fn do_step3(
    data: Step2,
    response: enums::ServerDhParams,
    random: &[u8; 272],
    now: i64,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(f) => {
            check_nonce(&f.nonce, &nonce)?;
            check_server_nonce(&f.server_nonce, &server_nonce)?;
            let digest = sha1!(new_nonce);
            let mut expected_hash = [0u8; 16];
            expected_hash.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len % 16 != 0 || len < 32 {
        return Err(Error::EncryptedResponseNotPadded { len });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let enums::ServerDhInnerData::ServerDhInnerData(inner) =
        enums::ServerDhInnerData::deserialize(&mut cursor).map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash = sha1!(&plain[20..20 + cursor.pos()]);
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh = DhParams { prime: num_bigint::BigUint::from_bytes_be(&inner.dh_prime), g: inner.g as u32 };
    if dh.prime.bits() != 2048 {
        return Err(Error::InvalidDhPrime { bits: dh.prime.bits() });
    }
    if !(2..=7).contains(&inner.g) {
        return Err(Error::GParameterOutOfRange { name: "g" });
    }
    if !dh.is_safe_value(&inner.g_a) {
        return Err(Error::GParameterOutOfRange { name: "g_a" });
    }

    let b = &random[..256];
    let g_b = dh.public_value(b).map_err(|_| Error::GParameterOutOfRange { name: "g_b" })?;
    if !dh.is_safe_value(&g_b) {
        return Err(Error::GParameterOutOfRange { name: "g_b" });
    }
    let gab = dh.shared_secret(&inner.g_a, b).map_err(|_| Error::GParameterOutOfRange { name: "g_ab" })?;
    let time_offset = i64::from(inner.server_time) - now;

    let client_dh_inner = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b,
    })
    .to_bytes();

    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;
    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&sha1!(&client_dh_inner));
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend_from_slice(&random[256..256 + pad_len]);

    aes::ige_encrypt(&mut hashed, &key, &iv);

    Ok((
        functions::SetClientDhParams { nonce, server_nonce, encrypted_data: hashed },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Finalise the handshake. Returns the ready [`Finished`] on success.
pub fn finish(data: Step3, response: enums::SetClientDhParamsAnswer) -> Result<Finished, Error> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        hash: [u8; 16],
        num: u8,
    }

    let dh = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 }
        }
        enums::SetClientDhParamsAnswer::DhGenRetry(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 }
        }
        enums::SetClientDhParamsAnswer::DhGenFail(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 }
        }
    };

    check_nonce(&dh.nonce, &nonce)?;
    check_server_nonce(&dh.server_nonce, &server_nonce)?;

    let auth_key = AuthKey::from_bytes(gab);
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    check_new_nonce_hash(&dh.hash, &expected_hash)?;

    match dh.num {
        1 => Ok(Finished { auth_key, time_offset, first_salt: first_salt(&new_nonce, &server_nonce) }),
        2 => Err(Error::DhGenRetry),
        _ => Err(Error::DhGenFail),
    }
}

/// `new_nonce[..8] XOR server_nonce[..8]`, little-endian.
pub fn first_salt(new_nonce: &[u8; 32], server_nonce: &[u8; 16]) -> u64 {
    let mut buf = [0u8; 8];
    for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
        *dst = a ^ b;
    }
    u64::from_le_bytes(buf)
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Where a [`ClientHandshake`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Init,
    /// Waiting for `resPQ`.
    ReqPqSent,
    /// Waiting for `server_DH_params`.
    DhParamsSent,
    /// Waiting for `dh_gen_*`.
    ClientDhSent,
    /// The key is ready.
    Done,
    /// A step failed; start over on a new connection.
    Failed,
}

enum Stage {
    Init,
    ReqPqSent(Step1),
    DhParamsSent(Step2),
    ClientDhSent(Step3),
    Done,
    Failed,
}

/// What the caller should do after feeding a packet to the handshake.
#[derive(Debug)]
pub enum ClientStep {
    /// Send this plaintext packet.
    Send(Vec<u8>),
    /// The key exchange is complete.
    Done(Finished),
}

/// Drives the client side of the key exchange over plaintext packets.
pub struct ClientHandshake {
    keys: RsaKeyTable,
    msg_ids: MessageIdGenerator,
    stage: Stage,
}

impl ClientHandshake {
    /// A handshake that trusts the keys in `keys`.
    pub fn new(keys: RsaKeyTable) -> Self {
        Self { keys, msg_ids: MessageIdGenerator::new(), stage: Stage::Init }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        match self.stage {
            Stage::Init => HandshakeState::Init,
            Stage::ReqPqSent(_) => HandshakeState::ReqPqSent,
            Stage::DhParamsSent(_) => HandshakeState::DhParamsSent,
            Stage::ClientDhSent(_) => HandshakeState::ClientDhSent,
            Stage::Done => HandshakeState::Done,
            Stage::Failed => HandshakeState::Failed,
        }
    }

    /// The first packet, `req_pq_multi`.
    pub fn start(&mut self) -> Result<Vec<u8>, Error> {
        if !matches!(self.stage, Stage::Init) {
            return Err(Error::UnexpectedResponse { state: self.state() });
        }
        let (request, step) = step1()?;
        self.stage = Stage::ReqPqSent(step);
        debug!("[teleproto] req_pq_multi sent");
        Ok(self.wrap(&request))
    }

    /// Feeds a plaintext packet from the server.
    pub fn handle(&mut self, packet: &[u8]) -> Result<ClientStep, Error> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed);
        let result = self.advance(stage, packet);
        if result.is_err() {
            self.stage = Stage::Failed;
        }
        result
    }

    fn advance(&mut self, stage: Stage, packet: &[u8]) -> Result<ClientStep, Error> {
        let message = PlainMessage::from_bytes(packet)?;
        let body = &message.body[..];
        match stage {
            Stage::ReqPqSent(step) => {
                let (request, next) = step2(step, parse(body)?, &self.keys)?;
                self.stage = Stage::DhParamsSent(next);
                debug!("[teleproto] req_DH_params sent");
                Ok(ClientStep::Send(self.wrap(&request)))
            }
            Stage::DhParamsSent(step) => {
                let (request, next) = step3(step, parse(body)?)?;
                self.stage = Stage::ClientDhSent(next);
                debug!("[teleproto] set_client_DH_params sent");
                Ok(ClientStep::Send(self.wrap(&request)))
            }
            Stage::ClientDhSent(step) => {
                let done = finish(step, parse(body)?)?;
                self.stage = Stage::Done;
                info!("[teleproto] auth key {:016x} generated", done.auth_key.id());
                Ok(ClientStep::Done(done))
            }
            other => {
                self.stage = other;
                Err(Error::UnexpectedResponse { state: self.state() })
            }
        }
    }

    fn wrap<S: Serializable>(&mut self, request: &S) -> Vec<u8> {
        PlainMessage { msg_id: self.msg_ids.next(MessageIdMode::Client), body: request.to_bytes() }.to_bytes()
    }
}

fn parse<T: Deserializable>(body: &[u8]) -> Result<T, Error> {
    T::from_bytes(body).map_err(|error| Error::InvalidResponse { error })
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else { Err(Error::InvalidNonce { got: *got, expected: *expected }) }
}

fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else { Err(Error::InvalidServerNonce { got: *got, expected: *expected }) }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else { Err(Error::InvalidNewNonceHash { got: *got, expected: *expected }) }
}
