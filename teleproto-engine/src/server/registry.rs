//! State shared by every connection of one server.
//!
//! Connections touch each other only through the [`Registry`]: users, auth
//! keys and their user bindings, pending login codes, sessions per key and
//! uploaded files. Everything sits behind one `Mutex`; auth keys live in a
//! pluggable [`AuthKeyStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use md5::{Digest, Md5};
use sha2::Sha256;
use teleproto_crypto::AuthKey;
use teleproto_tl_types::{enums, types};
use tracing::{debug, info};

use crate::errors::RpcError;
use crate::file_transfer::hex;

/// Largest single part accepted by `upload.save*FilePart`.
pub const MAX_PART_SIZE: usize = 512 * 1024;
/// Parts one file may have.
pub const MAX_FILE_PARTS: i32 = 4000;
/// Uploads one auth key may have in progress; the stalest is dropped.
pub const MAX_UPLOADS_PER_KEY: usize = 16;
/// Seconds an upload may sit without a new part before it is dropped.
pub const UPLOAD_TTL: u64 = 3600;
/// Sessions remembered per auth key; the least recently opened is dropped.
pub const MAX_SESSIONS_PER_KEY: usize = 64;
/// Seconds a session is remembered after it was opened.
pub const SESSION_TTL: u64 = 24 * 3600;

// ─── Auth keys ────────────────────────────────────────────────────────────────

/// Where the server keeps auth keys, looked up by key id.
pub trait AuthKeyStore: Send + Sync {
    fn get(&self, key_id: u64) -> Option<AuthKey>;

    fn insert(&self, key: AuthKey);

    /// Returns whether a key was removed.
    fn remove(&self, key_id: u64) -> bool;
}

/// Keeps auth keys in memory only.
#[derive(Default)]
pub struct MemoryAuthKeyStore {
    keys: Mutex<HashMap<u64, AuthKey>>,
}

impl AuthKeyStore for MemoryAuthKeyStore {
    fn get(&self, key_id: u64) -> Option<AuthKey> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).get(&key_id).cloned()
    }

    fn insert(&self, key: AuthKey) {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).insert(key.id(), key);
    }

    fn remove(&self, key_id: u64) -> bool {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).remove(&key_id).is_some()
    }
}

// ─── Records ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct UserRecord {
    pub id: i32,
    pub access_hash: i64,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    /// Unix time the user stays online until.
    pub online_until: u64,
    /// Last time the user went offline, or 0.
    pub was_online: u64,
}

impl UserRecord {
    /// The TL form as seen by `viewer`.
    pub fn to_tl(&self, viewer: Option<i32>, now: u64) -> enums::User {
        let status = if self.online_until > now {
            enums::UserStatus::Online(types::UserStatusOnline { expires: self.online_until as i32 })
        } else if self.was_online > 0 {
            enums::UserStatus::Offline(types::UserStatusOffline { was_online: self.was_online as i32 })
        } else {
            enums::UserStatus::Empty
        };
        let is_self = viewer == Some(self.id);
        enums::User::User(types::User {
            is_self,
            contact: false,
            mutual_contact: false,
            deleted: false,
            bot: false,
            bot_chat_history: false,
            bot_nochats: false,
            verified: false,
            restricted: false,
            min: false,
            bot_inline_geo: false,
            id: self.id,
            access_hash: Some(self.access_hash),
            first_name: Some(self.first_name.clone()),
            last_name: (!self.last_name.is_empty()).then(|| self.last_name.clone()),
            username: None,
            phone: is_self.then(|| self.phone.clone()),
            photo: None,
            status: Some(status),
            bot_info_version: None,
            restriction_reason: None,
            bot_inline_placeholder: None,
            lang_code: None,
        })
    }
}

/// A login code sent to a phone number.
#[derive(Clone, Debug, PartialEq)]
pub struct LoginCode {
    pub phone_code_hash: String,
    pub code: String,
    pub expires: u64,
}

/// A file assembled from uploaded parts.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredFile {
    pub secret: i64,
    pub bytes: Vec<u8>,
    pub mtime: u64,
}

/// Where a published upload can be downloaded from.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedFile {
    pub location: enums::InputFileLocation,
    pub size: u64,
}

struct PartialUpload {
    parts: BTreeMap<i32, Vec<u8>>,
    total: Option<i32>,
    /// Time the last part arrived.
    touched: u64,
}

#[derive(Default)]
struct State {
    users: HashMap<i32, UserRecord>,
    phones: HashMap<String, i32>,
    next_user_id: i32,
    bindings: HashMap<u64, i32>,
    codes: HashMap<String, LoginCode>,
    /// Session id → time it was opened, per auth key.
    sessions: HashMap<u64, HashMap<u64, u64>>,
    uploads: HashMap<(u64, i64), PartialUpload>,
    files: HashMap<(i64, i32), StoredFile>,
    next_local_id: i32,
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Server-wide shared state.
pub struct Registry {
    secret: [u8; 32],
    volume_id: i64,
    auth_keys: Arc<dyn AuthKeyStore>,
    state: Mutex<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(MemoryAuthKeyStore::default()))
    }
}

impl Registry {
    pub fn new(auth_keys: Arc<dyn AuthKeyStore>) -> Self {
        let secret: [u8; 32] = random_array();
        Self {
            secret,
            volume_id: i64::from_le_bytes(random_array()) & i64::MAX,
            auth_keys,
            state: Mutex::new(State { next_user_id: 1000, next_local_id: 1, ..State::default() }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `SHA-256(secret ++ label ++ id)[..8]`, stable for the registry's life.
    fn derive_hash(&self, label: &[u8], id: i64) -> i64 {
        let mut hasher = Sha256::new();
        hasher.update(self.secret);
        hasher.update(label);
        hasher.update(id.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        i64::from_le_bytes(out)
    }

    // ── Auth keys & sessions ───────────────────────────────────────────────

    pub fn auth_keys(&self) -> &dyn AuthKeyStore {
        self.auth_keys.as_ref()
    }

    /// Records that `session_id` is in use under `key_id`. Sessions older
    /// than [`SESSION_TTL`] are forgotten on the way.
    pub fn open_session(&self, key_id: u64, session_id: u64, now: u64) {
        let mut state = self.state();
        state.sessions.retain(|_, sessions| {
            sessions.retain(|_, opened| now.saturating_sub(*opened) <= SESSION_TTL);
            !sessions.is_empty()
        });
        let sessions = state.sessions.entry(key_id).or_default();
        if !sessions.contains_key(&session_id) && sessions.len() >= MAX_SESSIONS_PER_KEY {
            if let Some(oldest) = sessions.iter().min_by_key(|(_, opened)| **opened).map(|(id, _)| *id) {
                sessions.remove(&oldest);
            }
        }
        sessions.insert(session_id, now);
    }

    /// Forgets `session_id`; returns whether it was known.
    pub fn destroy_session(&self, key_id: u64, session_id: u64) -> bool {
        let mut state = self.state();
        let Some(sessions) = state.sessions.get_mut(&key_id) else {
            return false;
        };
        let known = sessions.remove(&session_id).is_some();
        if sessions.is_empty() {
            state.sessions.remove(&key_id);
        }
        known
    }

    /// Sessions currently remembered for `key_id`.
    pub fn session_count(&self, key_id: u64) -> usize {
        self.state().sessions.get(&key_id).map_or(0, HashMap::len)
    }

    // ── Users ──────────────────────────────────────────────────────────────

    /// Registers a user, or returns the one already using `phone`.
    pub fn add_user(&self, phone: &str, first_name: &str, last_name: &str) -> UserRecord {
        let mut state = self.state();
        if let Some(user) = state.phones.get(phone).and_then(|id| state.users.get(id)) {
            return user.clone();
        }
        let id = state.next_user_id;
        state.next_user_id += 1;
        let user = UserRecord {
            id,
            access_hash: self.derive_hash(b"user", i64::from(id)),
            phone: phone.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            online_until: 0,
            was_online: 0,
        };
        state.phones.insert(phone.to_string(), id);
        state.users.insert(id, user.clone());
        info!("[teleproto] user {id} registered");
        user
    }

    pub fn user(&self, id: i32) -> Option<UserRecord> {
        self.state().users.get(&id).cloned()
    }

    pub fn user_by_phone(&self, phone: &str) -> Option<UserRecord> {
        let state = self.state();
        state.phones.get(phone).and_then(|id| state.users.get(id)).cloned()
    }

    /// Sets the user's online deadline (`until > now`) or marks them offline.
    pub fn set_status(&self, user_id: i32, online_until: Option<u64>, now: u64) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            match online_until {
                Some(until) => user.online_until = until,
                None => {
                    user.online_until = 0;
                    user.was_online = now;
                }
            }
        }
    }

    // ── Bindings ───────────────────────────────────────────────────────────

    pub fn bind(&self, key_id: u64, user_id: i32) {
        self.state().bindings.insert(key_id, user_id);
    }

    pub fn unbind(&self, key_id: u64) -> Option<i32> {
        self.state().bindings.remove(&key_id)
    }

    pub fn bound_user(&self, key_id: u64) -> Option<i32> {
        self.state().bindings.get(&key_id).copied()
    }

    // ── Login codes ────────────────────────────────────────────────────────

    /// Creates (or replaces) the login code for `phone`. Expired codes of
    /// other phones are dropped on the way.
    pub fn issue_code(&self, phone: &str, length: usize, ttl: u64, now: u64) -> LoginCode {
        let digits: [u8; 16] = random_array();
        let code: String = digits.iter().take(length.clamp(1, 16)).map(|d| char::from(b'0' + d % 10)).collect();
        let hash: [u8; 8] = random_array();
        let login = LoginCode { phone_code_hash: hex(&hash), code, expires: now + ttl };
        let mut state = self.state();
        state.codes.retain(|_, code| code.expires >= now);
        state.codes.insert(phone.to_string(), login.clone());
        debug!("[teleproto] login code issued for {phone}");
        login
    }

    /// The code waiting for `phone`. Stands in for the SMS gateway.
    pub fn pending_code(&self, phone: &str) -> Option<String> {
        self.state().codes.get(phone).map(|c| c.code.clone())
    }

    /// Checks a code; with `consume` a correct code is used up.
    pub fn check_code(&self, phone: &str, phone_code_hash: &str, code: &str, now: u64, consume: bool) -> Result<(), RpcError> {
        let mut state = self.state();
        let Some(login) = state.codes.get(phone) else {
            return Err(RpcError::bad_request("PHONE_CODE_EXPIRED"));
        };
        if login.phone_code_hash != phone_code_hash {
            return Err(RpcError::bad_request("PHONE_CODE_HASH_INVALID"));
        }
        if login.expires < now {
            state.codes.remove(phone);
            return Err(RpcError::bad_request("PHONE_CODE_EXPIRED"));
        }
        if code.is_empty() {
            return Err(RpcError::bad_request("PHONE_CODE_EMPTY"));
        }
        if login.code != code {
            return Err(RpcError::bad_request("PHONE_CODE_INVALID"));
        }
        if consume {
            state.codes.remove(phone);
        }
        Ok(())
    }

    // ── Files ──────────────────────────────────────────────────────────────

    /// Stores one uploaded part. `total` is set for big-file parts.
    ///
    /// Uploads idle for longer than [`UPLOAD_TTL`] are dropped, and a key
    /// starting more than [`MAX_UPLOADS_PER_KEY`] uploads loses its stalest.
    pub fn save_part(&self, key_id: u64, file_id: i64, part: i32, bytes: Vec<u8>, total: Option<i32>, now: u64) -> Result<(), RpcError> {
        if part < 0 || part >= MAX_FILE_PARTS || total.is_some_and(|t| part >= t) {
            return Err(RpcError::bad_request("FILE_PART_INVALID"));
        }
        if total.is_some_and(|t| t <= 0 || t > MAX_FILE_PARTS) {
            return Err(RpcError::bad_request("FILE_PARTS_INVALID"));
        }
        if bytes.is_empty() {
            return Err(RpcError::bad_request("FILE_PART_EMPTY"));
        }
        if bytes.len() > MAX_PART_SIZE {
            return Err(RpcError::bad_request("FILE_PART_TOO_BIG"));
        }
        let mut state = self.state();
        let before = state.uploads.len();
        state.uploads.retain(|_, upload| now.saturating_sub(upload.touched) <= UPLOAD_TTL);
        if state.uploads.len() < before {
            debug!("[teleproto] dropped {} stale uploads", before - state.uploads.len());
        }
        if !state.uploads.contains_key(&(key_id, file_id)) {
            let mut own: Vec<_> = state.uploads.iter().filter(|((key, _), _)| *key == key_id).map(|(id, u)| (u.touched, *id)).collect();
            if own.len() >= MAX_UPLOADS_PER_KEY {
                own.sort_unstable();
                for (_, id) in &own[..=own.len() - MAX_UPLOADS_PER_KEY] {
                    state.uploads.remove(id);
                }
            }
        }
        let upload = state
            .uploads
            .entry((key_id, file_id))
            .or_insert_with(|| PartialUpload { parts: BTreeMap::new(), total: None, touched: now });
        if total.is_some() {
            upload.total = total;
        }
        upload.touched = now;
        upload.parts.insert(part, bytes);
        Ok(())
    }

    /// Assembles an uploaded file and makes it downloadable.
    pub fn publish_upload(&self, key_id: u64, file: &enums::InputFile, now: u64) -> Result<PublishedFile, RpcError> {
        let (file_id, parts, md5) = match file {
            enums::InputFile::InputFile(f) => (f.id, f.parts, Some(f.md5_checksum.as_str())),
            enums::InputFile::Big(f) => (f.id, f.parts, None),
        };
        let mut state = self.state();
        let upload = state.uploads.get(&(key_id, file_id)).ok_or_else(|| RpcError::bad_request("FILE_PARTS_INVALID"))?;
        let complete = parts > 0
            && upload.parts.len() == parts as usize
            && upload.parts.keys().copied().eq(0..parts)
            && upload.total.is_none_or(|t| t == parts);
        if !complete {
            return Err(RpcError::bad_request("FILE_PARTS_INVALID"));
        }
        let bytes: Vec<u8> = upload.parts.values().flatten().copied().collect();
        if let Some(expected) = md5 {
            let digest: [u8; 16] = Md5::digest(&bytes).into();
            if !expected.is_empty() && !expected.eq_ignore_ascii_case(&hex(&digest)) {
                return Err(RpcError::bad_request("MD5_CHECKSUM_INVALID"));
            }
        }
        state.uploads.remove(&(key_id, file_id));

        let local_id = state.next_local_id;
        state.next_local_id += 1;
        let secret = self.derive_hash(b"file", (i64::from(local_id) << 32) ^ file_id);
        let size = bytes.len() as u64;
        state.files.insert((self.volume_id, local_id), StoredFile { secret, bytes, mtime: now });
        info!("[teleproto] file {local_id} published ({size} bytes)");

        Ok(PublishedFile {
            location: enums::InputFileLocation::InputFileLocation(types::InputFileLocation {
                volume_id: self.volume_id,
                local_id,
                secret,
            }),
            size,
        })
    }

    /// Uploads currently in progress for `key_id`.
    pub fn upload_count(&self, key_id: u64) -> usize {
        self.state().uploads.keys().filter(|(key, _)| *key == key_id).count()
    }

    /// `limit` bytes at `offset` of a published file, plus its size and mtime.
    pub fn file_chunk(&self, volume_id: i64, local_id: i32, secret: i64, offset: usize, limit: usize) -> Result<(Vec<u8>, usize, u64), RpcError> {
        let state = self.state();
        let file = state
            .files
            .get(&(volume_id, local_id))
            .filter(|f| f.secret == secret)
            .ok_or_else(|| RpcError::bad_request("LOCATION_INVALID"))?;
        let start = offset.min(file.bytes.len());
        let end = (start + limit).min(file.bytes.len());
        Ok((file.bytes[start..end].to_vec(), file.bytes.len(), file.mtime))
    }
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_are_unique_per_phone() {
        let registry = Registry::default();
        let a = registry.add_user("000001", "Ada", "");
        let b = registry.add_user("000001", "Other", "");
        assert_eq!(a, b);
        assert_ne!(registry.add_user("000002", "Bob", "").id, a.id);
        assert_eq!(registry.user_by_phone("000001").map(|u| u.id), Some(a.id));
    }

    #[test]
    fn login_codes() {
        let registry = Registry::default();
        let login = registry.issue_code("000001", 5, 300, 1000);
        assert_eq!(login.code.len(), 5);
        assert!(login.code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(registry.pending_code("000001"), Some(login.code.clone()));

        assert!(registry.check_code("000001", "nope", &login.code, 1000, true).unwrap_err().is("PHONE_CODE_HASH_INVALID"));
        let wrong = if login.code == "00000" { "11111" } else { "00000" };
        assert!(registry.check_code("000001", &login.phone_code_hash, wrong, 1000, true).unwrap_err().is("PHONE_CODE_INVALID"));
        registry.check_code("000001", &login.phone_code_hash, &login.code, 1000, false).unwrap();
        registry.check_code("000001", &login.phone_code_hash, &login.code, 1000, true).unwrap();
        assert!(registry.check_code("000001", &login.phone_code_hash, &login.code, 1000, true).unwrap_err().is("PHONE_CODE_EXPIRED"));

        let login = registry.issue_code("000002", 5, 300, 1000);
        assert!(registry.check_code("000002", &login.phone_code_hash, &login.code, 1301, true).unwrap_err().is("PHONE_CODE_EXPIRED"));
    }

    #[test]
    fn upload_publish_download() {
        let registry = Registry::default();
        registry.save_part(7, 99, 1, vec![3, 4], None, 10).unwrap();
        registry.save_part(7, 99, 0, vec![1, 2], None, 10).unwrap();
        let digest: [u8; 16] = Md5::digest([1u8, 2, 3, 4]).into();
        let file = enums::InputFile::InputFile(types::InputFile { id: 99, parts: 2, name: "a".into(), md5_checksum: hex(&digest) });
        let published = registry.publish_upload(7, &file, 50).unwrap();
        assert_eq!(published.size, 4);

        let enums::InputFileLocation::InputFileLocation(loc) = published.location else {
            panic!("expected a file location");
        };
        let (chunk, size, mtime) = registry.file_chunk(loc.volume_id, loc.local_id, loc.secret, 1, 2).unwrap();
        assert_eq!((chunk, size, mtime), (vec![2, 3], 4, 50));
        assert!(registry.file_chunk(loc.volume_id, loc.local_id, loc.secret ^ 1, 0, 2).is_err());
    }

    #[test]
    fn incomplete_or_corrupt_uploads() {
        let registry = Registry::default();
        registry.save_part(7, 1, 0, vec![1], None, 0).unwrap();
        let missing = enums::InputFile::Big(types::InputFileBig { id: 1, parts: 2, name: "a".into() });
        assert!(registry.publish_upload(7, &missing, 0).unwrap_err().is("FILE_PARTS_INVALID"));

        let bad_md5 = enums::InputFile::InputFile(types::InputFile { id: 1, parts: 1, name: "a".into(), md5_checksum: "00".into() });
        assert!(registry.publish_upload(7, &bad_md5, 0).unwrap_err().is("MD5_CHECKSUM_INVALID"));

        assert!(registry.save_part(7, 1, 3, vec![1], Some(2), 0).unwrap_err().is("FILE_PART_INVALID"));
        assert!(registry.save_part(7, 1, 0, vec![], None, 0).unwrap_err().is("FILE_PART_EMPTY"));
    }

    #[test]
    fn sessions_per_key() {
        let registry = Registry::default();
        registry.open_session(1, 10, 0);
        assert!(registry.destroy_session(1, 10));
        assert!(!registry.destroy_session(1, 10));
        assert!(!registry.destroy_session(2, 10));
    }

    #[test]
    fn sessions_are_bounded() {
        let registry = Registry::default();
        for session in 0..MAX_SESSIONS_PER_KEY as u64 + 10 {
            registry.open_session(1, session, session);
        }
        assert_eq!(registry.session_count(1), MAX_SESSIONS_PER_KEY);
        assert!(!registry.destroy_session(1, 0));
        assert!(registry.destroy_session(1, MAX_SESSIONS_PER_KEY as u64 + 9));

        registry.open_session(2, 1, 100 + SESSION_TTL + 1);
        assert_eq!(registry.session_count(1), 0);
        assert_eq!(registry.session_count(2), 1);
    }

    #[test]
    fn abandoned_uploads_are_bounded() {
        let registry = Registry::default();
        for file_id in 0..1000 {
            registry.save_part(7, file_id, 0, vec![1], None, 100).unwrap();
        }
        assert_eq!(registry.upload_count(7), MAX_UPLOADS_PER_KEY);

        let last = enums::InputFile::Big(types::InputFileBig { id: 999, parts: 1, name: "a".into() });
        assert!(registry.publish_upload(7, &last, 100).is_ok());
        let first = enums::InputFile::Big(types::InputFileBig { id: 0, parts: 1, name: "a".into() });
        assert!(registry.publish_upload(7, &first, 100).unwrap_err().is("FILE_PARTS_INVALID"));

        registry.save_part(8, 1, 0, vec![1], None, 100 + UPLOAD_TTL + 1).unwrap();
        assert_eq!(registry.upload_count(7), 0);
        assert_eq!(registry.upload_count(8), 1);
        assert!(registry.save_part(8, 1, MAX_FILE_PARTS, vec![1], None, 0).unwrap_err().is("FILE_PART_INVALID"));
    }

    #[test]
    fn expired_codes_are_dropped() {
        let registry = Registry::default();
        registry.issue_code("000001", 5, 300, 1000);
        registry.issue_code("000002", 5, 300, 1301);
        assert_eq!(registry.pending_code("000001"), None);
        assert!(registry.pending_code("000002").is_some());
    }
}
