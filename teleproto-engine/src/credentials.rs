//! Exported session credentials and pluggable storage for them.
//!
//! A client that saved its credentials reconnects with the same auth key,
//! skipping the key exchange. The server finds the key through its
//! [`crate::server::AuthKeyStore`] and keeps the key's user binding.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use teleproto_crypto::AuthKey;

const MAGIC: &[u8; 4] = b"TPS1";
const ENCODED_LEN: usize = 4 + 4 + 256 + 8 + 8 + 1 + 4;

/// Everything needed to resume a session without a new key exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionCredentials {
    pub dc_id: i32,
    pub auth_key: AuthKey,
    /// Last server salt seen.
    pub salt: u64,
    /// Server time minus local time, in seconds.
    pub time_offset: i64,
    /// Set once the key is signed in.
    pub user_id: Option<i32>,
}

impl SessionCredentials {
    /// Fixed-size binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(ENCODED_LEN);
        b.extend_from_slice(MAGIC);
        b.extend_from_slice(&self.dc_id.to_le_bytes());
        b.extend_from_slice(&self.auth_key.to_bytes());
        b.extend_from_slice(&self.salt.to_le_bytes());
        b.extend_from_slice(&self.time_offset.to_le_bytes());
        match self.user_id {
            Some(id) => {
                b.push(1);
                b.extend_from_slice(&id.to_le_bytes());
            }
            None => {
                b.push(0);
                b.extend_from_slice(&[0; 4]);
            }
        }
        b
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        if buf.len() != ENCODED_LEN {
            return Err(invalid(format!("credentials are {} bytes, expected {ENCODED_LEN}", buf.len())));
        }
        if &buf[..4] != MAGIC {
            return Err(invalid("not a teleproto credentials blob".to_string()));
        }
        let mut p = 4usize;
        macro_rules! take {
            ($n:expr) => {{
                let s = &buf[p..p + $n];
                p += $n;
                s
            }};
        }
        let dc_id = i32::from_le_bytes(array(take!(4)));
        let auth_key = AuthKey::from_bytes(array(take!(256)));
        let salt = u64::from_le_bytes(array(take!(8)));
        let time_offset = i64::from_le_bytes(array(take!(8)));
        let has_user = take!(1)[0];
        let user = i32::from_le_bytes(array(take!(4)));
        let user_id = match has_user {
            0 => None,
            1 => Some(user),
            other => return Err(invalid(format!("bad user flag {other}"))),
        };
        Ok(Self { dc_id, auth_key, salt, time_offset, user_id })
    }

    /// Base64 of [`SessionCredentials::to_bytes`], for pasting into config.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(text: &str) -> io::Result<Self> {
        let bytes = BASE64_STANDARD.decode(text.trim()).map_err(|e| invalid(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

fn array<const N: usize>(s: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(s);
    out
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Where and how credentials are persisted.
pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &SessionCredentials) -> io::Result<()>;

    /// Previously saved credentials, or `None` if nothing was saved.
    fn load(&self) -> io::Result<Option<SessionCredentials>>;

    /// Remove the stored credentials (e.g. on log-out).
    fn delete(&self) -> io::Result<()>;

    /// Human-readable name of this store (for log messages).
    fn name(&self) -> &str;
}

// ─── FileStore ────────────────────────────────────────────────────────────────

/// Stores credentials in a small binary file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileStore {
    fn save(&self, credentials: &SessionCredentials) -> io::Result<()> {
        std::fs::write(&self.path, credentials.to_bytes())
    }

    fn load(&self) -> io::Result<Option<SessionCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        SessionCredentials::from_bytes(&std::fs::read(&self.path)?).map(Some)
    }

    fn delete(&self) -> io::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

/// Keeps credentials in memory only.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<SessionCredentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn save(&self, credentials: &SessionCredentials) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<SessionCredentials>> {
        Ok(self.data.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: Option<i32>) -> SessionCredentials {
        SessionCredentials {
            dc_id: 2,
            auth_key: AuthKey::from_bytes(std::array::from_fn(|i| i as u8)),
            salt: 0x1122_3344_5566_7788,
            time_offset: -3,
            user_id,
        }
    }

    #[test]
    fn base64_round_trip() {
        for creds in [sample(None), sample(Some(1000))] {
            let text = creds.to_base64();
            assert_eq!(SessionCredentials::from_base64(&text).unwrap(), creds);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(SessionCredentials::from_bytes(&[0; 10]).is_err());
        let mut bytes = sample(None).to_bytes();
        bytes[0] = b'X';
        assert!(SessionCredentials::from_bytes(&bytes).is_err());
        let mut bytes = sample(None).to_bytes();
        bytes[ENCODED_LEN - 5] = 7;
        assert!(SessionCredentials::from_bytes(&bytes).is_err());
        assert!(SessionCredentials::from_base64("%%%").is_err());
    }

    #[test]
    fn memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample(Some(5))).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample(Some(5))));
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store() {
        let path = std::env::temp_dir().join(format!("teleproto-creds-{}.bin", std::process::id()));
        let store = FileStore::new(&path);
        store.save(&sample(None)).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample(None)));
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
