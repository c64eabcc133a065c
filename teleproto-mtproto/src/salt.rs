//! Server salts: a lazily extended, rotating window.
//!
//! Salt `i` becomes valid `i * rotation` after the window's base time and
//! stays valid for `rotation + grace`. When the next salt comes into force
//! the current one moves to a single "old" slot, so packets still in flight
//! under it keep passing [`SaltWindow::check_salt`] until it expires.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;

/// Salt window tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct SaltConfig {
    /// How long each salt is current.
    pub rotation: Duration,
    /// Extra lifetime after a salt stops being current.
    pub grace: Duration,
    /// Most salts generated ahead of time.
    pub cap: usize,
}

impl Default for SaltConfig {
    fn default() -> Self {
        Self { rotation: Duration::from_secs(3600), grace: Duration::from_secs(300), cap: 64 }
    }
}

/// One salt and its validity window, in Unix seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerSalt {
    /// The salt value.
    pub salt: u64,
    /// First second the salt is accepted.
    pub valid_since: u64,
    /// Last second the salt is accepted.
    pub valid_until: u64,
}

/// Rotating salts for one session.
#[derive(Clone, Debug)]
pub struct SaltWindow {
    config: SaltConfig,
    base: u64,
    /// Index of `salts[0]` counted from `base`.
    first_index: u64,
    salts: VecDeque<ServerSalt>,
    old: Option<ServerSalt>,
}

impl SaltWindow {
    /// A window starting at `now` with a random first salt.
    pub fn new(config: SaltConfig, now: u64) -> Self {
        Self::with_initial(config, random_salt(), now)
    }

    /// A window whose first salt is `first_salt`, e.g. the one both peers
    /// derived at the end of the key exchange.
    pub fn with_initial(config: SaltConfig, first_salt: u64, now: u64) -> Self {
        let mut window = Self { config, base: now, first_index: 0, salts: VecDeque::new(), old: None };
        let first = window.make(0, first_salt);
        window.salts.push_back(first);
        window
    }

    fn rotation(&self) -> u64 {
        self.config.rotation.as_secs().max(1)
    }

    fn make(&self, index: u64, salt: u64) -> ServerSalt {
        let valid_since = self.base + index * self.rotation();
        ServerSalt { salt, valid_since, valid_until: valid_since + self.rotation() + self.config.grace.as_secs() }
    }

    fn extend(&mut self) {
        let index = self.first_index + self.salts.len() as u64;
        let next = self.make(index, random_salt());
        self.salts.push_back(next);
    }

    fn advance(&mut self, now: u64) {
        loop {
            if self.salts.len() < 2 {
                self.extend();
            }
            if self.salts[1].valid_since > now {
                break;
            }
            self.old = self.salts.pop_front();
            self.first_index += 1;
            debug!("[teleproto] salt rotated (index {})", self.first_index);
        }
    }

    /// The salt to put on outgoing packets at `now`.
    pub fn server_salt(&mut self, now: u64) -> u64 {
        self.advance(now);
        self.salts.front().map_or(0, |s| s.salt)
    }

    /// Whether `salt` is the current salt, or the previous one before its
    /// `valid_until`.
    pub fn check_salt(&mut self, salt: u64, now: u64) -> bool {
        let current = self.server_salt(now);
        if salt == current {
            return true;
        }
        matches!(self.old, Some(old) if old.salt == salt && now <= old.valid_until)
    }

    /// The current salt and up to `count - 1` future ones, generating them
    /// on demand. Never more than the configured cap.
    pub fn salts(&mut self, count: usize, now: u64) -> Vec<ServerSalt> {
        self.advance(now);
        let count = count.clamp(1, self.config.cap.max(1));
        while self.salts.len() < count {
            self.extend();
        }
        self.salts.iter().take(count).copied().collect()
    }

    /// The configuration in use.
    pub fn config(&self) -> &SaltConfig {
        &self.config
    }
}

fn random_salt() -> u64 {
    u64::from_le_bytes(crate::random_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    fn window() -> SaltWindow {
        SaltWindow::with_initial(SaltConfig::default(), 0xabcd, T0)
    }

    #[test]
    fn first_salt_is_current_for_one_rotation() {
        let mut w = window();
        assert_eq!(w.server_salt(T0), 0xabcd);
        assert_eq!(w.server_salt(T0 + 3599), 0xabcd);
        assert_ne!(w.server_salt(T0 + 3600), 0xabcd);
    }

    #[test]
    fn old_salt_accepted_until_it_expires() {
        let mut w = window();
        let next = w.server_salt(T0 + 3600);
        assert!(w.check_salt(next, T0 + 3600));
        assert!(w.check_salt(0xabcd, T0 + 3600));
        assert!(w.check_salt(0xabcd, T0 + 3600 + 300));
        assert!(!w.check_salt(0xabcd, T0 + 3600 + 301));
        assert!(!w.check_salt(0x1234, T0));
    }

    #[test]
    fn current_salt_is_inside_its_window() {
        let mut w = window();
        for hour in 0..10 {
            let now = T0 + hour * 3600 + 17;
            let salt = w.server_salt(now);
            let listed = w.salts(1, now)[0];
            assert_eq!(listed.salt, salt);
            assert!(listed.valid_since <= now && now <= listed.valid_until);
        }
    }

    #[test]
    fn future_salts_are_lazy_and_capped() {
        let mut w = window();
        let salts = w.salts(5, T0);
        assert_eq!(salts.len(), 5);
        assert_eq!(salts[0].salt, 0xabcd);
        for pair in salts.windows(2) {
            assert_eq!(pair[1].valid_since, pair[0].valid_since + 3600);
            assert_eq!(pair[0].valid_until, pair[0].valid_since + 3900);
        }
        assert_eq!(w.salts(5, T0), salts);
        assert_eq!(w.salts(1000, T0).len(), 64);
        assert_eq!(w.salts(0, T0).len(), 1);
    }

    #[test]
    fn long_idle_skips_ahead() {
        let mut w = window();
        let now = T0 + 48 * 3600 + 5;
        w.server_salt(now);
        let current = w.salts(1, now)[0];
        assert_eq!(current.valid_since, T0 + 48 * 3600);
        assert!(!w.check_salt(0xabcd, now));
    }
}
