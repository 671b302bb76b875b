use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock};

use rand_core::RngCore;
use zeroize::Zeroizing;

use crate::crypto::secure_eq;
use crate::packet::Zid;
use crate::proto::*;

#[cfg(feature = "file-cache")]
pub use crate::cache_file::FileSecretStore;

/// The auxiliary secrets a host may share with a peer through other means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// Secret derived from a signaling layer such as SIP.
    Sigs,
    /// Secret derived from an SRTP key exchange such as SDES.
    Srtps,
    /// Any other pre-shared secret.
    Other,
}

/// A retained secret together with the Unix time in seconds at which it stops being valid.
///
/// Implements constant time equality.
#[derive(Clone, Eq)]
pub struct CachedSecret {
    pub value: Zeroizing<[u8; RETAINED_SECRET_SIZE]>,
    /// `u64::MAX` means the secret never expires.
    pub expires_at: u64,
}
impl PartialEq for CachedSecret {
    fn eq(&self, other: &Self) -> bool {
        secure_eq(&self.value[..], &other.value[..]) & (self.expires_at == other.expires_at)
    }
}
impl std::fmt::Debug for CachedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSecret").field("expires_at", &self.expires_at).finish_non_exhaustive()
    }
}
impl CachedSecret {
    pub fn new(value: [u8; RETAINED_SECRET_SIZE], expires_at: u64) -> Self {
        Self { value: Zeroizing::new(value), expires_at }
    }

    /// Create a secret from a cache expiration interval in seconds, as carried in Confirm.
    pub fn with_interval(value: Zeroizing<[u8; RETAINED_SECRET_SIZE]>, now: u64, interval: u32) -> Self {
        let expires_at = if interval == CACHE_EXPIRATION_NEVER {
            u64::MAX
        } else {
            now.saturating_add(interval as u64)
        };
        Self { value, expires_at }
    }

    pub fn is_valid(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Everything we remember about one peer, keyed by its ZID.
#[derive(Clone, Default)]
pub struct RetainedSecret {
    /// The retained secret produced by our most recent successful session with this peer.
    pub rs1: Option<CachedSecret>,
    /// The retained secret of the session before that.
    pub rs2: Option<CachedSecret>,
    pub sigs: Option<Zeroizing<Vec<u8>>>,
    pub srtps: Option<Zeroizing<Vec<u8>>>,
    pub other: Option<Zeroizing<Vec<u8>>>,
    /// Whether the user verified the SAS of this peer since the key continuity chain began.
    pub verified: bool,
}

impl PartialEq for RetainedSecret {
    fn eq(&self, other: &Self) -> bool {
        fn opt_eq(a: &Option<Zeroizing<Vec<u8>>>, b: &Option<Zeroizing<Vec<u8>>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => secure_eq(&a[..], &b[..]),
                (None, None) => true,
                _ => false,
            }
        }
        (self.rs1 == other.rs1)
            & (self.rs2 == other.rs2)
            & opt_eq(&self.sigs, &other.sigs)
            & opt_eq(&self.srtps, &other.srtps)
            & opt_eq(&self.other, &other.other)
            & (self.verified == other.verified)
    }
}
impl Eq for RetainedSecret {}

impl std::fmt::Debug for RetainedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedSecret")
            .field("rs1", &self.rs1)
            .field("rs2", &self.rs2)
            .field("sigs", &self.sigs.is_some())
            .field("srtps", &self.srtps.is_some())
            .field("other", &self.other.is_some())
            .field("verified", &self.verified)
            .finish()
    }
}

impl RetainedSecret {
    /// Drop rs1 and rs2 if they expired, so that an expired entry reads as a cache miss.
    pub fn expire(&mut self, now: u64) {
        if self.rs1.as_ref().map_or(false, |s| !s.is_valid(now)) {
            self.rs1 = None;
        }
        if self.rs2.as_ref().map_or(false, |s| !s.is_valid(now)) {
            self.rs2 = None;
        }
    }

    /// Install the retained secret of a new session. The current rs1 becomes rs2.
    pub fn rotate(&mut self, new_rs1: CachedSecret) {
        self.rs2 = self.rs1.replace(new_rs1);
    }

    pub fn secret(&self, kind: SecretKind) -> Option<&[u8]> {
        match kind {
            SecretKind::Sigs => self.sigs.as_deref().map(|s| &s[..]),
            SecretKind::Srtps => self.srtps.as_deref().map(|s| &s[..]),
            SecretKind::Other => self.other.as_deref().map(|s| &s[..]),
        }
    }

    pub fn set_secret(&mut self, kind: SecretKind, value: &[u8]) {
        let value = Some(Zeroizing::new(value.to_vec()));
        match kind {
            SecretKind::Sigs => self.sigs = value,
            SecretKind::Srtps => self.srtps = value,
            SecretKind::Other => self.other = value,
        }
    }

    /// The auxiliary secret of the key agreement: the concatenation of the sigs, srtps and
    /// other secrets that are present, or `None` if none are.
    pub fn aux_secret(&self) -> Option<Zeroizing<Vec<u8>>> {
        let mut aux = Zeroizing::new(Vec::new());
        for kind in [SecretKind::Sigs, SecretKind::Srtps, SecretKind::Other] {
            if let Some(s) = self.secret(kind) {
                aux.extend_from_slice(s);
            }
        }
        (!aux.is_empty()).then_some(aux)
    }
}

/// Storage of retained secrets, shared by every session of a `Context`.
///
/// Implementations must allow concurrent calls from sessions running on different threads.
/// If persistent storage is supported, `store` should not return until the secret is saved,
/// otherwise a sudden restart can leave us out of sync with the peer, which shows up as a
/// cache mismatch warning in the next session.
pub trait RetainedSecretStore: Send + Sync {
    /// The ZID of this endpoint. It must stay the same for as long as the cache lives.
    fn local_zid(&self) -> Zid;
    /// Find what we remember about `peer`. Returns `Ok(None)` on a cache miss.
    fn lookup(&self, peer: &Zid) -> io::Result<Option<RetainedSecret>>;
    /// Replace what we remember about `peer`.
    fn store(&self, peer: &Zid, secret: &RetainedSecret) -> io::Result<()>;
    /// Set the verified flag of `peer`. Does nothing if we know nothing about it.
    fn mark_verified(&self, peer: &Zid) -> io::Result<()>;
    /// Clear the verified flag of `peer`. Does nothing if we know nothing about it.
    fn reset_verified(&self, peer: &Zid) -> io::Result<()>;
}

pub(crate) fn poisoned<T>(_: T) -> io::Error {
    io::Error::new(io::ErrorKind::Other, "retained secret cache lock poisoned")
}

pub(crate) fn random_zid(rng: &mut impl RngCore) -> Zid {
    let mut zid = [0u8; ZID_SIZE];
    rng.fill_bytes(&mut zid);
    zid
}

/// A volatile cache. Key continuity only lasts as long as the process.
pub struct MemorySecretStore {
    zid: Zid,
    entries: RwLock<HashMap<Zid, RetainedSecret>>,
}

impl MemorySecretStore {
    pub fn new(zid: Zid) -> Self {
        Self { zid, entries: RwLock::new(HashMap::new()) }
    }

    pub fn with_random_zid(rng: &mut impl RngCore) -> Self {
        Self::new(random_zid(rng))
    }

    fn update(&self, peer: &Zid, f: impl FnOnce(&mut RetainedSecret)) -> io::Result<()> {
        if let Some(entry) = self.entries.write().map_err(poisoned)?.get_mut(peer) {
            f(entry);
        }
        Ok(())
    }
}

impl RetainedSecretStore for MemorySecretStore {
    fn local_zid(&self) -> Zid {
        self.zid
    }

    fn lookup(&self, peer: &Zid) -> io::Result<Option<RetainedSecret>> {
        Ok(self.entries.read().map_err(poisoned)?.get(peer).cloned())
    }

    fn store(&self, peer: &Zid, secret: &RetainedSecret) -> io::Result<()> {
        self.entries.write().map_err(poisoned)?.insert(*peer, secret.clone());
        Ok(())
    }

    fn mark_verified(&self, peer: &Zid) -> io::Result<()> {
        self.update(peer, |e| e.verified = true)
    }

    fn reset_verified(&self, peer: &Zid) -> io::Result<()> {
        self.update(peer, |e| e.verified = false)
    }
}

/// The "no cache" policy: every session is a first session and nothing is ever written.
pub struct EmptySecretStore {
    zid: Zid,
}

impl EmptySecretStore {
    pub fn new(zid: Zid) -> Self {
        Self { zid }
    }
}

impl RetainedSecretStore for EmptySecretStore {
    fn local_zid(&self) -> Zid {
        self.zid
    }

    fn lookup(&self, _: &Zid) -> io::Result<Option<RetainedSecret>> {
        Ok(None)
    }

    fn store(&self, _: &Zid, _: &RetainedSecret) -> io::Result<()> {
        Ok(())
    }

    fn mark_verified(&self, _: &Zid) -> io::Result<()> {
        Ok(())
    }

    fn reset_verified(&self, _: &Zid) -> io::Result<()> {
        Ok(())
    }
}

/// The kinds of cache `open_cache` can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// No persistence and a fresh random ZID, see `EmptySecretStore`.
    NoCache,
    /// A JSON file, see `FileSecretStore`. Requires the `file-cache` feature.
    FileCache,
}

/// Open a retained secret cache. `path` is only used by `CacheType::FileCache`.
pub fn open_cache(cache_type: CacheType, path: &Path, rng: &mut impl RngCore) -> io::Result<Arc<dyn RetainedSecretStore>> {
    match cache_type {
        CacheType::NoCache => Ok(Arc::new(EmptySecretStore::new(random_zid(rng)))),
        #[cfg(feature = "file-cache")]
        CacheType::FileCache => Ok(Arc::new(FileSecretStore::open(path, rng)?)),
        #[cfg(not(feature = "file-cache"))]
        CacheType::FileCache => {
            let _ = path;
            Err(io::Error::new(io::ErrorKind::Unsupported, "built without the file-cache feature"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8, expires_at: u64) -> CachedSecret {
        CachedSecret::new([byte; RETAINED_SECRET_SIZE], expires_at)
    }

    #[test]
    fn rotation_and_expiry() {
        let mut entry = RetainedSecret::default();
        entry.rotate(secret(1, 100));
        entry.rotate(secret(2, 200));
        assert_eq!(entry.rs1, Some(secret(2, 200)));
        assert_eq!(entry.rs2, Some(secret(1, 100)));

        entry.expire(150);
        assert_eq!(entry.rs1, Some(secret(2, 200)));
        assert_eq!(entry.rs2, None);
        entry.expire(200);
        assert_eq!(entry.rs1, None);
    }

    #[test]
    fn cache_expiration_interval() {
        let never = CachedSecret::with_interval(Zeroizing::new([0; 32]), 1000, CACHE_EXPIRATION_NEVER);
        assert!(never.is_valid(u64::MAX - 1));
        let hour = CachedSecret::with_interval(Zeroizing::new([0; 32]), 1000, 3600);
        assert!(hour.is_valid(4599));
        assert!(!hour.is_valid(4600));
    }

    #[test]
    fn aux_secret_concatenates_present_secrets() {
        let mut entry = RetainedSecret::default();
        assert!(entry.aux_secret().is_none());
        entry.set_secret(SecretKind::Other, b"other");
        entry.set_secret(SecretKind::Sigs, b"sigs");
        assert_eq!(&entry.aux_secret().unwrap()[..], b"sigsother");
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySecretStore::new([1; ZID_SIZE]);
        let peer = [2; ZID_SIZE];
        assert_eq!(store.lookup(&peer).unwrap(), None);
        // Verifying an unknown peer is a no-op.
        store.mark_verified(&peer).unwrap();
        assert_eq!(store.lookup(&peer).unwrap(), None);

        let mut entry = RetainedSecret::default();
        entry.rotate(secret(7, u64::MAX));
        store.store(&peer, &entry).unwrap();
        store.mark_verified(&peer).unwrap();
        let found = store.lookup(&peer).unwrap().unwrap();
        assert!(found.verified);
        assert_eq!(found.rs1, entry.rs1);
        store.reset_verified(&peer).unwrap();
        assert!(!store.lookup(&peer).unwrap().unwrap().verified);
    }

    #[cfg(feature = "default-crypto")]
    #[test]
    fn no_cache_forgets_everything() {
        let store = open_cache(CacheType::NoCache, Path::new("unused"), &mut rand_core::OsRng).unwrap();
        let peer = [2; ZID_SIZE];
        let mut entry = RetainedSecret::default();
        entry.rotate(secret(7, u64::MAX));
        store.store(&peer, &entry).unwrap();
        assert_eq!(store.lookup(&peer).unwrap(), None);
    }
}
