use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::packet::Zid;
use crate::proto::*;
use crate::retained::{poisoned, random_zid, CachedSecret, RetainedSecret, RetainedSecretStore};

/// On-disk layout. Binary fields are lowercase hex.
#[derive(Serialize, Deserialize, Default)]
struct CacheFile {
    zid: String,
    peers: Vec<PeerRecord>,
}

#[derive(Serialize, Deserialize)]
struct PeerRecord {
    zid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rs1: Option<SecretRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rs2: Option<SecretRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sigs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    srtps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    other: Option<String>,
    #[serde(default)]
    verified: bool,
}

#[derive(Serialize, Deserialize)]
struct SecretRecord {
    value: String,
    expires_at: u64,
}

fn invalid(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("corrupt retained secret cache: bad {}", what))
}

fn decode_array<const N: usize>(s: &str, what: &str) -> io::Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).map_err(|_| invalid(what))?;
    Ok(out)
}

fn decode_vec(s: &Option<String>, what: &str) -> io::Result<Option<Zeroizing<Vec<u8>>>> {
    s.as_ref().map(|s| hex::decode(s).map(Zeroizing::new).map_err(|_| invalid(what))).transpose()
}

impl SecretRecord {
    fn from_secret(s: &CachedSecret) -> Self {
        Self { value: hex::encode(&s.value[..]), expires_at: s.expires_at }
    }

    fn to_secret(&self) -> io::Result<CachedSecret> {
        Ok(CachedSecret {
            value: Zeroizing::new(decode_array::<RETAINED_SECRET_SIZE>(&self.value, "retained secret")?),
            expires_at: self.expires_at,
        })
    }
}

impl PeerRecord {
    fn from_entry(zid: &Zid, e: &RetainedSecret) -> Self {
        let encode = |s: &Option<Zeroizing<Vec<u8>>>| s.as_ref().map(|s| hex::encode(&s[..]));
        Self {
            zid: hex::encode(zid),
            rs1: e.rs1.as_ref().map(SecretRecord::from_secret),
            rs2: e.rs2.as_ref().map(SecretRecord::from_secret),
            sigs: encode(&e.sigs),
            srtps: encode(&e.srtps),
            other: encode(&e.other),
            verified: e.verified,
        }
    }

    fn to_entry(&self) -> io::Result<(Zid, RetainedSecret)> {
        Ok((
            decode_array(&self.zid, "peer ZID")?,
            RetainedSecret {
                rs1: self.rs1.as_ref().map(SecretRecord::to_secret).transpose()?,
                rs2: self.rs2.as_ref().map(SecretRecord::to_secret).transpose()?,
                sigs: decode_vec(&self.sigs, "sigs secret")?,
                srtps: decode_vec(&self.srtps, "srtps secret")?,
                other: decode_vec(&self.other, "other secret")?,
                verified: self.verified,
            },
        ))
    }
}

/// A retained secret cache persisted as a JSON file.
///
/// The whole cache is held in memory and the file is rewritten on every change. Writes go to a
/// temporary file which then replaces the cache file, so a crash never leaves a torn cache behind.
/// The local ZID is stored in the file as well and survives restarts.
pub struct FileSecretStore {
    path: PathBuf,
    zid: Zid,
    entries: RwLock<HashMap<Zid, RetainedSecret>>,
}

impl FileSecretStore {
    /// Load the cache at `path`, or create it with a fresh random ZID if it does not exist.
    pub fn open(path: impl AsRef<Path>, rng: &mut impl RngCore) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::read(&path) {
            Ok(data) => {
                let data = Zeroizing::new(data);
                let file: CacheFile = serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let zid = decode_array(&file.zid, "local ZID")?;
                let entries = file.peers.iter().map(PeerRecord::to_entry).collect::<io::Result<HashMap<_, _>>>()?;
                Ok(Self { path, zid, entries: RwLock::new(entries) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let store = Self { path, zid: random_zid(rng), entries: RwLock::new(HashMap::new()) };
                store.save(&HashMap::new())?;
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, entries: &HashMap<Zid, RetainedSecret>) -> io::Result<()> {
        let file = CacheFile {
            zid: hex::encode(self.zid),
            peers: entries.iter().map(|(zid, e)| PeerRecord::from_entry(zid, e)).collect(),
        };
        let json = Zeroizing::new(serde_json::to_vec_pretty(&file).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?);
        let tmp = self.path.with_extension("tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
    }

    /// Apply `f` to a copy of the cache and write the copy out. Memory only changes once the
    /// file has been replaced.
    fn modify(&self, f: impl FnOnce(&mut HashMap<Zid, RetainedSecret>) -> bool) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let mut next = entries.clone();
        if f(&mut next) {
            self.save(&next)?;
            *entries = next;
        }
        Ok(())
    }

    fn update(&self, peer: &Zid, f: impl FnOnce(&mut RetainedSecret)) -> io::Result<()> {
        self.modify(|entries| entries.get_mut(peer).map(f).is_some())
    }
}

impl RetainedSecretStore for FileSecretStore {
    fn local_zid(&self) -> Zid {
        self.zid
    }

    fn lookup(&self, peer: &Zid) -> io::Result<Option<RetainedSecret>> {
        Ok(self.entries.read().map_err(poisoned)?.get(peer).cloned())
    }

    fn store(&self, peer: &Zid, secret: &RetainedSecret) -> io::Result<()> {
        self.modify(|entries| {
            entries.insert(*peer, secret.clone());
            true
        })
    }

    fn mark_verified(&self, peer: &Zid) -> io::Result<()> {
        self.update(peer, |e| e.verified = true)
    }

    fn reset_verified(&self, peer: &Zid) -> io::Result<()> {
        self.update(peer, |e| e.verified = false)
    }
}

#[cfg(all(test, feature = "default-crypto"))]
mod tests {
    use super::*;
    use crate::retained::SecretKind;
    use rand_core::OsRng;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zrtp-cache.json");
        let peer = [5; ZID_SIZE];

        let store = FileSecretStore::open(&path, &mut OsRng).unwrap();
        let zid = store.local_zid();
        let mut entry = RetainedSecret::default();
        entry.rotate(CachedSecret::new([9; RETAINED_SECRET_SIZE], u64::MAX));
        entry.rotate(CachedSecret::new([8; RETAINED_SECRET_SIZE], 12345));
        entry.set_secret(SecretKind::Srtps, b"sdes");
        store.store(&peer, &entry).unwrap();
        store.mark_verified(&peer).unwrap();
        drop(store);

        let reopened = FileSecretStore::open(&path, &mut OsRng).unwrap();
        assert_eq!(reopened.local_zid(), zid);
        let found = reopened.lookup(&peer).unwrap().unwrap();
        entry.verified = true;
        assert_eq!(found, entry);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn failed_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir(&cache_dir).unwrap();
        let store = FileSecretStore::open(cache_dir.join("zrtp-cache.json"), &mut OsRng).unwrap();
        let peer = [5; ZID_SIZE];
        let mut entry = RetainedSecret::default();
        entry.rotate(CachedSecret::new([9; RETAINED_SECRET_SIZE], u64::MAX));
        store.store(&peer, &entry).unwrap();

        fs::remove_dir_all(&cache_dir).unwrap();
        let mut newer = entry.clone();
        newer.rotate(CachedSecret::new([8; RETAINED_SECRET_SIZE], u64::MAX));
        assert!(store.store(&peer, &newer).is_err());
        assert!(store.mark_verified(&peer).is_err());
        assert!(store.store(&[6; ZID_SIZE], &newer).is_err());

        assert_eq!(store.lookup(&peer).unwrap(), Some(entry));
        assert_eq!(store.lookup(&[6; ZID_SIZE]).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zrtp-cache.json");
        fs::write(&path, br#"{"zid": "zz", "peers": []}"#).unwrap();
        let err = FileSecretStore::open(&path, &mut OsRng).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
