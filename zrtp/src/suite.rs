use arrayvec::ArrayVec;
use zeroize::Zeroizing;

use crate::application::{CryptoLayer, Role, SessionKeys};
use crate::config::*;
use crate::crypto::*;
use crate::packet::{Commit, Hello};
use crate::proto::*;
use crate::result::ZrtpError;

/// Output of the negotiated hash or HMAC. Its length is the negotiated hash size.
pub(crate) type Digest = ArrayVec<u8, MAX_HASH_SIZE>;

/// Glue letting negotiation treat the five algorithm categories uniformly.
trait Negotiable: Copy + PartialEq + 'static {
    const TYPE: AlgorithmType;
    /// Algorithms every RFC 6189 endpoint implements, whether it lists them or not.
    const MANDATORY: &'static [Self];
    fn id(&self) -> AlgorithmId;
    fn from_id(id: AlgorithmId) -> Option<Self>;
}

macro_rules! negotiable {
    ($t:ty, $kind:ident, [$($m:expr),*]) => {
        impl Negotiable for $t {
            const TYPE: AlgorithmType = AlgorithmType::$kind;
            const MANDATORY: &'static [Self] = &[$($m),*];
            fn id(&self) -> AlgorithmId {
                <$t>::id(self)
            }
            fn from_id(id: AlgorithmId) -> Option<Self> {
                <$t>::from_id(id)
            }
        }
    };
}
negotiable!(HashAlgorithm, Hash, [HashAlgorithm::S256]);
negotiable!(CipherAlgorithm, Cipher, [CipherAlgorithm::Aes1]);
negotiable!(AuthTag, AuthTag, [AuthTag::Hs32, AuthTag::Hs80]);
negotiable!(KeyAgreement, KeyAgreement, []);
negotiable!(SasType, Sas, [SasType::B32]);

/// Our most preferred algorithm that the peer offered or must implement anyway.
fn choose<A: Negotiable>(ours: &[A], offered: &[AlgorithmId]) -> Result<A, ZrtpError> {
    ours.iter()
        .chain(A::MANDATORY.iter())
        .copied()
        .find(|a| A::MANDATORY.contains(a) || offered.contains(&a.id()))
        .ok_or(ZrtpError::UnsupportedVersion { missing: Some(A::TYPE) })
}

/// Accept an algorithm chosen by the peer only if we offered it or must implement it.
fn accept<A: Negotiable>(ours: &[A], chosen: AlgorithmId) -> Result<A, ZrtpError> {
    A::from_id(chosen)
        .filter(|a| ours.contains(a) || A::MANDATORY.contains(a))
        .ok_or(ZrtpError::UnsupportedVersion { missing: Some(A::TYPE) })
}

/// The algorithms both endpoints agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Suite {
    pub hash: HashAlgorithm,
    pub cipher: CipherAlgorithm,
    pub auth_tag: AuthTag,
    pub key_agreement: KeyAgreement,
    pub sas: SasType,
}

impl Suite {
    /// Pick the suite we would put in a Commit to the sender of `hello`.
    ///
    /// This only looks at identifiers, so a failure here never involves key material.
    pub fn negotiate(config: &Config, hello: &Hello) -> Result<Suite, ZrtpError> {
        if !hello.version.starts_with(ZRTP_VERSION_PREFIX) {
            return Err(ZrtpError::UnsupportedVersion { missing: None });
        }
        Ok(Suite {
            hash: choose(&config.hashes, &hello.hashes)?,
            cipher: choose(&config.ciphers, &hello.ciphers)?,
            auth_tag: choose(&config.auth_tags, &hello.auth_tags)?,
            key_agreement: choose(&config.key_agreements, &hello.key_agreements)?,
            sas: choose(&config.sas_types, &hello.sas_types)?,
        })
    }

    /// Validate the suite chosen by the initiator in `commit` against what we offered.
    pub fn from_commit(config: &Config, commit: &Commit) -> Result<Suite, ZrtpError> {
        Ok(Suite {
            hash: accept(&config.hashes, commit.hash)?,
            cipher: accept(&config.ciphers, commit.cipher)?,
            auth_tag: accept(&config.auth_tags, commit.auth_tag)?,
            key_agreement: accept(&config.key_agreements, commit.key_agreement)?,
            sas: accept(&config.sas_types, commit.sas)?,
        })
    }

    pub fn hash<C: CryptoLayer>(&self, segments: &[&[u8]]) -> Digest {
        let segments = segments.iter().copied();
        match self.hash {
            HashAlgorithm::S256 => C::Sha256::hash(segments).into_iter().collect(),
            HashAlgorithm::S384 => C::Sha384::hash(segments).into_iter().collect(),
            HashAlgorithm::Skn2 => C::Skein256::hash(segments).into_iter().collect(),
            HashAlgorithm::Skn3 => C::Skein384::hash(segments).into_iter().collect(),
        }
    }

    /// The MAC that goes with the negotiated hash: HMAC for SHA-2, the Skein MAC for Skein.
    pub fn hmac<C: CryptoLayer>(&self, key: &[u8], segments: &[&[u8]]) -> Zeroizing<Digest> {
        fn mac<const N: usize, M: ZrtpHmac<N>>(key: &[u8], segments: &[&[u8]]) -> Zeroizing<Digest> {
            let mut out = Zeroizing::new([0u8; N]);
            M::new().hash(key, segments, &mut out);
            Zeroizing::new(out.iter().copied().collect())
        }
        match self.hash {
            HashAlgorithm::S256 => mac::<SHA256_HASH_SIZE, C::HmacSha256>(key, segments),
            HashAlgorithm::S384 => mac::<SHA384_HASH_SIZE, C::HmacSha384>(key, segments),
            HashAlgorithm::Skn2 => mac::<SKEIN256_HASH_SIZE, C::SkeinMac256>(key, segments),
            HashAlgorithm::Skn3 => mac::<SKEIN384_HASH_SIZE, C::SkeinMac384>(key, segments),
        }
    }

    /// The negotiated HMAC truncated to the 64 bits carried in messages and secret IDs.
    pub fn mac64<C: CryptoLayer>(&self, key: &[u8], segments: &[&[u8]]) -> [u8; MAC_SIZE] {
        let mut out = [0u8; MAC_SIZE];
        out.copy_from_slice(&self.hmac::<C>(key, segments)[..MAC_SIZE]);
        out
    }

    /// RFC 6189 KDF: `HMAC(ki, i || label || 0x00 || context || L)` truncated to `length` bytes,
    /// with the counter `i` fixed at 1 since no output is longer than the hash.
    pub fn kdf<C: CryptoLayer>(&self, ki: &[u8], label: &[u8], context: &[u8], length: usize) -> Zeroizing<Digest> {
        debug_assert!(length <= self.hash.size());
        let bits = ((length * 8) as u32).to_be_bytes();
        let mut out = self.hmac::<C>(ki, &[&1u32.to_be_bytes(), label, &[0], context, &bits]);
        out.truncate(length);
        out
    }

    /// Compute s0 out of the DH result and the up to three shared secrets that matched.
    pub fn s0<C: CryptoLayer>(
        &self,
        dh_result: &[u8],
        kdf_context: &KdfContext,
        s1: Option<&[u8]>,
        s2: Option<&[u8]>,
        s3: Option<&[u8]>,
    ) -> Zeroizing<Digest> {
        let len = |s: Option<&[u8]>| (s.map_or(0, |s| s.len()) as u32).to_be_bytes();
        let (l1, l2, l3) = (len(s1), len(s2), len(s3));
        Zeroizing::new(self.hash::<C>(&[
            &1u32.to_be_bytes(),
            dh_result,
            KDF_S0_LABEL,
            &kdf_context.0,
            &l1,
            s1.unwrap_or_default(),
            &l2,
            s2.unwrap_or_default(),
            &l3,
            s3.unwrap_or_default(),
        ]))
    }

    /// Derive every session key out of s0.
    pub fn derive_keys<C: CryptoLayer>(&self, s0: &[u8], kdf_context: &KdfContext, role: Role) -> KeySchedule {
        let ctx = &kdf_context.0[..];
        let hash_len = self.hash.size();
        let key_len = self.cipher.key_size();
        let kdf = |label: &[u8], length: usize| self.kdf::<C>(s0, label, ctx, length);
        let key = |label: &[u8]| -> Zeroizing<ArrayVec<u8, AES_256_KEY_SIZE>> {
            Zeroizing::new(kdf(label, key_len).iter().copied().collect())
        };
        let salt = |label: &[u8]| {
            let mut out = Zeroizing::new([0u8; SRTP_SALT_SIZE]);
            out.copy_from_slice(&kdf(label, SRTP_SALT_SIZE));
            out
        };
        let mut sas_hash = [0u8; 32];
        sas_hash.copy_from_slice(&kdf(LABEL_SAS, 32));
        let mut new_rs1 = Zeroizing::new([0u8; RETAINED_SECRET_SIZE]);
        new_rs1.copy_from_slice(&kdf(LABEL_RETAINED_SECRET, RETAINED_SECRET_SIZE));
        KeySchedule {
            mackey_i: kdf(LABEL_INITIATOR_HMAC_KEY, hash_len),
            mackey_r: kdf(LABEL_RESPONDER_HMAC_KEY, hash_len),
            zrtpkey_i: kdf(LABEL_INITIATOR_ZRTP_KEY, key_len),
            zrtpkey_r: kdf(LABEL_RESPONDER_ZRTP_KEY, key_len),
            session_key: kdf(LABEL_SESSION_KEY, hash_len),
            sas_hash,
            new_rs1,
            srtp: SessionKeys {
                role,
                cipher: self.cipher,
                auth_tag: self.auth_tag,
                initiator_key: key(LABEL_INITIATOR_SRTP_KEY),
                initiator_salt: salt(LABEL_INITIATOR_SRTP_SALT),
                responder_key: key(LABEL_RESPONDER_SRTP_KEY),
                responder_salt: salt(LABEL_RESPONDER_SRTP_SALT),
                exported_key: kdf(LABEL_EXPORTED_KEY, hash_len),
            },
        }
    }

    /// Encrypt or decrypt the body of a Confirm message in place with the negotiated cipher.
    pub fn confirm_cipher<C: CryptoLayer>(&self, key: &[u8], iv: &[u8; AES_BLOCK_SIZE], data: &mut [u8], encrypt: bool) -> Result<(), ZrtpError> {
        fn key_array<const N: usize>(key: &[u8]) -> Result<&[u8; N], ZrtpError> {
            key.get(..N).and_then(|k| k.try_into().ok()).ok_or(ZrtpError::CryptoFailure)
        }
        match (self.cipher, encrypt) {
            (CipherAlgorithm::Aes1, true) => cfb_encrypt::<AES_128_KEY_SIZE, C::Aes128>(key_array(key)?, iv, data),
            (CipherAlgorithm::Aes1, false) => cfb_decrypt::<AES_128_KEY_SIZE, C::Aes128>(key_array(key)?, iv, data),
            (CipherAlgorithm::Aes3, true) => cfb_encrypt::<AES_256_KEY_SIZE, C::Aes256>(key_array(key)?, iv, data),
            (CipherAlgorithm::Aes3, false) => cfb_decrypt::<AES_256_KEY_SIZE, C::Aes256>(key_array(key)?, iv, data),
        }
        Ok(())
    }

    /// The SRTP crypto suite name reported to the application.
    pub fn cipher_info(&self) -> String {
        format!("{}/{}", self.cipher.srtp_name(), self.auth_tag.srtp_name())
    }
}

/// SHA-256, the hash of the hash chain and of Hello hashes regardless of negotiation.
pub(crate) fn sha256<C: CryptoLayer>(segments: &[&[u8]]) -> [u8; SHA256_HASH_SIZE] {
    C::Sha256::hash(segments.iter().copied())
}

/// The Hello MAC, HMAC-SHA-256 keyed by H2 and truncated to 64 bits.
pub(crate) fn hello_mac<C: CryptoLayer>(h2: &[u8], hello: &[u8]) -> [u8; MAC_SIZE] {
    let mut full = [0u8; SHA256_HASH_SIZE];
    C::HmacSha256::new().hash(h2, &[hello], &mut full);
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&full[..MAC_SIZE]);
    out
}

/// `ZIDi || ZIDr || total_hash`, the context of every KDF call.
pub(crate) struct KdfContext(Vec<u8>);

impl KdfContext {
    pub fn new(zid_i: &[u8], zid_r: &[u8], total_hash: &[u8]) -> Self {
        Self([zid_i, zid_r, total_hash].concat())
    }
}

/// Incremental hash of the handshake transcript with the negotiated hash.
pub(crate) enum Transcript<C: CryptoLayer> {
    S256(HashContext<C::Sha256, SHA256_HASH_SIZE>),
    S384(HashContext<C::Sha384, SHA384_HASH_SIZE>),
    Skn2(HashContext<C::Skein256, SKEIN256_HASH_SIZE>),
    Skn3(HashContext<C::Skein384, SKEIN384_HASH_SIZE>),
}

macro_rules! each_transcript {
    ($self:expr, $h:ident => $body:expr) => {
        match $self {
            Transcript::S256($h) => $body,
            Transcript::S384($h) => $body,
            Transcript::Skn2($h) => $body,
            Transcript::Skn3($h) => $body,
        }
    };
}

impl<C: CryptoLayer> Transcript<C> {
    pub fn new(hash: HashAlgorithm) -> Self {
        match hash {
            HashAlgorithm::S256 => Self::S256(HashContext::new()),
            HashAlgorithm::S384 => Self::S384(HashContext::new()),
            HashAlgorithm::Skn2 => Self::Skn2(HashContext::new()),
            HashAlgorithm::Skn3 => Self::Skn3(HashContext::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> Result<(), ContextError> {
        each_transcript!(self, h => h.update(data))
    }

    pub fn finish(&mut self) -> Result<Digest, ContextError> {
        each_transcript!(self, h => h.finish().map(|d| d.into_iter().collect()))
    }

    pub fn release(&mut self) {
        each_transcript!(self, h => h.release())
    }
}

/// Every key derived out of s0.
pub(crate) struct KeySchedule {
    pub mackey_i: Zeroizing<Digest>,
    pub mackey_r: Zeroizing<Digest>,
    pub zrtpkey_i: Zeroizing<Digest>,
    pub zrtpkey_r: Zeroizing<Digest>,
    pub session_key: Zeroizing<Digest>,
    pub sas_hash: [u8; 32],
    pub new_rs1: Zeroizing<[u8; RETAINED_SECRET_SIZE]>,
    pub srtp: SessionKeys,
}

impl KeySchedule {
    /// MAC and encryption keys of the Confirm or GoClear sent by `role`.
    pub fn keys_of(&self, role: Role) -> (&[u8], &[u8]) {
        match role {
            Role::Initiator => (&self.mackey_i, &self.zrtpkey_i),
            Role::Responder => (&self.mackey_r, &self.zrtpkey_r),
        }
    }
}

/// An ephemeral key pair of the negotiated key agreement type.
pub(crate) enum DhKeyPair<C: CryptoLayer> {
    Ec25(C::P256),
    Ec38(C::P384),
}

impl<C: CryptoLayer> DhKeyPair<C> {
    pub fn generate(key_agreement: KeyAgreement, rng: &mut C::Rng) -> Self {
        match key_agreement {
            KeyAgreement::Ec25 => Self::Ec25(C::P256::generate(rng)),
            KeyAgreement::Ec38 => Self::Ec38(C::P384::generate(rng)),
        }
    }

    pub fn key_agreement(&self) -> KeyAgreement {
        match self {
            Self::Ec25(_) => KeyAgreement::Ec25,
            Self::Ec38(_) => KeyAgreement::Ec38,
        }
    }

    pub fn public_value(&self) -> Vec<u8> {
        match self {
            Self::Ec25(k) => k.public_value().to_vec(),
            Self::Ec38(k) => k.public_value().to_vec(),
        }
    }

    /// Agree with the peer's public value. Values of the wrong size, values the curve rejects and
    /// a reflection of our own public value all fail with `KeyAgreementFailed`.
    pub fn agree(&self, peer_value: &[u8]) -> Result<Zeroizing<Vec<u8>>, ZrtpError> {
        if secure_eq(peer_value, &self.public_value()) {
            return Err(ZrtpError::KeyAgreementFailed);
        }
        let shared = match self {
            Self::Ec25(k) => peer_value.try_into().ok().and_then(|pv| k.agree(pv)).map(|s| s.to_vec()),
            Self::Ec38(k) => peer_value.try_into().ok().and_then(|pv| k.agree(pv)).map(|s| s.to_vec()),
        };
        shared.map(Zeroizing::new).ok_or(ZrtpError::KeyAgreementFailed)
    }
}

#[cfg(all(test, feature = "default-crypto"))]
mod tests {
    use super::*;
    use crate::crypto_impl::*;

    struct TestCrypto;
    impl DefaultCrypto for TestCrypto {}

    fn hello_offering(key_agreements: &[&[u8; 4]]) -> Hello {
        Hello {
            version: ZRTP_VERSION,
            client_id: [b' '; CLIENT_ID_SIZE],
            h3: [0; 32],
            zid: [1; 12],
            signature_capable: false,
            mitm: false,
            passive: false,
            hashes: [AlgorithmId::new(b"S384"), AlgorithmId::new(b"SKN3")].into_iter().collect(),
            ciphers: ArrayVec::new(),
            auth_tags: [AlgorithmId::new(b"HS80")].into_iter().collect(),
            key_agreements: key_agreements.iter().map(|id| AlgorithmId::new(id)).collect(),
            sas_types: ArrayVec::new(),
            mac: [0; 8],
        }
    }

    #[test]
    fn negotiation_follows_our_preference() {
        let suite = Suite::negotiate(&Config::default(), &hello_offering(&[b"DH3k", b"EC25"])).unwrap();
        assert_eq!(suite.hash, HashAlgorithm::S384);
        // The peer listed no cipher, so only the mandatory one is left.
        assert_eq!(suite.cipher, CipherAlgorithm::Aes1);
        assert_eq!(suite.auth_tag, AuthTag::Hs80);
        assert_eq!(suite.key_agreement, KeyAgreement::Ec25);
        assert_eq!(suite.sas, SasType::B32);
    }

    #[test]
    fn negotiation_failures() {
        let config = Config::default();
        assert_eq!(
            Suite::negotiate(&config, &hello_offering(&[b"DH3k"])),
            Err(ZrtpError::UnsupportedVersion { missing: Some(AlgorithmType::KeyAgreement) })
        );
        let mut hello = hello_offering(&[b"EC25"]);
        hello.version = *b"2.00";
        assert_eq!(Suite::negotiate(&config, &hello), Err(ZrtpError::UnsupportedVersion { missing: None }));
        hello.version = *b"1.12";
        assert!(Suite::negotiate(&config, &hello).is_ok());
    }

    #[test]
    fn commit_choices_must_have_been_offered() {
        let mut config = Config::default();
        config.clear_algorithms(AlgorithmType::KeyAgreement);
        config.add_algorithm(AlgorithmType::KeyAgreement, "EC38");
        let mut commit = Commit {
            h2: [0; 32],
            zid: [0; 12],
            hash: AlgorithmId::new(b"S256"),
            cipher: AlgorithmId::new(b"AES3"),
            auth_tag: AlgorithmId::new(b"HS32"),
            key_agreement: AlgorithmId::new(b"EC38"),
            sas: AlgorithmId::new(b"B32 "),
            hvi: [0; 32],
            mac: [0; 8],
        };
        assert_eq!(Suite::from_commit(&config, &commit).unwrap().cipher, CipherAlgorithm::Aes3);
        commit.key_agreement = AlgorithmId::new(b"EC25");
        assert_eq!(
            Suite::from_commit(&config, &commit),
            Err(ZrtpError::UnsupportedVersion { missing: Some(AlgorithmType::KeyAgreement) })
        );
    }

    fn suite(hash: HashAlgorithm, cipher: CipherAlgorithm) -> Suite {
        Suite { hash, cipher, auth_tag: AuthTag::Hs32, key_agreement: KeyAgreement::Ec25, sas: SasType::B32 }
    }

    #[test]
    fn skein_is_negotiated_when_it_is_all_the_peer_hashes_with() {
        let mut config = Config::default();
        config.clear_algorithms(AlgorithmType::Hash);
        config.add_algorithm(AlgorithmType::Hash, "SKN3");
        config.add_algorithm(AlgorithmType::Hash, "SKN2");
        let mut hello = hello_offering(&[b"EC25"]);
        hello.hashes = [AlgorithmId::new(b"SKN2"), AlgorithmId::new(b"SKN3")].into_iter().collect();
        assert_eq!(Suite::negotiate(&config, &hello).unwrap().hash, HashAlgorithm::Skn3);

        // S256 is mandatory, so it is the fallback when our Skein choice was not offered.
        hello.hashes = [AlgorithmId::new(b"SKN2")].into_iter().collect();
        config.clear_algorithms(AlgorithmType::Hash);
        config.add_algorithm(AlgorithmType::Hash, "SKN3");
        assert_eq!(Suite::negotiate(&config, &hello).unwrap().hash, HashAlgorithm::S256);
    }

    #[test]
    fn skein_suites_hash_and_mac_with_skein() {
        let s = suite(HashAlgorithm::Skn2, CipherAlgorithm::Aes1);
        assert_eq!(&s.hash::<TestCrypto>(&[b"Hello", b"Commit"])[..], &CrateSkein256::hash([&b"HelloCommit"[..]])[..]);
        let mut full = [0u8; 32];
        CrateSkeinMac256.hash(b"key", &[b"GoClear "], &mut full);
        assert_eq!(s.mac64::<TestCrypto>(b"key", &[b"GoClear "]), full[..MAC_SIZE]);

        let s = suite(HashAlgorithm::Skn3, CipherAlgorithm::Aes3);
        assert_eq!(s.hash::<TestCrypto>(&[b""]).len(), 48);
        assert_eq!(s.kdf::<TestCrypto>(b"key", b"SAS", b"context", 32).len(), 32);
        let mut t = Transcript::<TestCrypto>::new(HashAlgorithm::Skn3);
        t.update(b"Hello").unwrap();
        t.update(b"Commit").unwrap();
        assert_eq!(t.finish().unwrap(), s.hash::<TestCrypto>(&[b"HelloCommit"]));
    }

    #[test]
    fn kdf_matches_its_definition() {
        let s = suite(HashAlgorithm::S384, CipherAlgorithm::Aes1);
        let out = s.kdf::<TestCrypto>(b"key", b"SAS", b"context", 32);
        let mut full = [0u8; 48];
        CrateHmacSha384::new().hash(b"key", &[&[0, 0, 0, 1], b"SAS\0context", &[0, 0, 1, 0]], &mut full);
        assert_eq!(&out[..], &full[..32]);
    }

    #[test]
    fn derived_keys_depend_on_every_input() {
        let s = suite(HashAlgorithm::S256, CipherAlgorithm::Aes3);
        let ctx = KdfContext::new(&[1; 12], &[2; 12], &[3; 32]);
        let s0 = s.s0::<TestCrypto>(&[9; 32], &ctx, None, None, None);
        let with_rs1 = s.s0::<TestCrypto>(&[9; 32], &ctx, Some(&[5; 32]), None, None);
        assert_ne!(s0, with_rs1);

        let a = s.derive_keys::<TestCrypto>(&s0, &ctx, Role::Initiator);
        let b = s.derive_keys::<TestCrypto>(&s0, &ctx, Role::Responder);
        assert_eq!(a.srtp, b.srtp);
        assert_eq!(a.sas_hash, b.sas_hash);
        assert_eq!(a.srtp.initiator_key.len(), 32);
        assert_eq!(a.srtp.send_key().0, b.srtp.receive_key().0);
        assert_ne!(a.srtp.initiator_key, a.srtp.responder_key);
        assert_ne!(a.mackey_i, a.mackey_r);

        let other_ctx = KdfContext::new(&[1; 12], &[2; 12], &[4; 32]);
        let c = s.derive_keys::<TestCrypto>(&s0, &other_ctx, Role::Initiator);
        assert_ne!(a.srtp, c.srtp);
    }

    #[test]
    fn confirm_cipher_round_trips() {
        for cipher in CipherAlgorithm::ALL {
            let s = suite(HashAlgorithm::S256, *cipher);
            let key = [7u8; 32];
            let iv = [1u8; 16];
            let mut data = *b"0123456789abcdefghijklmnopqrstuvwxyz0123";
            s.confirm_cipher::<TestCrypto>(&key[..cipher.key_size()], &iv, &mut data, true).unwrap();
            assert_ne!(&data, b"0123456789abcdefghijklmnopqrstuvwxyz0123");
            s.confirm_cipher::<TestCrypto>(&key[..cipher.key_size()], &iv, &mut data, false).unwrap();
            assert_eq!(&data, b"0123456789abcdefghijklmnopqrstuvwxyz0123");
        }
        let s = suite(HashAlgorithm::S256, CipherAlgorithm::Aes3);
        assert_eq!(s.confirm_cipher::<TestCrypto>(&[0; 16], &[0; 16], &mut [0; 40], true), Err(ZrtpError::CryptoFailure));
    }

    #[test]
    fn transcript_matches_one_shot_hash() {
        let s = suite(HashAlgorithm::S384, CipherAlgorithm::Aes1);
        let mut t = Transcript::<TestCrypto>::new(HashAlgorithm::S384);
        t.update(b"Hello").unwrap();
        t.update(b"Commit").unwrap();
        assert_eq!(t.finish().unwrap(), s.hash::<TestCrypto>(&[b"HelloCommit"]));
        assert_eq!(t.update(b"late"), Err(ContextError::Finalized));
        t.release();
        assert_eq!(t.finish(), Err(ContextError::Released));
    }

    #[test]
    fn key_agreement_rejects_bad_values() {
        let mut rng = rand_core::OsRng;
        for ka in KeyAgreement::ALL {
            let a = DhKeyPair::<TestCrypto>::generate(*ka, &mut rng);
            let b = DhKeyPair::<TestCrypto>::generate(*ka, &mut rng);
            assert_eq!(a.public_value().len(), ka.public_value_size());
            assert_eq!(a.agree(&b.public_value()).unwrap(), b.agree(&a.public_value()).unwrap());
            assert_eq!(a.agree(&a.public_value()), Err(ZrtpError::KeyAgreementFailed));
            assert_eq!(a.agree(&vec![0; ka.public_value_size()]), Err(ZrtpError::KeyAgreementFailed));
            assert_eq!(a.agree(&[1; 10]), Err(ZrtpError::KeyAgreementFailed));
        }
    }
}
