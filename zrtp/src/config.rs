use crate::proto::*;

/// A four character algorithm identifier as it appears on the wire, e.g. `S256` or `EC38`.
///
/// Identifiers we do not implement are still representable so that a peer's Hello can be decoded
/// and re-encoded unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmId(pub [u8; 4]);

impl AlgorithmId {
    pub const fn new(id: &[u8; 4]) -> Self {
        Self(*id)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Debug for AlgorithmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AlgorithmId({})", self.as_str())
    }
}

macro_rules! algorithm_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $id:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }
        impl $name {
            /// Every supported value of this category, in default preference order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn id(&self) -> AlgorithmId {
                match self {
                    $($name::$variant => AlgorithmId::new($id)),+
                }
            }

            pub fn from_id(id: AlgorithmId) -> Option<Self> {
                match &id.0 {
                    $($id => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Look an algorithm up by its wire name, ignoring surrounding whitespace.
            pub fn from_name(name: &str) -> Option<Self> {
                let name = name.trim().as_bytes();
                Self::ALL.iter().copied().find(|a| a.id().as_str().trim_end().as_bytes() == name)
            }
        }
    };
}

algorithm_enum!(
    /// Negotiated hash, used for everything from hvi to the KDF. `SKN2` and `SKN3` are
    /// Skein-512 truncated to 256 and 384 bits.
    HashAlgorithm { S384 => b"S384", S256 => b"S256", Skn3 => b"SKN3", Skn2 => b"SKN2" }
);
algorithm_enum!(
    /// Block cipher used for SRTP and for the body of Confirm messages.
    CipherAlgorithm { Aes3 => b"AES3", Aes1 => b"AES1" }
);
algorithm_enum!(
    /// SRTP authentication tag type.
    AuthTag { Hs80 => b"HS80", Hs32 => b"HS32" }
);
algorithm_enum!(
    /// Key agreement type. Only the elliptic curve Diffie-Hellman modes are implemented.
    KeyAgreement { Ec38 => b"EC38", Ec25 => b"EC25" }
);
algorithm_enum!(
    /// Short authentication string rendering.
    SasType { B32 => b"B32 " }
);

impl HashAlgorithm {
    pub const fn size(&self) -> usize {
        match self {
            Self::S256 | Self::Skn2 => 32,
            Self::S384 | Self::Skn3 => 48,
        }
    }
}

impl CipherAlgorithm {
    pub const fn key_size(&self) -> usize {
        match self {
            Self::Aes1 => 16,
            Self::Aes3 => 32,
        }
    }

    pub(crate) const fn srtp_name(&self) -> &'static str {
        match self {
            Self::Aes1 => "AES-CM-128",
            Self::Aes3 => "AES-CM-256",
        }
    }
}

impl AuthTag {
    /// Length of the SRTP authentication tag in bits.
    pub const fn tag_bits(&self) -> usize {
        match self {
            Self::Hs32 => 32,
            Self::Hs80 => 80,
        }
    }

    pub(crate) const fn srtp_name(&self) -> &'static str {
        match self {
            Self::Hs32 => "HMAC-SHA1-32",
            Self::Hs80 => "HMAC-SHA1-80",
        }
    }
}

impl KeyAgreement {
    pub const fn public_value_size(&self) -> usize {
        match self {
            Self::Ec25 => 64,
            Self::Ec38 => 96,
        }
    }
}

/// The five algorithm categories negotiated through Hello and Commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmType {
    Hash,
    Cipher,
    AuthTag,
    KeyAgreement,
    Sas,
}

impl AlgorithmType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Cipher => "cipher",
            Self::AuthTag => "SRTP authentication tag",
            Self::KeyAgreement => "key agreement",
            Self::Sas => "SAS",
        }
    }
}

/// Protocol configuration of a local endpoint, shared by all of its sessions.
///
/// Each algorithm list is in preference order; the first entry we share with the peer wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Free form identification of this implementation, sent in Hello.
    pub client_id: [u8; CLIENT_ID_SIZE],
    pub hashes: Vec<HashAlgorithm>,
    pub ciphers: Vec<CipherAlgorithm>,
    pub auth_tags: Vec<AuthTag>,
    pub key_agreements: Vec<KeyAgreement>,
    pub sas_types: Vec<SasType>,
    /// Whether we accept, and may send, GoClear once secure.
    pub allow_clear: bool,
    /// A passive endpoint never sends Commit and waits for the peer to start key agreement.
    pub passive: bool,
    /// How long, in seconds, the peer may keep the retained secret of a session with us.
    /// `CACHE_EXPIRATION_NEVER` means forever and 0 means not at all.
    pub cache_expiration_secs: u32,
}

impl Config {
    pub const DEFAULT_CLIENT_ID: &'static [u8; CLIENT_ID_SIZE] = b"zrtp-rs 0.1     ";

    /// Replace the client identifier, truncating or space padding `name` to 16 bytes.
    pub fn with_client_id(mut self, name: &str) -> Self {
        self.client_id = [b' '; CLIENT_ID_SIZE];
        let n = name.len().min(CLIENT_ID_SIZE);
        self.client_id[..n].copy_from_slice(&name.as_bytes()[..n]);
        self
    }

    /// Append the algorithm called `name` to the preference list of `algorithm_type`.
    ///
    /// Returns false if the name is unknown, already present, or the list is full.
    pub fn add_algorithm(&mut self, algorithm_type: AlgorithmType, name: &str) -> bool {
        fn push<T: PartialEq>(list: &mut Vec<T>, value: Option<T>) -> bool {
            match value {
                Some(v) if !list.contains(&v) && list.len() < MAX_ALGORITHMS => {
                    list.push(v);
                    true
                }
                _ => false,
            }
        }
        match algorithm_type {
            AlgorithmType::Hash => push(&mut self.hashes, HashAlgorithm::from_name(name)),
            AlgorithmType::Cipher => push(&mut self.ciphers, CipherAlgorithm::from_name(name)),
            AlgorithmType::AuthTag => push(&mut self.auth_tags, AuthTag::from_name(name)),
            AlgorithmType::KeyAgreement => push(&mut self.key_agreements, KeyAgreement::from_name(name)),
            AlgorithmType::Sas => push(&mut self.sas_types, SasType::from_name(name)),
        }
    }

    /// Empty the preference list of `algorithm_type`.
    pub fn clear_algorithms(&mut self, algorithm_type: AlgorithmType) {
        match algorithm_type {
            AlgorithmType::Hash => self.hashes.clear(),
            AlgorithmType::Cipher => self.ciphers.clear(),
            AlgorithmType::AuthTag => self.auth_tags.clear(),
            AlgorithmType::KeyAgreement => self.key_agreements.clear(),
            AlgorithmType::Sas => self.sas_types.clear(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: *Self::DEFAULT_CLIENT_ID,
            hashes: HashAlgorithm::ALL.to_vec(),
            ciphers: CipherAlgorithm::ALL.to_vec(),
            auth_tags: AuthTag::ALL.to_vec(),
            key_agreements: KeyAgreement::ALL.to_vec(),
            sas_types: SasType::ALL.to_vec(),
            allow_clear: false,
            passive: false,
            cache_expiration_secs: CACHE_EXPIRATION_NEVER,
        }
    }
}
