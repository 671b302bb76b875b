use arrayvec::ArrayVec;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::config::{AuthTag, CipherAlgorithm};
use crate::crypto::*;
use crate::proto::*;
use crate::result::{ControlError, Severity};
use crate::retained::SecretKind;

/// A container for the time-based settings of ZRTP, which are all retransmission timers.
/// If the user wishes to measure time in units other than milliseconds for some reason, then they can
/// create an adjusted version of this struct with those units, and use it instead of the default.
pub struct Settings {
    /// First retransmission interval of Hello (timer T1).
    pub t1_initial: u64,
    /// T1 doubles after every retransmission up to this cap.
    pub t1_cap: u64,
    /// How many times Hello is retransmitted before the peer is declared as not supporting ZRTP.
    pub t1_max_retries: u32,
    /// First retransmission interval of Commit, DHPart2, Confirm2 and GoClear (timer T2).
    pub t2_initial: u64,
    /// T2 doubles after every retransmission up to this cap.
    pub t2_cap: u64,
    /// How many times a T2 message is retransmitted before the session fails with a protocol timeout.
    pub t2_max_retries: u32,
}
impl Settings {
    /// Default value for `t1_initial`, 50 ms.
    pub const T1_INITIAL_MS: u64 = 50;
    /// Default value for `t1_cap`, 200 ms.
    pub const T1_CAP_MS: u64 = 200;
    /// Default value for `t1_max_retries`.
    pub const T1_MAX_RETRIES: u32 = 20;
    /// Default value for `t2_initial`, 150 ms.
    pub const T2_INITIAL_MS: u64 = 150;
    /// Default value for `t2_cap`, 1.2 seconds.
    pub const T2_CAP_MS: u64 = 1200;
    /// Default value for `t2_max_retries`.
    pub const T2_MAX_RETRIES: u32 = 10;
    /// Create an instance of Settings with all default values.
    /// These defaults are in units of milliseconds, so if these defaults are used, `App::time`
    /// must return timestamps in units of milliseconds as well.
    pub const fn new_ms() -> Self {
        Self {
            t1_initial: Self::T1_INITIAL_MS,
            t1_cap: Self::T1_CAP_MS,
            t1_max_retries: Self::T1_MAX_RETRIES,
            t2_initial: Self::T2_INITIAL_MS,
            t2_cap: Self::T2_CAP_MS,
            t2_max_retries: Self::T2_MAX_RETRIES,
        }
    }
}
impl Default for Settings {
    fn default() -> Self {
        Self::new_ms()
    }
}

/// The cryptographic provider of a ZRTP endpoint.
///
/// The protocol engine never calls a primitive directly, only through the types named here, so
/// any of them can be replaced by a certified implementation without touching protocol logic.
/// See `crypto_impl::DefaultCrypto` for an implementation built on the RustCrypto crates.
pub trait CryptoLayer: Sized {
    /// Retransmission timers. Both sides of a session should use the same values, although the
    /// protocol tolerates a mismatch.
    const SETTINGS: Settings = Settings::new_ms();

    /// The random number generator used for the hash chain, Confirm IVs and ephemeral keys.
    type Rng: CryptoRng + RngCore;

    /// SHA-256, used for the hash chain and Hello hashes as well as for the `S256` hash type.
    type Sha256: ZrtpHash<SHA256_HASH_SIZE>;
    /// SHA-384, used for the `S384` hash type.
    type Sha384: ZrtpHash<SHA384_HASH_SIZE>;
    type HmacSha256: ZrtpHmac<SHA256_HASH_SIZE>;
    type HmacSha384: ZrtpHmac<SHA384_HASH_SIZE>;

    /// Skein-512-256, the `SKN2` hash type.
    type Skein256: ZrtpHash<SKEIN256_HASH_SIZE>;
    /// Skein-512-384, the `SKN3` hash type.
    type Skein384: ZrtpHash<SKEIN384_HASH_SIZE>;
    /// The keyed MAC that goes with `Skein256`.
    type SkeinMac256: ZrtpHmac<SKEIN256_HASH_SIZE>;
    type SkeinMac384: ZrtpHmac<SKEIN384_HASH_SIZE>;

    /// AES-128 block encryption, used for the `AES1` cipher type.
    type Aes128: AesEnc<AES_128_KEY_SIZE>;
    /// AES-256 block encryption, used for the `AES3` cipher type.
    type Aes256: AesEnc<AES_256_KEY_SIZE>;

    /// Ephemeral ECDH over NIST P-256, the `EC25` key agreement type.
    type P256: EcdhKeyPair<Self::Rng, P256_PUBLIC_VALUE_SIZE, P256_SHARED_SECRET_SIZE>;
    /// Ephemeral ECDH over NIST P-384, the `EC38` key agreement type.
    type P384: EcdhKeyPair<Self::Rng, P384_PUBLIC_VALUE_SIZE, P384_SHARED_SECRET_SIZE>;
}

/// Which side of the key agreement we ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// We sent the Commit that the peer accepted.
    Initiator,
    Responder,
}

/// A direction of the media stream, relative to the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

/// SRTP key material produced at the end of a successful key agreement.
///
/// Instances are only ever lent to the application, see `ApplicationLayer::protect_media`.
/// All keys are wiped when dropped. Equality is constant time.
pub struct SessionKeys {
    /// Our role in the session these keys belong to.
    pub role: Role,
    pub cipher: CipherAlgorithm,
    pub auth_tag: AuthTag,
    pub initiator_key: Zeroizing<ArrayVec<u8, AES_256_KEY_SIZE>>,
    pub initiator_salt: Zeroizing<[u8; SRTP_SALT_SIZE]>,
    pub responder_key: Zeroizing<ArrayVec<u8, AES_256_KEY_SIZE>>,
    pub responder_salt: Zeroizing<[u8; SRTP_SALT_SIZE]>,
    /// Key material the application may use for its own purposes, the RFC 6189 "Exported key".
    pub exported_key: Zeroizing<ArrayVec<u8, MAX_HASH_SIZE>>,
}

impl SessionKeys {
    /// Master key and salt protecting media we send.
    pub fn send_key(&self) -> (&[u8], &[u8; SRTP_SALT_SIZE]) {
        match self.role {
            Role::Initiator => (&self.initiator_key, &self.initiator_salt),
            Role::Responder => (&self.responder_key, &self.responder_salt),
        }
    }

    /// Master key and salt protecting media we receive.
    pub fn receive_key(&self) -> (&[u8], &[u8; SRTP_SALT_SIZE]) {
        match self.role {
            Role::Initiator => (&self.responder_key, &self.responder_salt),
            Role::Responder => (&self.initiator_key, &self.initiator_salt),
        }
    }

    /// The SRTP crypto suite these keys are meant for, e.g. `AES-CM-128/HMAC-SHA1-80`.
    pub fn cipher_info(&self) -> String {
        format!("{}/{}", self.cipher.srtp_name(), self.auth_tag.srtp_name())
    }
}

impl PartialEq for SessionKeys {
    fn eq(&self, other: &Self) -> bool {
        secure_eq(&self.initiator_key[..], &other.initiator_key[..])
            & secure_eq(&self.initiator_salt, &other.initiator_salt)
            & secure_eq(&self.responder_key[..], &other.responder_key[..])
            & secure_eq(&self.responder_salt, &other.responder_salt)
            & secure_eq(&self.exported_key[..], &other.exported_key[..])
            & (self.cipher == other.cipher)
            & (self.auth_tag == other.auth_tag)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("role", &self.role)
            .field("cipher", &self.cipher)
            .field("auth_tag", &self.auth_tag)
            .finish_non_exhaustive()
    }
}

/// Trait to implement to integrate ZRTP into an application.
///
/// This is the notification sink of a session: every call here is made by the session while it
/// processes a packet, a timer or a control operation. Implementations must not call back into
/// the same session from inside these functions.
///
/// Templating ZRTP on this trait lets the code here be almost entirely transport, OS,
/// and use case independent.
pub trait ApplicationLayer<C: CryptoLayer>: Sized {
    /// Should return the current time in milliseconds. Does not have to be monotonic, nor synced
    /// with remote peers. Used to drive retransmissions.
    fn time(&mut self) -> i64;

    /// Should return the current wall clock time in seconds since the Unix epoch.
    /// Used to expire retained secrets.
    fn unix_time(&mut self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Hand a complete ZRTP packet to the transport. Must not block.
    fn send_packet(&mut self, packet: &[u8]);

    /// Start protecting media in `direction` with `keys`. The keys are only lent for the duration
    /// of this call, so the application must install them into its SRTP context right away.
    fn protect_media(&mut self, keys: &SessionKeys, direction: Direction);
    /// Stop protecting media in `direction`.
    fn unprotect_media(&mut self, direction: Direction);

    /// Media is now protected in both directions with the given SRTP crypto suite.
    fn secure_on(&mut self, cipher_info: &str);
    /// Media is no longer protected.
    fn secure_off(&mut self);
    /// Display the short authentication string. `verified` is true when both sides have verified
    /// it in an earlier session and the key continuity chain is unbroken.
    fn show_sas(&mut self, sas: &str, verified: bool);
    /// The peer asked to go clear. Ask the user, then call `SessionControl::confirm_go_clear` to
    /// accept. Until then media stays protected.
    fn confirm_go_clear(&mut self);
    /// An informational, warning or error message worth showing to the user.
    fn show_message(&mut self, severity: Severity, text: &str);
    /// The session failed and is now in `State::Failed`.
    fn negotiation_failed(&mut self, severity: Severity, text: &str);
    /// The peer never answered our Hello, it probably does not speak ZRTP.
    fn peer_not_supported(&mut self);

    /// Receives a stream of events that occur during an execution of ZRTP.
    /// These are provided for debugging, logging or metrics purposes, and must be used for
    /// nothing else. Do not base protocol-level decisions upon the events passed to this function.
    #[cfg(feature = "logging")]
    #[allow(unused)]
    fn event_log(&mut self, event: crate::LogEvent<'_>) {}
}

/// Operations the host may invoke on a running session.
///
/// None of these block, and none of them change the session state when they return an error.
pub trait SessionControl<C: CryptoLayer> {
    /// Start ZRTP discovery on an idle session, or stop the protocol and return to idle.
    ///
    /// Stopping a secure session turns media protection off.
    fn enable_zrtp<App: ApplicationLayer<C>>(&self, app: &mut App, enable: bool) -> Result<(), ControlError>;
    /// Record that the user compared the SAS with the peer and found it matching.
    fn mark_sas_verified(&self) -> Result<(), ControlError>;
    /// Forget that the SAS of this peer was ever verified.
    fn reset_sas_verified(&self) -> Result<(), ControlError>;
    /// Accept a go-clear request received from the peer. Media protection stops in both
    /// directions and the session returns to idle.
    fn confirm_go_clear<App: ApplicationLayer<C>>(&self, app: &mut App) -> Result<(), ControlError>;
    /// Ask the peer to go clear. Outbound media is unprotected immediately.
    fn request_go_clear<App: ApplicationLayer<C>>(&self, app: &mut App) -> Result<(), ControlError>;
    /// Provide an auxiliary secret shared with the peer by other means. It is mixed into the key
    /// agreement if the peer holds the same secret, and cached for future sessions.
    ///
    /// Must be called before key agreement starts.
    fn set_retained_secret(&self, kind: SecretKind, secret: &[u8]) -> Result<(), ControlError>;
    /// Our Hello hash in the `a=zrtp-hash` signaling format, or `"0"` if discovery has not started.
    fn hello_hash_hex(&self) -> String;
    /// The SAS and SAS hash in a form suited for signaling, or `"0"` before they are known.
    fn sas_data_for_signaling(&self) -> String;
}
