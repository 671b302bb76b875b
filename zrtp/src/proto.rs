/* Identity and hash chain */

/// Size of a ZRTP identifier (ZID).
pub const ZID_SIZE: usize = 12;
/// Size of each hash chain image H0 through H3. The chain is always built with SHA-256.
pub const HASH_IMAGE_SIZE: usize = 32;
/// Size of the truncated HMAC trailing most ZRTP messages.
pub const MAC_SIZE: usize = 8;
/// Size of the client identifier carried in Hello.
pub const CLIENT_ID_SIZE: usize = 16;
/// Size of a retained secret (rs1, rs2) and of the sigs and srtps secrets.
pub const RETAINED_SECRET_SIZE: usize = 32;
/// Size of a retained secret identifier (rs1IDi, auxsecretIDr, ...).
pub const SECRET_ID_SIZE: usize = 8;
/// Largest auxiliary secret (sigs, srtps or other) a host may provide.
pub const MAX_AUX_SECRET_SIZE: usize = 64;
/// Size of the hvi commitment in a DH mode Commit.
pub const HVI_SIZE: usize = 32;
/// Size of the SRTP master salt derived for each direction (112 bits).
pub const SRTP_SALT_SIZE: usize = 14;
/// Size of the endpoint hash in Ping and PingACK.
pub const ENDPOINT_HASH_SIZE: usize = 8;

/// Largest negotiable hash output (SHA-384).
pub const MAX_HASH_SIZE: usize = 48;
/// Largest algorithm count per category that may appear in Hello.
pub const MAX_ALGORITHMS: usize = 7;

pub const ZRTP_VERSION: [u8; 4] = *b"1.10";
/// Versions starting with these bytes are compatible with ours.
pub(crate) const ZRTP_VERSION_PREFIX: &[u8] = b"1.1";

/* Framing */

/*
Packet:
    [0]       0x10
    [1]       0x00
    [2..4]    sequence number
    [4..8]    magic cookie "ZRTP"
    [8..12]   source identifier (SSRC)
    [12..n-4] message
    [n-4..n]  CRC-32c
Message header:
    [0..2]    preamble 0x505a
    [2..4]    length in 32-bit words, header included
    [4..12]   message type block
*/
pub const PACKET_HEADER_SIZE: usize = 12;
pub const CRC_SIZE: usize = 4;
pub const MESSAGE_HEADER_SIZE: usize = 12;
pub const PACKET_FIRST_BYTE: u8 = 0x10;
pub const MAGIC_COOKIE: u32 = 0x5a52_5450;
pub const PREAMBLE: u16 = 0x505a;
/// Smallest possible ZRTP packet: a header-only message such as HelloACK.
pub const MIN_PACKET_SIZE: usize = PACKET_HEADER_SIZE + MESSAGE_HEADER_SIZE + CRC_SIZE;

pub const HELLO_FIXED_SIZE: usize = MESSAGE_HEADER_SIZE + 4 + CLIENT_ID_SIZE + HASH_IMAGE_SIZE + ZID_SIZE + 4 + MAC_SIZE;
pub const COMMIT_SIZE: usize = MESSAGE_HEADER_SIZE + HASH_IMAGE_SIZE + ZID_SIZE + 5 * 4 + HVI_SIZE + MAC_SIZE;
pub const DH_PART_FIXED_SIZE: usize = MESSAGE_HEADER_SIZE + HASH_IMAGE_SIZE + 4 * SECRET_ID_SIZE + MAC_SIZE;
/// Plaintext body of Confirm without a signature: H0, flag word, cache expiration interval.
pub(crate) const CONFIRM_BODY_SIZE: usize = HASH_IMAGE_SIZE + 4 + 4;

/* Confirm flags */

pub(crate) const FLAG_DISCLOSURE: u8 = 0x01;
pub(crate) const FLAG_ALLOW_CLEAR: u8 = 0x02;
pub(crate) const FLAG_SAS_VERIFIED: u8 = 0x04;
pub(crate) const FLAG_ENROLLMENT: u8 = 0x08;

/* Hello flags, in the first byte of the algorithm count word */

pub(crate) const FLAG_SIGNATURE_CAPABLE: u8 = 0x40;
pub(crate) const FLAG_MITM: u8 = 0x20;
pub(crate) const FLAG_PASSIVE: u8 = 0x10;

/// Cache expiration interval meaning the retained secret never expires.
pub const CACHE_EXPIRATION_NEVER: u32 = 0xffff_ffff;

/* Error codes */

pub const ERROR_MALFORMED_PACKET: u32 = 0x10;
pub const ERROR_CRITICAL_SOFTWARE: u32 = 0x20;
pub const ERROR_UNSUPPORTED_VERSION: u32 = 0x30;
pub const ERROR_HELLO_MISMATCH: u32 = 0x40;
pub const ERROR_UNSUPPORTED_HASH: u32 = 0x51;
pub const ERROR_UNSUPPORTED_CIPHER: u32 = 0x52;
pub const ERROR_UNSUPPORTED_KEY_AGREEMENT: u32 = 0x53;
pub const ERROR_UNSUPPORTED_AUTH_TAG: u32 = 0x54;
pub const ERROR_UNSUPPORTED_SAS: u32 = 0x55;
pub const ERROR_NO_SHARED_SECRET: u32 = 0x56;
pub const ERROR_BAD_PUBLIC_VALUE: u32 = 0x61;
pub const ERROR_HVI_MISMATCH: u32 = 0x62;
pub const ERROR_UNTRUSTED_MITM: u32 = 0x63;
pub const ERROR_BAD_CONFIRM_MAC: u32 = 0x70;
pub const ERROR_NONCE_REUSE: u32 = 0x80;
pub const ERROR_EQUAL_ZID: u32 = 0x90;
pub const ERROR_SSRC_COLLISION: u32 = 0x91;
pub const ERROR_SERVICE_UNAVAILABLE: u32 = 0xa0;
pub const ERROR_PROTOCOL_TIMEOUT: u32 = 0xb0;
pub const ERROR_GO_CLEAR_NOT_ALLOWED: u32 = 0x100;

/// Human readable text for an RFC 6189 error code.
pub fn error_code_text(code: u32) -> &'static str {
    match code {
        ERROR_MALFORMED_PACKET => "malformed packet",
        ERROR_CRITICAL_SOFTWARE => "critical software error",
        ERROR_UNSUPPORTED_VERSION => "unsupported ZRTP version",
        ERROR_HELLO_MISMATCH => "Hello components mismatch",
        ERROR_UNSUPPORTED_HASH => "hash type not supported",
        ERROR_UNSUPPORTED_CIPHER => "cipher type not supported",
        ERROR_UNSUPPORTED_KEY_AGREEMENT => "public key exchange not supported",
        ERROR_UNSUPPORTED_AUTH_TAG => "SRTP auth tag not supported",
        ERROR_UNSUPPORTED_SAS => "SAS rendering scheme not supported",
        ERROR_NO_SHARED_SECRET => "no shared secret available, DH mode required",
        ERROR_BAD_PUBLIC_VALUE => "DH error: bad public value",
        ERROR_HVI_MISMATCH => "DH error: hvi does not match hashed data",
        ERROR_UNTRUSTED_MITM => "relayed SAS from untrusted MiTM",
        ERROR_BAD_CONFIRM_MAC => "auth error: bad Confirm MAC",
        ERROR_NONCE_REUSE => "nonce reuse",
        ERROR_EQUAL_ZID => "equal ZIDs in Hello",
        ERROR_SSRC_COLLISION => "SSRC collision",
        ERROR_SERVICE_UNAVAILABLE => "service unavailable",
        ERROR_PROTOCOL_TIMEOUT => "protocol timeout error",
        ERROR_GO_CLEAR_NOT_ALLOWED => "GoClear message received but not allowed",
        _ => "unknown error",
    }
}

/* Key derivation labels (RFC 6189 section 4.5) */

pub(crate) const KDF_S0_LABEL: &[u8] = b"ZRTP-HMAC-KDF";
pub(crate) const LABEL_INITIATOR_SRTP_KEY: &[u8] = b"Initiator SRTP master key";
pub(crate) const LABEL_INITIATOR_SRTP_SALT: &[u8] = b"Initiator SRTP master salt";
pub(crate) const LABEL_RESPONDER_SRTP_KEY: &[u8] = b"Responder SRTP master key";
pub(crate) const LABEL_RESPONDER_SRTP_SALT: &[u8] = b"Responder SRTP master salt";
pub(crate) const LABEL_INITIATOR_HMAC_KEY: &[u8] = b"Initiator HMAC key";
pub(crate) const LABEL_RESPONDER_HMAC_KEY: &[u8] = b"Responder HMAC key";
pub(crate) const LABEL_INITIATOR_ZRTP_KEY: &[u8] = b"Initiator ZRTP key";
pub(crate) const LABEL_RESPONDER_ZRTP_KEY: &[u8] = b"Responder ZRTP key";
pub(crate) const LABEL_SESSION_KEY: &[u8] = b"ZRTP Session Key";
pub(crate) const LABEL_EXPORTED_KEY: &[u8] = b"Exported key";
pub(crate) const LABEL_SAS: &[u8] = b"SAS";
pub(crate) const LABEL_RETAINED_SECRET: &[u8] = b"retained secret";

/// Retained secret identifiers are MACs over the role name of whoever sends them.
pub(crate) const ROLE_INITIATOR: &[u8] = b"Initiator";
pub(crate) const ROLE_RESPONDER: &[u8] = b"Responder";

/// The fixed input of the GoClear MAC, which is also the GoClear type block.
pub(crate) const GO_CLEAR_MAC_INPUT: &[u8] = b"GoClear ";
