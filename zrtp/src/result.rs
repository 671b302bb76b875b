use crate::config::AlgorithmType;
use crate::proto::*;

/// The reason a buffer could not be decoded as a ZRTP packet or message.
///
/// Decoding never panics; every attacker controlled length is checked against the buffer first.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MalformedPacket {
    /// The buffer ended before a field that had to be present.
    Truncated,
    /// The length field of the message disagrees with the size of the buffer.
    LengthMismatch,
    /// The message type block is not one we know.
    UnknownType,
    /// The message did not start with the `0x505a` preamble.
    BadPreamble,
    /// The packet header did not carry the ZRTP magic cookie.
    BadMagicCookie,
    /// The trailing CRC-32c did not match the packet contents.
    BadCrc,
    /// A field held a value outside of its allowed range.
    InvalidField,
}

/// A type of fault occurred because we received a bad packet.
///
/// An unauthenticated attacker can intentionally trigger any of these, so it is best to
/// treat these as raw user input that needs to be sanitized.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FaultType {
    /// The received packet was not well formed.
    MalformedPacket(MalformedPacket),
    /// Packet failed a MAC check that does not end the session, such as the one on GoClear.
    FailedAuth,
    /// Packet is valid but makes no sense in the current state, for instance a stray
    /// retransmission arriving after we moved on.
    OutOfSequence,
}

/// An error that ends a ZRTP session. The session moves to `State::Failed` and the host is told
/// through `ApplicationLayer::negotiation_failed` or `ApplicationLayer::peer_not_supported`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ZrtpError {
    /// The peer speaks an incompatible protocol version, or offered no algorithm we can use.
    /// `missing` names the algorithm category without overlap, if that was the cause.
    ///
    /// This is always decided before any key material exists.
    UnsupportedVersion { missing: Option<AlgorithmType> },
    /// The peer never answered our Hello.
    PeerNotSupported,
    /// A hash chain image, hvi or message MAC revealed during the key agreement did not match
    /// what the peer committed to earlier.
    CommitMismatch,
    /// The peer's public value was invalid (off-curve, identity, or a reflection of ours).
    KeyAgreementFailed,
    /// A Confirm message failed authentication.
    ConfirmAuthFailed,
    /// The peer's Hello carries our own ZID.
    EqualZid,
    /// The peer's Hello does not hash to the value received through signaling.
    HelloHashMismatch,
    /// A message was retransmitted the maximum number of times without an answer.
    ProtocolTimeout,
    /// The peer sent us an Error message with this code.
    PeerError(u32),
    /// The retained secret store failed.
    StorageError(std::io::ErrorKind),
    /// The crypto provider failed to produce a value.
    CryptoFailure,
}

impl ZrtpError {
    /// The code to send to the peer in an Error message, if one should be sent at all.
    pub fn error_code(&self) -> Option<u32> {
        match self {
            Self::UnsupportedVersion { missing: None } => Some(ERROR_UNSUPPORTED_VERSION),
            Self::UnsupportedVersion { missing: Some(t) } => Some(match t {
                AlgorithmType::Hash => ERROR_UNSUPPORTED_HASH,
                AlgorithmType::Cipher => ERROR_UNSUPPORTED_CIPHER,
                AlgorithmType::AuthTag => ERROR_UNSUPPORTED_AUTH_TAG,
                AlgorithmType::KeyAgreement => ERROR_UNSUPPORTED_KEY_AGREEMENT,
                AlgorithmType::Sas => ERROR_UNSUPPORTED_SAS,
            }),
            Self::CommitMismatch => Some(ERROR_HVI_MISMATCH),
            Self::KeyAgreementFailed => Some(ERROR_BAD_PUBLIC_VALUE),
            Self::ConfirmAuthFailed => Some(ERROR_BAD_CONFIRM_MAC),
            Self::EqualZid => Some(ERROR_EQUAL_ZID),
            Self::ProtocolTimeout => Some(ERROR_PROTOCOL_TIMEOUT),
            Self::StorageError(_) | Self::CryptoFailure => Some(ERROR_CRITICAL_SOFTWARE),
            Self::PeerNotSupported | Self::HelloHashMismatch | Self::PeerError(_) => None,
        }
    }

    /// How loudly the host should report this failure.
    pub fn severity(&self) -> Severity {
        match self {
            Self::HelloHashMismatch | Self::CommitMismatch | Self::ConfirmAuthFailed | Self::KeyAgreementFailed => {
                Severity::Alert
            }
            Self::UnsupportedVersion { .. } | Self::PeerNotSupported | Self::PeerError(_) => Severity::Error,
            Self::EqualZid | Self::ProtocolTimeout | Self::StorageError(_) | Self::CryptoFailure => Severity::Error,
        }
    }

    /// Text shown to the user. Authentication failures share one message so the text never
    /// reveals which check failed.
    pub fn description(&self) -> String {
        match self {
            Self::UnsupportedVersion { missing: None } => "peer uses an unsupported ZRTP version".into(),
            Self::UnsupportedVersion { missing: Some(t) } => format!("no common {} algorithm with peer", t.name()),
            Self::PeerNotSupported => "peer does not answer ZRTP Hello".into(),
            Self::CommitMismatch | Self::ConfirmAuthFailed => "authentication of peer messages failed".into(),
            Self::KeyAgreementFailed => "peer sent an invalid public value".into(),
            Self::EqualZid => "peer uses our own ZID".into(),
            Self::HelloHashMismatch => "peer Hello does not match the hash received by signaling".into(),
            Self::ProtocolTimeout => "peer stopped answering during key agreement".into(),
            Self::PeerError(code) => format!("peer reported error 0x{:x}: {}", code, error_code_text(*code)),
            Self::StorageError(kind) => format!("retained secret storage failed: {:?}", kind),
            Self::CryptoFailure => "cryptographic provider failure".into(),
        }
    }
}

/// Severity attached to host notifications.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Alert,
}

/// An error that occurred during the receipt of a given packet.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ReceiveError {
    /// A type of fault that can occur because a remote peer sent us a bad packet.
    /// Such packets are ignored and the session state is left untouched, but a user
    /// might want to log them for debugging or tracing.
    ///
    /// Because an unauthenticated remote peer can force these to occur with specific
    /// contained information, it is recommended in production to either drop these
    /// immediately, or log them safely to a local output stream and then drop them.
    ByzantineFault {
        /// The type of fault that has occurred. Be cautious if you choose to read this
        /// value, as an attacker has control over it.
        error: FaultType,
        /// Some faults are naturally occurring, i.e. they can occur between two well behaved
        /// parties over a lossy, reordering transport such as UDP. This is false for those.
        /// Faults caused by flipped bits or failed authentication are unnatural.
        unnatural: bool,
        /// The file from which this error was generated.
        #[cfg(feature = "debug")]
        file: &'static str,
        /// The line number from which this error was generated. As such this number uniquely
        /// identifies each possible fault.
        #[cfg(feature = "debug")]
        line: u32,
    },
    /// The packet ended the session. The session is now in `State::Failed`.
    Fatal(ZrtpError),
}

impl From<ZrtpError> for ReceiveError {
    fn from(error: ZrtpError) -> Self {
        Self::Fatal(error)
    }
}

macro_rules! fault {
    ($name:expr, $unnatural:expr) => {
        $crate::result::ReceiveError::ByzantineFault {
            #[cfg(feature = "debug")]
            file: file!(),
            #[cfg(feature = "debug")]
            line: line!(),
            error: $name,
            unnatural: $unnatural,
        }
    };
}
pub(crate) use fault;

/// An error returned by a host control operation. None of these change session state.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ControlError {
    /// The operation is not possible in the current state.
    InvalidState,
    /// Go-clear was requested but one of the two endpoints does not allow it.
    GoClearNotAllowed,
    /// A secret of the wrong size was supplied.
    InvalidSecretLength,
    /// The Hello hash received through signaling could not be parsed.
    InvalidHelloHash,
    /// The retained secret store failed.
    StorageError(std::io::ErrorKind),
}

/// Something that happened to a session as a result of a received packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SessionEvent {
    /// The packet was a valid protocol control packet. No action needs to be taken.
    Control,
    /// The handshake completed and media is now protected in both directions.
    Established,
    /// The peer asked to go clear. Media stays protected until the host calls
    /// `SessionControl::confirm_go_clear`.
    GoClearRequested,
    /// The peer acknowledged our go-clear request and media is now fully in the clear.
    Cleared,
}
