use crate::config::{AuthTag, CipherAlgorithm, HashAlgorithm, KeyAgreement};
use crate::packet::{MessageType, Zid};
use crate::result::{FaultType, ZrtpError};
use crate::session::{SecretsMatched, State};

/// ZRTP events that might be interesting to log or aggregate into metrics.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent<'a> {
    MessageSent(MessageType),
    /// `(message_type, retransmission_count)`
    MessageResent(MessageType, u32),
    MessageReceived(MessageType),
    /// A retransmitted request was answered with our cached reply.
    ReplyReplayed(MessageType),
    /// A received packet was dropped without changing the session.
    PacketDropped(FaultType),
    RetransmitTimeout(MessageType),
    SuiteNegotiated {
        hash: HashAlgorithm,
        cipher: CipherAlgorithm,
        auth_tag: AuthTag,
        key_agreement: KeyAgreement,
    },
    /// Both sides sent Commit. `won` is true if we stay initiator.
    CommitContention { won: bool },
    SecretsChecked(&'a Zid, SecretsMatched),
    /// The peer does not hold the retained secret we have cached for it.
    CacheMismatch(&'a Zid),
    StateChanged(State),
    SessionFailed(ZrtpError),
    /// The peer asked to go clear but one of us does not allow it.
    GoClearRefused,
}
