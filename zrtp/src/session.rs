use std::sync::{Mutex, MutexGuard, PoisonError};

use rand_core::RngCore;
use zeroize::Zeroizing;

use crate::application::*;
use crate::context::{log, Context};
use crate::crypto::*;
use crate::packet::*;
use crate::proto::*;
use crate::result::{fault, ControlError, FaultType, ReceiveError, SessionEvent, Severity, ZrtpError};
use crate::retained::{CachedSecret, RetainedSecret, SecretKind};
use crate::sas::render_b32;
use crate::suite::*;
#[cfg(feature = "logging")]
use crate::LogEvent::*;

/// The externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Not started, torn down, or back from a completed go-clear.
    Idle,
    /// Our Hello is out and we are waiting for the peer's Hello and HelloACK.
    DiscoverySent,
    /// We sent Commit and wait for DHPart1.
    Committed,
    /// Our DHPart1 or DHPart2 is out.
    KeyAgreeSent,
    /// Our Confirm1 or Confirm2 is out.
    Confirmed,
    /// Media is protected in both directions.
    SecureOn,
    /// One side asked to go clear and the other has not completed the transition yet.
    GoClearRequested,
    /// The session ended with an error. This state is terminal.
    Failed,
}

/// Which retained secrets of ours the peer also held in the last key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SecretsMatched {
    pub rs1: bool,
    pub rs2: bool,
    pub aux: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Discovery,
    CommitSent,
    /// Responder, DHPart1 sent.
    WaitDhPart2,
    /// Initiator, DHPart2 sent.
    WaitConfirm1,
    /// Responder, Confirm1 sent.
    WaitConfirm2,
    /// Initiator, Confirm2 sent.
    WaitConf2Ack,
    Secure,
    GoClearSent,
    GoClearReceived,
    Failed,
}

impl Phase {
    fn public(self) -> State {
        match self {
            Phase::Idle => State::Idle,
            Phase::Discovery => State::DiscoverySent,
            Phase::CommitSent => State::Committed,
            Phase::WaitDhPart2 | Phase::WaitConfirm1 => State::KeyAgreeSent,
            Phase::WaitConfirm2 | Phase::WaitConf2Ack => State::Confirmed,
            Phase::Secure => State::SecureOn,
            Phase::GoClearSent | Phase::GoClearReceived => State::GoClearRequested,
            Phase::Failed => State::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    T1,
    T2,
}

/// A message we keep resending until it is answered.
struct Retransmit {
    timer: Timer,
    message_type: MessageType,
    message: Vec<u8>,
    next_at: i64,
    interval: u64,
    retries: u32,
}

/// H0 is secret until our Confirm reveals it. H1 through H3 are revealed one message at a time.
struct HashChain {
    h0: Zeroizing<[u8; HASH_IMAGE_SIZE]>,
    h1: [u8; HASH_IMAGE_SIZE],
    h2: [u8; HASH_IMAGE_SIZE],
    h3: [u8; HASH_IMAGE_SIZE],
}

/// A decoded message along with its exact encoding, which is what MACs and hashes cover.
struct Exchanged<M> {
    message: M,
    raw: Vec<u8>,
}

impl<M> Exchanged<M> {
    fn new(message: M, raw: &[u8]) -> Self {
        Self { message, raw: raw.to_vec() }
    }
}

struct SessionState<C: CryptoLayer> {
    phase: Phase,
    role: Option<Role>,
    sequence: u16,
    chain: Option<HashChain>,
    own_hello: Option<Vec<u8>>,
    hello_acked: bool,
    peer_hello: Option<Exchanged<Hello>>,
    expected_peer_hello_hash: Option<[u8; SHA256_HASH_SIZE]>,
    suite: Option<Suite>,
    dh: Option<DhKeyPair<C>>,
    own_commit: Option<Exchanged<Commit>>,
    peer_commit: Option<Exchanged<Commit>>,
    own_dh_part: Option<Vec<u8>>,
    peer_dh_part: Option<Exchanged<DhPart>>,
    keys: Option<KeySchedule>,
    /// What the cache held for the peer when the session started, minus expired secrets.
    cached: RetainedSecret,
    /// Auxiliary secrets set by the host for this session only.
    host_secrets: RetainedSecret,
    matched: SecretsMatched,
    sas: Option<String>,
    sas_verified: bool,
    peer_allows_clear: bool,
    peer_cache_expiration: u32,
    protecting_send: bool,
    protecting_receive: bool,
    secure_announced: bool,
    timer: Option<Retransmit>,
    /// The last request we answered and our answer, for replying to retransmissions.
    last_request: Option<Vec<u8>>,
    last_reply: Option<Vec<u8>>,
}

impl<C: CryptoLayer> SessionState<C> {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            role: None,
            sequence: 0,
            chain: None,
            own_hello: None,
            hello_acked: false,
            peer_hello: None,
            expected_peer_hello_hash: None,
            suite: None,
            dh: None,
            own_commit: None,
            peer_commit: None,
            own_dh_part: None,
            peer_dh_part: None,
            keys: None,
            cached: RetainedSecret::default(),
            host_secrets: RetainedSecret::default(),
            matched: SecretsMatched::default(),
            sas: None,
            sas_verified: false,
            peer_allows_clear: false,
            peer_cache_expiration: 0,
            protecting_send: false,
            protecting_receive: false,
            secure_announced: false,
            timer: None,
            last_request: None,
            last_reply: None,
        }
    }

    /// Drop every key, hash context and message of the current negotiation.
    /// The packet sequence and the host provided secrets survive.
    fn wipe(&mut self, phase: Phase) {
        let sequence = self.sequence;
        let host_secrets = std::mem::take(&mut self.host_secrets);
        let expected_peer_hello_hash = self.expected_peer_hello_hash.take();
        *self = Self::new();
        self.sequence = sequence;
        self.host_secrets = host_secrets;
        self.expected_peer_hello_hash = expected_peer_hello_hash;
        self.phase = phase;
    }

    fn peer_zid(&self) -> Option<Zid> {
        self.peer_hello.as_ref().map(|h| h.message.zid)
    }

    /// Host secrets win over cached ones of the same kind.
    fn aux_secret(&self) -> Option<Zeroizing<Vec<u8>>> {
        let mut merged = RetainedSecret::default();
        for kind in [SecretKind::Sigs, SecretKind::Srtps, SecretKind::Other] {
            if let Some(s) = self.host_secrets.secret(kind).or_else(|| self.cached.secret(kind)) {
                merged.set_secret(kind, s);
            }
        }
        merged.aux_secret()
    }
}

fn role_label(role: Role) -> &'static [u8] {
    match role {
        Role::Initiator => ROLE_INITIATOR,
        Role::Responder => ROLE_RESPONDER,
    }
}

fn other(role: Role) -> Role {
    match role {
        Role::Initiator => Role::Responder,
        Role::Responder => Role::Initiator,
    }
}

fn algorithm_list<A: Copy>(list: &[A], id: impl Fn(&A) -> crate::config::AlgorithmId) -> AlgorithmList {
    list.iter().take(MAX_ALGORITHMS).map(id).collect()
}

fn truncate32(digest: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

fn storage_error(e: std::io::Error) -> ZrtpError {
    ZrtpError::StorageError(e.kind())
}

/// One ZRTP negotiation for one media stream. Corresponds to the protocol state machine of
/// RFC 6189 in DH mode.
///
/// All calls on a session are serialized by an internal lock, so a session may be shared between
/// the thread receiving packets and the thread driving user interaction.
pub struct Session<C: CryptoLayer> {
    ctx: Context<C>,
    /// Source identifier put in the header of every packet we send.
    pub ssrc: u32,
    state: Mutex<SessionState<C>>,
}

impl<C: CryptoLayer> Session<C> {
    pub(crate) fn new(ctx: Context<C>, ssrc: u32) -> Self {
        Self { ctx, ssrc, state: Mutex::new(SessionState::new()) }
    }

    /// A panic inside an application callback can poison the lock. The state it leaves behind
    /// is still consistent enough to be torn down.
    fn lock(&self) -> MutexGuard<'_, SessionState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> State {
        self.lock().phase.public()
    }

    /// Our role, once the key agreement has started.
    pub fn role(&self) -> Option<Role> {
        self.lock().role
    }

    /// The short authentication string, once key agreement is complete.
    pub fn sas(&self) -> Option<String> {
        self.lock().sas.clone()
    }

    /// True if both sides verified the SAS in this or an earlier session with an unbroken chain
    /// of retained secrets.
    pub fn is_sas_verified(&self) -> bool {
        self.lock().sas_verified
    }

    pub fn secrets_matched(&self) -> SecretsMatched {
        self.lock().matched
    }

    pub fn peer_zid(&self) -> Option<Zid> {
        self.lock().peer_zid()
    }

    /// The SRTP crypto suite, once negotiated.
    pub fn cipher_info(&self) -> Option<String> {
        self.lock().suite.map(|s| s.cipher_info())
    }

    /// Lend the SRTP keys to `f`, if key agreement is complete.
    pub fn session_keys<R>(&self, f: impl FnOnce(&SessionKeys) -> R) -> Option<R> {
        self.lock().keys.as_ref().map(|k| f(&k.srtp))
    }

    /// Set the peer's Hello hash as received through signaling (`a=zrtp-hash`). The peer's Hello
    /// must then hash to this value or the session fails with `HelloHashMismatch`.
    ///
    /// Must be called before the peer's Hello arrives.
    pub fn set_peer_hello_hash(&self, hello_hash: &str) -> Result<(), ControlError> {
        let hex_hash = hello_hash.split_whitespace().last().ok_or(ControlError::InvalidHelloHash)?;
        let mut hash = [0u8; SHA256_HASH_SIZE];
        hex::decode_to_slice(hex_hash, &mut hash).map_err(|_| ControlError::InvalidHelloHash)?;
        let mut st = self.lock();
        if st.peer_hello.is_some() || st.phase == Phase::Failed {
            return Err(ControlError::InvalidState);
        }
        st.expected_peer_hello_hash = Some(hash);
        Ok(())
    }

    /// Stop the session, turn media protection off and wipe all key material.
    pub fn teardown<App: ApplicationLayer<C>>(&self, app: &mut App) {
        let mut st = self.lock();
        self.stop_media(app, &mut st);
        *st = SessionState::new();
        log!(app, StateChanged(State::Idle));
    }

    /// Process a received ZRTP packet.
    ///
    /// Malformed, unauthenticated or unexpected packets are dropped with
    /// `ReceiveError::ByzantineFault` and leave the session untouched. Errors that end the session
    /// return `ReceiveError::Fatal`, after the application has been notified.
    pub fn receive<App: ApplicationLayer<C>>(&self, app: &mut App, packet: &[u8]) -> Result<SessionEvent, ReceiveError> {
        let (header, raw) = decode_packet(packet).map_err(|e| fault!(FaultType::MalformedPacket(e), true))?;
        let message = Message::decode(raw).map_err(|e| fault!(FaultType::MalformedPacket(e), true))?;
        let mut st = self.lock();
        log!(app, MessageReceived(message.message_type()));

        let result = self.process(app, &mut st, header, message, raw);
        match result {
            Err(ReceiveError::Fatal(error)) => {
                self.fail(app, &mut st, error);
                Err(ReceiveError::Fatal(error))
            }
            #[cfg(feature = "logging")]
            Err(ReceiveError::ByzantineFault { error, .. }) => {
                log!(app, PacketDropped(error));
                result
            }
            _ => result,
        }
    }

    fn process<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        header: PacketHeader,
        message: Message,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        if let Message::Ping(ping) = &message {
            let ack = Message::PingAck(PingAck {
                version: ZRTP_VERSION,
                endpoint_hash: self.endpoint_hash(),
                received_endpoint_hash: ping.endpoint_hash,
                received_ssrc: header.ssrc,
            });
            self.send_message(app, st, &ack);
            return Ok(SessionEvent::Control);
        }
        if matches!(st.phase, Phase::Idle | Phase::Failed) {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        if st.last_request.as_deref() == Some(raw) {
            if let Some(reply) = st.last_reply.clone() {
                log!(app, ReplyReplayed(message.message_type()));
                self.send(app, st, &reply);
            }
            return Ok(SessionEvent::Control);
        }
        match message {
            Message::Hello(hello) => self.on_hello(app, st, hello, raw),
            Message::HelloAck => self.on_hello_ack(app, st),
            Message::Commit(commit) => self.on_commit(app, st, commit, raw),
            Message::DhPart1(part) => self.on_dh_part1(app, st, part, raw),
            Message::DhPart2(part) => self.on_dh_part2(app, st, part, raw),
            Message::Confirm1(confirm) => self.on_confirm1(app, st, confirm),
            Message::Confirm2(confirm) => self.on_confirm2(app, st, confirm, raw),
            Message::Conf2Ack => self.on_conf2_ack(app, st),
            Message::Error(code) => self.on_error(app, st, code, raw),
            Message::GoClear(mac) => self.on_go_clear(app, st, mac, raw),
            Message::ClearAck => self.on_clear_ack(app, st),
            Message::ErrorAck | Message::PingAck(_) | Message::Ping(_) => Ok(SessionEvent::Control),
        }
    }

    /// Drive retransmissions. Returns the number of milliseconds until this should be called
    /// again, or `i64::MAX` if nothing is pending.
    ///
    /// Retransmission attempts will be no more often than the T1 and T2 timers, but may end up
    /// being slightly later based on the rate of calls to `service`.
    pub fn service<App: ApplicationLayer<C>>(&self, app: &mut App) -> i64 {
        let mut st = self.lock();
        let now = app.time();
        let Some(timer) = st.timer.as_mut() else {
            return i64::MAX;
        };
        if now < timer.next_at {
            return timer.next_at - now;
        }
        let (max_retries, cap) = match timer.timer {
            Timer::T1 => (C::SETTINGS.t1_max_retries, C::SETTINGS.t1_cap),
            Timer::T2 => (C::SETTINGS.t2_max_retries, C::SETTINGS.t2_cap),
        };
        if timer.retries >= max_retries {
            log!(app, RetransmitTimeout(timer.message_type));
            let error = match timer.timer {
                Timer::T1 => ZrtpError::PeerNotSupported,
                Timer::T2 => ZrtpError::ProtocolTimeout,
            };
            self.fail(app, &mut st, error);
            return i64::MAX;
        }
        timer.retries += 1;
        timer.interval = (timer.interval * 2).min(cap);
        timer.next_at = now + timer.interval as i64;
        log!(app, MessageResent(timer.message_type, timer.retries));
        let (message, interval) = (timer.message.clone(), timer.interval as i64);
        self.send(app, &mut st, &message);
        interval
    }

    fn endpoint_hash(&self) -> [u8; ENDPOINT_HASH_SIZE] {
        let mut out = [0u8; ENDPOINT_HASH_SIZE];
        out.copy_from_slice(&sha256::<C>(&[&self.ctx.0.zid])[..ENDPOINT_HASH_SIZE]);
        out
    }

    fn send<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, message: &[u8]) {
        let packet = encode_packet(PacketHeader { sequence: st.sequence, ssrc: self.ssrc }, message);
        st.sequence = st.sequence.wrapping_add(1);
        app.send_packet(&packet);
    }

    fn send_message<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, message: &Message) -> Vec<u8> {
        let raw = message.encode();
        log!(app, MessageSent(message.message_type()));
        self.send(app, st, &raw);
        raw
    }

    fn send_reliably<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, timer: Timer, message_type: MessageType, raw: Vec<u8>) {
        log!(app, MessageSent(message_type));
        self.send(app, st, &raw);
        let interval = match timer {
            Timer::T1 => C::SETTINGS.t1_initial,
            Timer::T2 => C::SETTINGS.t2_initial,
        };
        st.timer = Some(Retransmit { timer, message_type, message: raw, next_at: app.time() + interval as i64, interval, retries: 0 });
    }

    /// Answer a request, remembering the answer in case the request is retransmitted.
    fn reply<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, request: &[u8], reply: Vec<u8>) {
        self.send(app, st, &reply);
        st.last_request = Some(request.to_vec());
        st.last_reply = Some(reply);
    }

    fn set_phase<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, phase: Phase) {
        st.phase = phase;
        log!(app, StateChanged(phase.public()));
    }

    fn protect<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, direction: Direction) {
        if let Some(keys) = st.keys.as_ref() {
            app.protect_media(&keys.srtp, direction);
            match direction {
                Direction::Send => st.protecting_send = true,
                Direction::Receive => st.protecting_receive = true,
            }
        }
    }

    fn unprotect<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, direction: Direction) {
        let flag = match direction {
            Direction::Send => &mut st.protecting_send,
            Direction::Receive => &mut st.protecting_receive,
        };
        if std::mem::replace(flag, false) {
            app.unprotect_media(direction);
        }
    }

    fn stop_media<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) {
        self.unprotect(app, st, Direction::Send);
        self.unprotect(app, st, Direction::Receive);
        if std::mem::replace(&mut st.secure_announced, false) {
            app.secure_off();
        }
    }

    fn fail<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, error: ZrtpError) {
        if let Some(code) = error.error_code() {
            self.send_message(app, st, &Message::Error(code));
        }
        self.stop_media(app, st);
        st.wipe(Phase::Failed);
        log!(app, SessionFailed(error));
        log!(app, StateChanged(State::Failed));
        match error {
            ZrtpError::PeerNotSupported => app.peer_not_supported(),
            _ => app.negotiation_failed(error.severity(), &error.description()),
        }
    }

    fn start_discovery<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) {
        let config = &self.ctx.0.config;
        let mut h0 = Zeroizing::new([0u8; HASH_IMAGE_SIZE]);
        self.ctx.0.rng().fill_bytes(&mut h0[..]);
        let h1 = sha256::<C>(&[&h0[..]]);
        let h2 = sha256::<C>(&[&h1]);
        let h3 = sha256::<C>(&[&h2]);
        let hello = Hello {
            version: ZRTP_VERSION,
            client_id: config.client_id,
            h3,
            zid: self.ctx.0.zid,
            signature_capable: false,
            mitm: false,
            passive: config.passive,
            hashes: algorithm_list(&config.hashes, |a| a.id()),
            ciphers: algorithm_list(&config.ciphers, |a| a.id()),
            auth_tags: algorithm_list(&config.auth_tags, |a| a.id()),
            key_agreements: algorithm_list(&config.key_agreements, |a| a.id()),
            sas_types: algorithm_list(&config.sas_types, |a| a.id()),
            mac: [0; MAC_SIZE],
        };
        let mut raw = Message::Hello(hello).encode();
        let mac = hello_mac::<C>(&h2, mac_covered(&raw));
        set_trailing_mac(&mut raw, &mac);

        st.chain = Some(HashChain { h0, h1, h2, h3 });
        st.own_hello = Some(raw.clone());
        self.set_phase(app, st, Phase::Discovery);
        self.send_reliably(app, st, Timer::T1, MessageType::Hello, raw);
    }

    fn on_hello<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        hello: Hello,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        if let Some(peer) = st.peer_hello.as_ref() {
            if peer.raw == raw {
                // The peer did not get our HelloACK.
                self.send_message(app, st, &Message::HelloAck);
                return Ok(SessionEvent::Control);
            }
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        if st.phase != Phase::Discovery {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        if hello.zid == self.ctx.0.zid {
            return Err(ZrtpError::EqualZid.into());
        }
        if let Some(expected) = st.expected_peer_hello_hash.as_ref() {
            if !secure_eq(&sha256::<C>(&[raw]), expected) {
                return Err(ZrtpError::HelloHashMismatch.into());
            }
        }
        let suite = Suite::negotiate(&self.ctx.0.config, &hello)?;
        log!(
            app,
            SuiteNegotiated {
                hash: suite.hash,
                cipher: suite.cipher,
                auth_tag: suite.auth_tag,
                key_agreement: suite.key_agreement,
            }
        );

        let mut cached = self.ctx.0.store.lookup(&hello.zid).map_err(storage_error)?.unwrap_or_default();
        cached.expire(app.unix_time());
        st.cached = cached;
        st.suite = Some(suite);
        st.peer_hello = Some(Exchanged::new(hello, raw));
        self.send_message(app, st, &Message::HelloAck);
        self.maybe_commit(app, st)?;
        Ok(SessionEvent::Control)
    }

    fn on_hello_ack<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::Discovery || st.hello_acked {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        st.hello_acked = true;
        st.timer = None;
        self.maybe_commit(app, st)?;
        Ok(SessionEvent::Control)
    }

    /// Send Commit once we have the peer's Hello and it has acknowledged ours, unless passive.
    fn maybe_commit<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) -> Result<(), ZrtpError> {
        if st.phase != Phase::Discovery || !st.hello_acked || st.peer_hello.is_none() || self.ctx.0.config.passive {
            return Ok(());
        }
        let suite = st.suite.ok_or(ZrtpError::CryptoFailure)?;
        let dh = DhKeyPair::<C>::generate(suite.key_agreement, &mut self.ctx.0.rng());
        let dh_part2 = self.build_dh_part(st, suite, &dh, Role::Initiator)?;

        let (chain, peer_hello) = match (st.chain.as_ref(), st.peer_hello.as_ref()) {
            (Some(c), Some(h)) => (c, h),
            _ => return Err(ZrtpError::CryptoFailure),
        };
        let hvi = truncate32(&suite.hash::<C>(&[&dh_part2, &peer_hello.raw]));
        let mut commit = Commit {
            h2: chain.h2,
            zid: self.ctx.0.zid,
            hash: suite.hash.id(),
            cipher: suite.cipher.id(),
            auth_tag: suite.auth_tag.id(),
            key_agreement: suite.key_agreement.id(),
            sas: suite.sas.id(),
            hvi,
            mac: [0; MAC_SIZE],
        };
        let mut raw = Message::Commit(commit.clone()).encode();
        commit.mac = suite.mac64::<C>(&chain.h1, &[mac_covered(&raw)]);
        set_trailing_mac(&mut raw, &commit.mac);

        st.dh = Some(dh);
        st.own_dh_part = Some(dh_part2);
        st.own_commit = Some(Exchanged::new(commit, &raw));
        st.role = Some(Role::Initiator);
        self.set_phase(app, st, Phase::CommitSent);
        self.send_reliably(app, st, Timer::T2, MessageType::Commit, raw);
        Ok(())
    }

    /// Build our DHPart1 (as responder) or DHPart2 (as initiator), MACed with H0.
    fn build_dh_part(&self, st: &SessionState<C>, suite: Suite, dh: &DhKeyPair<C>, role: Role) -> Result<Vec<u8>, ZrtpError> {
        let chain = st.chain.as_ref().ok_or(ZrtpError::CryptoFailure)?;
        let label = role_label(role);
        let mut rng = self.ctx.0.rng();
        let mut id = |secret: Option<&[u8]>, data: &[u8]| match secret {
            Some(s) => suite.mac64::<C>(s, &[data]),
            None => {
                let mut random = [0u8; SECRET_ID_SIZE];
                rng.fill_bytes(&mut random);
                random
            }
        };
        let aux = st.aux_secret();
        let part = DhPart {
            h1: chain.h1,
            rs1_id: id(st.cached.rs1.as_ref().map(|s| &s.value[..]), label),
            rs2_id: id(st.cached.rs2.as_ref().map(|s| &s.value[..]), label),
            aux_id: id(aux.as_ref().map(|a| &a[..]), &chain.h3),
            pbx_id: id(None, &[]),
            public_value: dh.public_value(),
            mac: [0; MAC_SIZE],
        };
        let mut raw = match role {
            Role::Responder => Message::DhPart1(part),
            Role::Initiator => Message::DhPart2(part),
        }
        .encode();
        let mac = suite.mac64::<C>(&chain.h0[..], &[mac_covered(&raw)]);
        set_trailing_mac(&mut raw, &mac);
        Ok(raw)
    }

    fn on_commit<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        commit: Commit,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        match st.phase {
            Phase::Discovery => {}
            Phase::CommitSent => {
                let own_hvi = st.own_commit.as_ref().map(|c| c.message.hvi).unwrap_or_default();
                if own_hvi == commit.hvi {
                    return Err(fault!(FaultType::OutOfSequence, true));
                }
                // The lower hvi yields and becomes responder.
                let won = own_hvi > commit.hvi;
                log!(app, CommitContention { won });
                if won {
                    return Ok(SessionEvent::Control);
                }
                st.timer = None;
                st.own_commit = None;
                st.own_dh_part = None;
            }
            _ => return Err(fault!(FaultType::OutOfSequence, false)),
        }
        let Some(peer_hello) = st.peer_hello.as_ref() else {
            // We cannot check the commitment before the Hello arrives. The peer will resend.
            return Err(fault!(FaultType::OutOfSequence, false));
        };
        let zid_ok = commit.zid == peer_hello.message.zid;
        let h3_ok = secure_eq(&sha256::<C>(&[&commit.h2]), &peer_hello.message.h3);
        let mac_ok = secure_eq(&hello_mac::<C>(&commit.h2, mac_covered(&peer_hello.raw)), &peer_hello.message.mac);
        if !(zid_ok & h3_ok & mac_ok) {
            return Err(ZrtpError::CommitMismatch.into());
        }
        let suite = Suite::from_commit(&self.ctx.0.config, &commit)?;

        st.suite = Some(suite);
        st.hello_acked = true;
        st.timer = None;
        st.role = Some(Role::Responder);
        let dh = match st.dh.take() {
            Some(dh) if dh.key_agreement() == suite.key_agreement => dh,
            _ => DhKeyPair::<C>::generate(suite.key_agreement, &mut self.ctx.0.rng()),
        };
        let dh_part1 = self.build_dh_part(st, suite, &dh, Role::Responder)?;
        st.dh = Some(dh);
        st.own_dh_part = Some(dh_part1.clone());
        st.peer_commit = Some(Exchanged::new(commit, raw));
        self.set_phase(app, st, Phase::WaitDhPart2);
        log!(app, MessageSent(MessageType::DhPart1));
        self.reply(app, st, raw, dh_part1);
        Ok(SessionEvent::Control)
    }

    fn on_dh_part1<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        part: DhPart,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::CommitSent {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        let (Some(suite), Some(peer_hello), Some(dh)) = (st.suite, st.peer_hello.as_ref(), st.dh.as_ref()) else {
            return Err(ZrtpError::CryptoFailure.into());
        };
        // H1 reveals H2, which authenticates the responder's Hello.
        let h2 = sha256::<C>(&[&part.h1]);
        let h3_ok = secure_eq(&sha256::<C>(&[&h2]), &peer_hello.message.h3);
        let mac_ok = secure_eq(&hello_mac::<C>(&h2, mac_covered(&peer_hello.raw)), &peer_hello.message.mac);
        if !(h3_ok & mac_ok) {
            return Err(ZrtpError::CommitMismatch.into());
        }
        let dh_result = dh.agree(&part.public_value)?;

        st.timer = None;
        st.peer_dh_part = Some(Exchanged::new(part, raw));
        let total_hash = {
            let (Some(commit), Some(dh_part2)) = (st.own_commit.as_ref(), st.own_dh_part.as_ref()) else {
                return Err(ZrtpError::CryptoFailure.into());
            };
            Self::total_hash(suite, [&peer_hello.raw, &commit.raw, raw, dh_part2])?
        };
        self.derive(app, st, Role::Initiator, &dh_result, &total_hash)?;

        let dh_part2 = st.own_dh_part.clone().unwrap_or_default();
        self.set_phase(app, st, Phase::WaitConfirm1);
        self.send_reliably(app, st, Timer::T2, MessageType::DhPart2, dh_part2);
        Ok(SessionEvent::Control)
    }

    fn on_dh_part2<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        part: DhPart,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::WaitDhPart2 {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        let (Some(suite), Some(commit), Some(own_hello), Some(dh_part1), Some(dh)) =
            (st.suite, st.peer_commit.as_ref(), st.own_hello.as_ref(), st.own_dh_part.as_ref(), st.dh.as_ref())
        else {
            return Err(ZrtpError::CryptoFailure.into());
        };
        // H1 reveals H2 and keys the Commit MAC, and DHPart2 must be what hvi committed to.
        let h2_ok = secure_eq(&sha256::<C>(&[&part.h1]), &commit.message.h2);
        let mac_ok = secure_eq(&suite.mac64::<C>(&part.h1, &[mac_covered(&commit.raw)]), &commit.message.mac);
        let hvi_ok = secure_eq(&truncate32(&suite.hash::<C>(&[raw, own_hello])), &commit.message.hvi);
        if !(h2_ok & mac_ok & hvi_ok) {
            return Err(ZrtpError::CommitMismatch.into());
        }
        let dh_result = dh.agree(&part.public_value)?;
        let total_hash = Self::total_hash(suite, [own_hello, &commit.raw, dh_part1, raw])?;

        st.peer_dh_part = Some(Exchanged::new(part, raw));
        self.derive(app, st, Role::Responder, &dh_result, &total_hash)?;

        let confirm1 = self.build_confirm(st, Role::Responder)?;
        self.set_phase(app, st, Phase::WaitConfirm2);
        log!(app, MessageSent(MessageType::Confirm1));
        self.reply(app, st, raw, confirm1);
        Ok(SessionEvent::Control)
    }

    fn total_hash(suite: Suite, messages: [&[u8]; 4]) -> Result<Digest, ZrtpError> {
        let mut transcript = Transcript::<C>::new(suite.hash);
        for message in messages {
            transcript.update(message).map_err(|_| ZrtpError::CryptoFailure)?;
        }
        let total_hash = transcript.finish().map_err(|_| ZrtpError::CryptoFailure);
        transcript.release();
        total_hash
    }

    /// Match retained secrets against the peer's DHPart, then derive s0 and every key from it.
    fn derive<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        role: Role,
        dh_result: &[u8],
        total_hash: &[u8],
    ) -> Result<(), ZrtpError> {
        let (Some(suite), Some(peer_hello), Some(peer_part)) = (st.suite, st.peer_hello.as_ref(), st.peer_dh_part.as_ref()) else {
            return Err(ZrtpError::CryptoFailure);
        };
        let own_zid = self.ctx.0.zid;
        let peer_zid = peer_hello.message.zid;
        let kdf_context = match role {
            Role::Initiator => KdfContext::new(&own_zid, &peer_zid, total_hash),
            Role::Responder => KdfContext::new(&peer_zid, &own_zid, total_hash),
        };

        // The peer computed its IDs with its own role as the MAC input.
        let peer_label = role_label(other(role));
        let own = [st.cached.rs1.as_ref(), st.cached.rs2.as_ref()];
        let theirs = [&peer_part.message.rs1_id, &peer_part.message.rs2_id];
        let mut matched = SecretsMatched::default();
        let mut s1 = None;
        // Slot pairs are walked as (initiator, responder) so both ends stop on the same secret.
        for (i, r) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let (mine, peer) = match role {
                Role::Initiator => (i, r),
                Role::Responder => (r, i),
            };
            let Some(secret) = own[mine] else { continue };
            let id = suite.mac64::<C>(&secret.value[..], &[peer_label]);
            if secure_eq(&id, theirs[peer]) {
                if mine == 0 {
                    matched.rs1 = true;
                } else {
                    matched.rs2 = true;
                }
                s1 = Some(secret);
                break;
            }
        }
        let aux = st.aux_secret().filter(|aux| {
            let id = suite.mac64::<C>(aux, &[&peer_hello.message.h3]);
            secure_eq(&id, &peer_part.message.aux_id)
        });
        matched.aux = aux.is_some();

        let s0 = suite.s0::<C>(dh_result, &kdf_context, s1.map(|s| &s.value[..]), aux.as_ref().map(|a| &a[..]), None);
        let keys = suite.derive_keys::<C>(&s0, &kdf_context, role);
        log!(app, SecretsChecked(&peer_zid, matched));

        if st.cached.rs1.is_some() && !(matched.rs1 | matched.rs2) {
            log!(app, CacheMismatch(&peer_zid));
            app.show_message(
                Severity::Warning,
                "the peer does not hold the secret cached from an earlier session, verify the SAS",
            );
            st.cached.verified = false;
            self.ctx.0.store.reset_verified(&peer_zid).map_err(storage_error)?;
        }
        st.sas = Some(render_b32(&keys.sas_hash));
        st.keys = Some(keys);
        st.matched = matched;
        Ok(())
    }

    /// Build our Confirm1 (as responder) or Confirm2 (as initiator).
    fn build_confirm(&self, st: &SessionState<C>, role: Role) -> Result<Vec<u8>, ZrtpError> {
        let (Some(suite), Some(keys), Some(chain)) = (st.suite, st.keys.as_ref(), st.chain.as_ref()) else {
            return Err(ZrtpError::CryptoFailure);
        };
        let config = &self.ctx.0.config;
        let body = ConfirmBody {
            h0: *chain.h0,
            enrollment: false,
            sas_verified: st.cached.verified,
            allow_clear: config.allow_clear,
            disclosure: false,
            cache_expiration: config.cache_expiration_secs,
            signature: Vec::new(),
        };
        let mut encrypted = body.encode();
        let mut iv = [0u8; AES_BLOCK_SIZE];
        self.ctx.0.rng().fill_bytes(&mut iv);
        let (mackey, zrtpkey) = keys.keys_of(role);
        suite.confirm_cipher::<C>(zrtpkey, &iv, &mut encrypted, true)?;
        let mac = suite.mac64::<C>(mackey, &[&encrypted]);
        let confirm = Confirm { mac, iv, encrypted };
        Ok(match role {
            Role::Responder => Message::Confirm1(confirm),
            Role::Initiator => Message::Confirm2(confirm),
        }
        .encode())
    }

    /// Authenticate the peer's Confirm. Every check runs whatever the outcome of the others, and
    /// all failures look the same.
    fn verify_confirm(&self, st: &mut SessionState<C>, confirm: &Confirm) -> Result<(), ZrtpError> {
        let (Some(suite), Some(keys), Some(role), Some(peer_part)) = (st.suite, st.keys.as_ref(), st.role, st.peer_dh_part.as_ref()) else {
            return Err(ZrtpError::CryptoFailure);
        };
        let (mackey, zrtpkey) = keys.keys_of(other(role));
        let mac_ok = secure_eq(&suite.mac64::<C>(mackey, &[&confirm.encrypted]), &confirm.mac);
        let mut plaintext = Zeroizing::new(confirm.encrypted.clone());
        suite.confirm_cipher::<C>(zrtpkey, &confirm.iv, &mut plaintext, false)?;
        let body = ConfirmBody::decode(&plaintext);
        let h0 = body.as_ref().map(|b| b.h0).unwrap_or_default();
        // H0 reveals H1 and keys the MAC of the peer's DHPart.
        let h1_ok = secure_eq(&sha256::<C>(&[&h0]), &peer_part.message.h1);
        let dh_mac_ok = secure_eq(&suite.mac64::<C>(&h0, &[mac_covered(&peer_part.raw)]), &peer_part.message.mac);
        match body {
            Ok(body) if mac_ok & h1_ok & dh_mac_ok => {
                st.peer_allows_clear = body.allow_clear;
                st.peer_cache_expiration = body.cache_expiration;
                st.sas_verified = st.cached.verified & body.sas_verified;
                Ok(())
            }
            _ => Err(ZrtpError::ConfirmAuthFailed),
        }
    }

    fn on_confirm1<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, confirm: Confirm) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::WaitConfirm1 {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        self.verify_confirm(st, &confirm)?;
        st.timer = None;
        self.protect(app, st, Direction::Receive);
        let confirm2 = self.build_confirm(st, Role::Initiator)?;
        self.set_phase(app, st, Phase::WaitConf2Ack);
        self.send_reliably(app, st, Timer::T2, MessageType::Confirm2, confirm2);
        Ok(SessionEvent::Control)
    }

    fn on_confirm2<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        confirm: Confirm,
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::WaitConfirm2 {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        self.verify_confirm(st, &confirm)?;
        log!(app, MessageSent(MessageType::Conf2Ack));
        self.reply(app, st, raw, Message::Conf2Ack.encode());
        self.protect(app, st, Direction::Receive);
        self.protect(app, st, Direction::Send);
        self.go_secure(app, st)?;
        Ok(SessionEvent::Established)
    }

    fn on_conf2_ack<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::WaitConf2Ack {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        st.timer = None;
        self.protect(app, st, Direction::Send);
        self.go_secure(app, st)?;
        Ok(SessionEvent::Established)
    }

    /// Rotate the retained secrets of the peer and tell the application media is secure.
    fn go_secure<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) -> Result<(), ZrtpError> {
        let (Some(suite), Some(keys), Some(peer_zid)) = (st.suite, st.keys.as_ref(), st.peer_zid()) else {
            return Err(ZrtpError::CryptoFailure);
        };
        let interval = self.ctx.0.config.cache_expiration_secs.min(st.peer_cache_expiration);
        if interval != 0 {
            let mut entry = st.cached.clone();
            for kind in [SecretKind::Sigs, SecretKind::Srtps, SecretKind::Other] {
                if let Some(s) = st.host_secrets.secret(kind) {
                    entry.set_secret(kind, s);
                }
            }
            entry.rotate(CachedSecret::with_interval(keys.new_rs1.clone(), app.unix_time(), interval));
            self.ctx.0.store.store(&peer_zid, &entry).map_err(storage_error)?;
        }
        let sas = st.sas.clone().unwrap_or_default();
        st.secure_announced = true;
        self.set_phase(app, st, Phase::Secure);
        app.secure_on(&suite.cipher_info());
        app.show_sas(&sas, st.sas_verified);
        Ok(())
    }

    fn on_error<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>, code: u32, raw: &[u8]) -> Result<SessionEvent, ReceiveError> {
        log!(app, MessageSent(MessageType::ErrorAck));
        self.reply(app, st, raw, Message::ErrorAck.encode());
        if code == ERROR_GO_CLEAR_NOT_ALLOWED && st.phase == Phase::GoClearSent {
            // The peer refused to go clear, so we stay secure.
            st.timer = None;
            self.protect(app, st, Direction::Send);
            self.set_phase(app, st, Phase::Secure);
            app.show_message(Severity::Warning, "the peer does not allow going clear");
            return Ok(SessionEvent::Control);
        }
        Err(ZrtpError::PeerError(code).into())
    }

    fn go_clear_mac(&self, st: &SessionState<C>, role: Role) -> Option<[u8; MAC_SIZE]> {
        let (suite, keys) = (st.suite?, st.keys.as_ref()?);
        Some(suite.mac64::<C>(keys.keys_of(role).0, &[GO_CLEAR_MAC_INPUT]))
    }

    fn on_go_clear<App: ApplicationLayer<C>>(
        &self,
        app: &mut App,
        st: &mut SessionState<C>,
        mac: [u8; MAC_SIZE],
        raw: &[u8],
    ) -> Result<SessionEvent, ReceiveError> {
        let Some(role) = st.role.filter(|_| st.phase == Phase::Secure) else {
            return Err(fault!(FaultType::OutOfSequence, false));
        };
        let expected = self.go_clear_mac(st, other(role)).ok_or(ZrtpError::CryptoFailure)?;
        if !secure_eq(&expected, &mac) {
            return Err(fault!(FaultType::FailedAuth, true));
        }
        if !(self.ctx.0.config.allow_clear && st.peer_allows_clear) {
            log!(app, GoClearRefused);
            self.send_message(app, st, &Message::Error(ERROR_GO_CLEAR_NOT_ALLOWED));
            app.show_message(Severity::Warning, "the peer asked to go clear, which is not allowed");
            return Ok(SessionEvent::Control);
        }
        log!(app, MessageSent(MessageType::ClearAck));
        self.reply(app, st, raw, Message::ClearAck.encode());
        self.set_phase(app, st, Phase::GoClearReceived);
        app.confirm_go_clear();
        Ok(SessionEvent::GoClearRequested)
    }

    fn on_clear_ack<App: ApplicationLayer<C>>(&self, app: &mut App, st: &mut SessionState<C>) -> Result<SessionEvent, ReceiveError> {
        if st.phase != Phase::GoClearSent {
            return Err(fault!(FaultType::OutOfSequence, false));
        }
        self.stop_media(app, st);
        st.wipe(Phase::Idle);
        log!(app, StateChanged(State::Idle));
        Ok(SessionEvent::Cleared)
    }
}

impl<C: CryptoLayer> SessionControl<C> for Session<C> {
    fn enable_zrtp<App: ApplicationLayer<C>>(&self, app: &mut App, enable: bool) -> Result<(), ControlError> {
        let mut st = self.lock();
        match (st.phase, enable) {
            (Phase::Failed, _) => Err(ControlError::InvalidState),
            (Phase::Idle, true) => {
                self.start_discovery(app, &mut st);
                Ok(())
            }
            (Phase::Idle, false) | (_, true) => Ok(()),
            (_, false) => {
                self.stop_media(app, &mut st);
                st.wipe(Phase::Idle);
                log!(app, StateChanged(State::Idle));
                Ok(())
            }
        }
    }

    fn mark_sas_verified(&self) -> Result<(), ControlError> {
        let mut st = self.lock();
        let peer_zid = st.peer_zid().filter(|_| st.sas.is_some()).ok_or(ControlError::InvalidState)?;
        self.ctx.0.store.mark_verified(&peer_zid).map_err(|e| ControlError::StorageError(e.kind()))?;
        st.cached.verified = true;
        st.sas_verified = true;
        Ok(())
    }

    fn reset_sas_verified(&self) -> Result<(), ControlError> {
        let mut st = self.lock();
        let peer_zid = st.peer_zid().filter(|_| st.sas.is_some()).ok_or(ControlError::InvalidState)?;
        self.ctx.0.store.reset_verified(&peer_zid).map_err(|e| ControlError::StorageError(e.kind()))?;
        st.cached.verified = false;
        st.sas_verified = false;
        Ok(())
    }

    fn confirm_go_clear<App: ApplicationLayer<C>>(&self, app: &mut App) -> Result<(), ControlError> {
        let mut st = self.lock();
        if st.phase != Phase::GoClearReceived {
            return Err(ControlError::InvalidState);
        }
        self.stop_media(app, &mut st);
        st.wipe(Phase::Idle);
        log!(app, StateChanged(State::Idle));
        Ok(())
    }

    fn request_go_clear<App: ApplicationLayer<C>>(&self, app: &mut App) -> Result<(), ControlError> {
        let mut st = self.lock();
        let Some(role) = st.role.filter(|_| st.phase == Phase::Secure) else {
            return Err(ControlError::InvalidState);
        };
        if !(self.ctx.0.config.allow_clear && st.peer_allows_clear) {
            return Err(ControlError::GoClearNotAllowed);
        }
        let mac = self.go_clear_mac(&st, role).ok_or(ControlError::InvalidState)?;
        self.unprotect(app, &mut st, Direction::Send);
        self.set_phase(app, &mut st, Phase::GoClearSent);
        self.send_reliably(app, &mut st, Timer::T2, MessageType::GoClear, Message::GoClear(mac).encode());
        Ok(())
    }

    fn set_retained_secret(&self, kind: SecretKind, secret: &[u8]) -> Result<(), ControlError> {
        if secret.is_empty() || secret.len() > MAX_AUX_SECRET_SIZE {
            return Err(ControlError::InvalidSecretLength);
        }
        let mut st = self.lock();
        if !matches!(st.phase, Phase::Idle | Phase::Discovery) || st.own_dh_part.is_some() {
            return Err(ControlError::InvalidState);
        }
        st.host_secrets.set_secret(kind, secret);
        Ok(())
    }

    fn hello_hash_hex(&self) -> String {
        match self.lock().own_hello.as_ref() {
            Some(hello) => format!("{} {}", String::from_utf8_lossy(&ZRTP_VERSION), hex::encode(sha256::<C>(&[hello]))),
            None => "0".into(),
        }
    }

    fn sas_data_for_signaling(&self) -> String {
        let st = self.lock();
        match (st.sas.as_ref(), st.keys.as_ref()) {
            (Some(sas), Some(keys)) => format!("{} {}", sas, hex::encode(keys.sas_hash)),
            _ => "0".into(),
        }
    }
}
