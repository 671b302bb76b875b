#![allow(dead_code)]

use std::sync::Arc;

use rand_core::OsRng;

use zrtp::application::*;
use zrtp::config::Config;
use zrtp::crypto_impl::DefaultCrypto;
use zrtp::packet::{decode_packet, encode_packet, Message};
use zrtp::result::{ReceiveError, SessionEvent, Severity};
use zrtp::retained::{MemorySecretStore, RetainedSecretStore};
#[cfg(feature = "logging")]
use zrtp::LogEvent;
use zrtp::{Context, Session};

pub struct TestCrypto;
impl DefaultCrypto for TestCrypto {}

/// Everything a session told its application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Protect(Direction, Vec<u8>),
    Unprotect(Direction),
    SecureOn(String),
    SecureOff,
    Sas(String, bool),
    ConfirmGoClear,
    Message(Severity, String),
    Failed(Severity, String),
    PeerNotSupported,
}

/// An application with a fake clock that queues outgoing packets instead of sending them.
#[derive(Default)]
pub struct TestApp {
    pub now: i64,
    pub unix_now: u64,
    pub outbox: Vec<Vec<u8>>,
    pub notices: Vec<Notice>,
    pub contention: Option<bool>,
}

impl<C: CryptoLayer> ApplicationLayer<C> for TestApp {
    fn time(&mut self) -> i64 {
        self.now
    }

    fn unix_time(&mut self) -> u64 {
        self.unix_now
    }

    fn send_packet(&mut self, packet: &[u8]) {
        self.outbox.push(packet.to_vec());
    }

    fn protect_media(&mut self, keys: &SessionKeys, direction: Direction) {
        let key = match direction {
            Direction::Send => keys.send_key().0.to_vec(),
            Direction::Receive => keys.receive_key().0.to_vec(),
        };
        self.notices.push(Notice::Protect(direction, key));
    }

    fn unprotect_media(&mut self, direction: Direction) {
        self.notices.push(Notice::Unprotect(direction));
    }

    fn secure_on(&mut self, cipher_info: &str) {
        self.notices.push(Notice::SecureOn(cipher_info.to_string()));
    }

    fn secure_off(&mut self) {
        self.notices.push(Notice::SecureOff);
    }

    fn show_sas(&mut self, sas: &str, verified: bool) {
        self.notices.push(Notice::Sas(sas.to_string(), verified));
    }

    fn confirm_go_clear(&mut self) {
        self.notices.push(Notice::ConfirmGoClear);
    }

    fn show_message(&mut self, severity: Severity, text: &str) {
        self.notices.push(Notice::Message(severity, text.to_string()));
    }

    fn negotiation_failed(&mut self, severity: Severity, text: &str) {
        self.notices.push(Notice::Failed(severity, text.to_string()));
    }

    fn peer_not_supported(&mut self) {
        self.notices.push(Notice::PeerNotSupported);
    }

    #[cfg(feature = "logging")]
    fn event_log(&mut self, event: LogEvent<'_>) {
        if let LogEvent::CommitContention { won } = event {
            self.contention = Some(won);
        }
    }
}

impl TestApp {
    pub fn has(&self, notice: &Notice) -> bool {
        self.notices.contains(notice)
    }

    pub fn failure(&self) -> Option<&Notice> {
        self.notices.iter().find(|n| matches!(n, Notice::Failed(..) | Notice::PeerNotSupported))
    }

    pub fn sas_shown(&self) -> Option<(String, bool)> {
        self.notices.iter().rev().find_map(|n| match n {
            Notice::Sas(sas, verified) => Some((sas.clone(), *verified)),
            _ => None,
        })
    }
}

pub struct Endpoint {
    pub ctx: Context<TestCrypto>,
    pub session: Arc<Session<TestCrypto>>,
    pub app: TestApp,
}

impl Endpoint {
    pub fn new(config: Config, store: Arc<dyn RetainedSecretStore>, ssrc: u32) -> Self {
        let ctx = Context::new(config, store, OsRng);
        let session = ctx.new_session(ssrc);
        Self { ctx, session, app: TestApp { unix_now: 1_700_000_000, ..Default::default() } }
    }

    pub fn with_config(config: Config, ssrc: u32) -> Self {
        Self::new(config, Arc::new(MemorySecretStore::with_random_zid(&mut OsRng)), ssrc)
    }

    /// A fresh session of the same context, for a later call with the same peer.
    pub fn next_session(&mut self, ssrc: u32) {
        self.session = self.ctx.new_session(ssrc);
        self.app.outbox.clear();
        self.app.notices.clear();
        self.app.contention = None;
    }

    pub fn enable(&mut self) {
        self.session.enable_zrtp(&mut self.app, true).unwrap();
    }

    pub fn receive(&mut self, packet: &[u8]) -> Result<SessionEvent, ReceiveError> {
        self.session.receive(&mut self.app, packet)
    }
}

pub fn decode(packet: &[u8]) -> Message {
    let (_, message) = decode_packet(packet).unwrap();
    Message::decode(message).unwrap()
}

/// Deliver every queued packet of `from` to `to`. `filter` may drop a message by returning
/// `None` or replace it by returning a different one.
pub fn deliver(
    from: &mut Endpoint,
    to: &mut Endpoint,
    filter: &mut impl FnMut(&Message) -> Option<Option<Message>>,
) -> Vec<Result<SessionEvent, ReceiveError>> {
    let mut results = Vec::new();
    for packet in std::mem::take(&mut from.app.outbox) {
        let (header, raw) = decode_packet(&packet).unwrap();
        let message = Message::decode(raw).unwrap();
        match filter(&message) {
            None => results.push(to.receive(&packet)),
            Some(Some(replacement)) => results.push(to.receive(&encode_packet(header, &replacement.encode()))),
            Some(None) => {}
        }
    }
    results
}

/// Shuttle packets between `a` and `b` until neither has anything left to send.
pub fn pump_filtered(a: &mut Endpoint, b: &mut Endpoint, mut filter: impl FnMut(&Message) -> Option<Option<Message>>) {
    for _ in 0..64 {
        if a.app.outbox.is_empty() && b.app.outbox.is_empty() {
            return;
        }
        deliver(a, b, &mut filter);
        deliver(b, a, &mut filter);
    }
    panic!("endpoints never went quiet");
}

pub fn pump(a: &mut Endpoint, b: &mut Endpoint) {
    pump_filtered(a, b, |_| None)
}

/// Enable both endpoints and run the key agreement to completion.
pub fn handshake(a: &mut Endpoint, b: &mut Endpoint) {
    a.enable();
    b.enable();
    pump(a, b);
}
