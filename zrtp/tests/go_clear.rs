#![cfg(feature = "default-crypto")]

mod common;

use common::*;
use zrtp::application::*;
use zrtp::config::Config;
use zrtp::packet::{encode_packet, Message, PacketHeader};
use zrtp::proto::*;
use zrtp::result::{ControlError, FaultType, ReceiveError, SessionEvent};
use zrtp::State;

fn secure_pair(a_allows: bool, b_allows: bool) -> (Endpoint, Endpoint) {
    let mut a = Endpoint::with_config(Config { allow_clear: a_allows, ..Config::default() }, 1);
    let mut b = Endpoint::with_config(Config { allow_clear: b_allows, passive: true, ..Config::default() }, 2);
    handshake(&mut a, &mut b);
    assert_eq!(a.session.state(), State::SecureOn);
    assert_eq!(b.session.state(), State::SecureOn);
    (a, b)
}

#[test]
fn go_clear_when_both_allow() {
    let (mut a, mut b) = secure_pair(true, true);
    a.session.request_go_clear(&mut a.app).unwrap();
    assert_eq!(a.session.state(), State::GoClearRequested);
    assert!(a.app.has(&Notice::Unprotect(Direction::Send)));
    assert!(!a.app.has(&Notice::Unprotect(Direction::Receive)));

    let results = deliver(&mut a, &mut b, &mut |_| None);
    assert_eq!(results, vec![Ok(SessionEvent::GoClearRequested)]);
    assert_eq!(b.session.state(), State::GoClearRequested);
    assert!(b.app.has(&Notice::ConfirmGoClear));
    // Nothing changes for the peer until its user agrees.
    assert!(!b.app.notices.iter().any(|n| matches!(n, Notice::Unprotect(_))));

    let results = deliver(&mut b, &mut a, &mut |_| None);
    assert_eq!(results, vec![Ok(SessionEvent::Cleared)]);
    assert_eq!(a.session.state(), State::Idle);
    assert!(a.app.has(&Notice::Unprotect(Direction::Receive)));
    assert!(a.app.has(&Notice::SecureOff));
    assert_eq!(a.session.service(&mut a.app), i64::MAX);

    b.session.confirm_go_clear(&mut b.app).unwrap();
    assert_eq!(b.session.state(), State::Idle);
    assert!(b.app.has(&Notice::Unprotect(Direction::Send)));
    assert!(b.app.has(&Notice::Unprotect(Direction::Receive)));
    assert!(b.app.has(&Notice::SecureOff));
    assert_eq!(b.session.sas(), None);
}

#[test]
fn go_clear_needs_both_sides_to_allow_it() {
    let (mut a, mut b) = secure_pair(true, false);
    assert_eq!(a.session.request_go_clear(&mut a.app), Err(ControlError::GoClearNotAllowed));
    assert_eq!(b.session.request_go_clear(&mut b.app), Err(ControlError::GoClearNotAllowed));
    assert_eq!(a.session.state(), State::SecureOn);
    assert!(a.app.outbox.is_empty());
    assert!(!a.app.notices.iter().any(|n| matches!(n, Notice::Unprotect(_))));
}

#[test]
fn forged_go_clear_is_dropped() {
    let (_, mut b) = secure_pair(true, true);
    let forged = encode_packet(PacketHeader { sequence: 100, ssrc: 1 }, &Message::GoClear([0x55; MAC_SIZE]).encode());
    let result = b.receive(&forged);
    assert!(matches!(result, Err(ReceiveError::ByzantineFault { error: FaultType::FailedAuth, unnatural: true, .. })));
    assert_eq!(b.session.state(), State::SecureOn);
    assert!(b.app.outbox.is_empty());
    assert!(!b.app.has(&Notice::ConfirmGoClear));
}

#[test]
fn lost_clear_ack_is_retransmitted() {
    let (mut a, mut b) = secure_pair(true, true);
    a.session.request_go_clear(&mut a.app).unwrap();
    deliver(&mut a, &mut b, &mut |_| None);
    b.app.outbox.clear();

    let wait = a.session.service(&mut a.app);
    a.app.now += wait;
    a.session.service(&mut a.app);
    assert!(matches!(decode(&a.app.outbox[0]), Message::GoClear(_)));
    // The retransmitted GoClear gets the same ClearACK and the peer is not asked twice.
    let results = deliver(&mut a, &mut b, &mut |_| None);
    assert_eq!(results, vec![Ok(SessionEvent::Control)]);
    assert_eq!(b.app.notices.iter().filter(|n| **n == Notice::ConfirmGoClear).count(), 1);
    deliver(&mut b, &mut a, &mut |_| None);
    assert_eq!(a.session.state(), State::Idle);
}
