#![cfg(feature = "default-crypto")]

mod common;

use std::sync::Arc;

use rand_core::OsRng;

use common::*;
use zrtp::application::*;
use zrtp::config::Config;
use zrtp::result::Severity;
use zrtp::retained::*;
use zrtp::{SecretsMatched, State};

struct Pair {
    a: Endpoint,
    b: Endpoint,
    store_a: Arc<MemorySecretStore>,
    store_b: Arc<MemorySecretStore>,
}

fn pair(config_a: Config, config_b: Config) -> Pair {
    let store_a = Arc::new(MemorySecretStore::with_random_zid(&mut OsRng));
    let store_b = Arc::new(MemorySecretStore::with_random_zid(&mut OsRng));
    Pair {
        a: Endpoint::new(config_a, store_a.clone(), 1),
        b: Endpoint::new(Config { passive: true, ..config_b }, store_b.clone(), 2),
        store_a,
        store_b,
    }
}

impl Pair {
    fn call(&mut self, ssrc: u32) {
        self.a.next_session(ssrc);
        self.b.next_session(ssrc + 1);
        handshake(&mut self.a, &mut self.b);
        assert_eq!(self.a.session.state(), State::SecureOn);
        assert_eq!(self.b.session.state(), State::SecureOn);
    }
}

#[test]
fn continuity_across_calls() {
    let mut p = pair(Config::default(), Config::default());
    p.call(10);
    assert_eq!(p.a.session.secrets_matched(), SecretsMatched::default());
    let first = p.store_a.lookup(&p.b.ctx.zid()).unwrap().unwrap();
    assert!(first.rs1.is_some() && first.rs2.is_none());
    assert_eq!(first.rs1, p.store_b.lookup(&p.a.ctx.zid()).unwrap().unwrap().rs1);

    p.a.session.mark_sas_verified().unwrap();
    p.b.session.mark_sas_verified().unwrap();
    assert!(p.store_a.lookup(&p.b.ctx.zid()).unwrap().unwrap().verified);

    p.call(20);
    for e in [&p.a, &p.b] {
        assert_eq!(e.session.secrets_matched(), SecretsMatched { rs1: true, rs2: false, aux: false });
        assert!(e.session.is_sas_verified());
        assert_eq!(e.app.sas_shown().map(|(_, verified)| verified), Some(true));
    }
    let second = p.store_a.lookup(&p.b.ctx.zid()).unwrap().unwrap();
    assert_eq!(second.rs2, first.rs1);
    assert_ne!(second.rs1, first.rs1);
    assert!(second.verified);
}

#[test]
fn one_side_forgetting_breaks_continuity() {
    let mut p = pair(Config::default(), Config::default());
    p.call(10);
    p.a.session.mark_sas_verified().unwrap();
    p.b.session.mark_sas_verified().unwrap();

    // The initiator lost its cache but kept its ZID.
    let zid_a = p.a.ctx.zid();
    p.a = Endpoint::new(Config::default(), Arc::new(MemorySecretStore::new(zid_a)), 1);
    p.call(20);

    assert_eq!(p.b.session.secrets_matched(), SecretsMatched::default());
    assert!(!p.b.session.is_sas_verified());
    assert!(p.b.app.notices.iter().any(|n| matches!(n, Notice::Message(Severity::Warning, _))));
    assert!(!p.a.app.notices.iter().any(|n| matches!(n, Notice::Message(..))));
    assert!(!p.store_b.lookup(&zid_a).unwrap().unwrap().verified);
}

#[test]
fn crossed_secrets_pick_the_same_s1_on_both_ends() {
    let mut p = pair(Config::default(), Config::default());
    p.call(10);
    p.call(20);

    // The responder holds the same two secrets as the initiator, in the opposite slots.
    let zid_a = p.a.ctx.zid();
    let mut entry = p.store_b.lookup(&zid_a).unwrap().unwrap();
    assert!(entry.rs1.is_some() && entry.rs2.is_some());
    std::mem::swap(&mut entry.rs1, &mut entry.rs2);
    p.store_b.store(&zid_a, &entry).unwrap();

    p.call(30);
    assert_eq!(p.a.session.secrets_matched(), SecretsMatched { rs1: true, rs2: false, aux: false });
    assert_eq!(p.b.session.secrets_matched(), SecretsMatched { rs1: false, rs2: true, aux: false });
    assert_eq!(p.a.session.sas(), p.b.session.sas());
    assert!(!p.a.app.notices.iter().any(|n| matches!(n, Notice::Message(..))));
    assert!(!p.b.app.notices.iter().any(|n| matches!(n, Notice::Message(..))));
}

#[test]
fn expired_secrets_are_ignored() {
    let config = Config { cache_expiration_secs: 3600, ..Config::default() };
    let mut p = pair(config, Config::default());
    p.call(10);
    let rs1 = p.store_b.lookup(&p.a.ctx.zid()).unwrap().unwrap().rs1.unwrap();
    // The shorter of the two intervals applies to both sides.
    assert_eq!(rs1.expires_at, p.b.app.unix_now + 3600);

    p.a.app.unix_now += 7200;
    p.b.app.unix_now += 7200;
    p.call(20);
    assert_eq!(p.a.session.secrets_matched(), SecretsMatched::default());
    // An expired secret is a cache miss, not a mismatch.
    assert!(!p.a.app.notices.iter().any(|n| matches!(n, Notice::Message(..))));
    assert!(!p.b.app.notices.iter().any(|n| matches!(n, Notice::Message(..))));
}

#[test]
fn zero_expiration_stores_nothing() {
    let config = Config { cache_expiration_secs: 0, ..Config::default() };
    let mut p = pair(Config::default(), config);
    p.call(10);
    assert_eq!(p.store_a.lookup(&p.b.ctx.zid()).unwrap(), None);
    assert_eq!(p.store_b.lookup(&p.a.ctx.zid()).unwrap(), None);
}

#[test]
fn auxiliary_secret_is_mixed_in_when_shared() {
    let mut p = pair(Config::default(), Config::default());
    p.a.next_session(10);
    p.b.next_session(11);
    p.a.session.set_retained_secret(SecretKind::Srtps, b"sdes master key").unwrap();
    p.b.session.set_retained_secret(SecretKind::Srtps, b"sdes master key").unwrap();
    handshake(&mut p.a, &mut p.b);
    assert_eq!(p.a.session.state(), State::SecureOn);
    assert!(p.a.session.secrets_matched().aux);
    assert!(p.b.session.secrets_matched().aux);
    let cached = p.store_a.lookup(&p.b.ctx.zid()).unwrap().unwrap();
    assert_eq!(cached.secret(SecretKind::Srtps), Some(&b"sdes master key"[..]));

    p.a.next_session(20);
    p.b.next_session(21);
    p.b.session.set_retained_secret(SecretKind::Srtps, b"another key").unwrap();
    handshake(&mut p.a, &mut p.b);
    assert_eq!(p.a.session.state(), State::SecureOn);
    assert_eq!(p.a.session.secrets_matched(), SecretsMatched { rs1: true, rs2: false, aux: false });
    assert_eq!(p.a.session.sas(), p.b.session.sas());
}

#[cfg(feature = "file-cache")]
#[test]
fn file_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (path_a, path_b) = (dir.path().join("a.json"), dir.path().join("b.json"));
    let open = |path: &std::path::Path| open_cache(CacheType::FileCache, path, &mut OsRng).unwrap();

    let mut a = Endpoint::new(Config::default(), open(&path_a), 1);
    let mut b = Endpoint::new(Config::default(), open(&path_b), 2);
    let zid_a = a.ctx.zid();
    handshake(&mut a, &mut b);
    assert_eq!(a.session.state(), State::SecureOn);
    a.session.mark_sas_verified().unwrap();
    b.session.mark_sas_verified().unwrap();
    drop((a, b));

    let mut a = Endpoint::new(Config::default(), open(&path_a), 3);
    let mut b = Endpoint::new(Config::default(), open(&path_b), 4);
    assert_eq!(a.ctx.zid(), zid_a);
    handshake(&mut a, &mut b);
    assert!(a.session.secrets_matched().rs1);
    assert!(a.session.is_sas_verified());
    assert!(b.session.is_sas_verified());
}
