use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rand_core::{OsRng, RngCore};

use zrtp::application::*;
use zrtp::config::Config;
use zrtp::crypto_impl::DefaultCrypto;
use zrtp::result::{ReceiveError, SessionEvent, Severity};
use zrtp::retained::MemorySecretStore;

struct TestCrypto;
impl DefaultCrypto for TestCrypto {}

struct TestApplication {
    time: Instant,
    name: &'static str,
    out: mpsc::SyncSender<Vec<u8>>,
    packet_success_rate: u32,
}

#[allow(unused)]
impl ApplicationLayer<TestCrypto> for TestApplication {
    fn time(&mut self) -> i64 {
        self.time.elapsed().as_millis() as i64
    }

    fn send_packet(&mut self, packet: &[u8]) {
        // Simulate a lossy link.
        if OsRng.next_u32() <= self.packet_success_rate {
            let _ = self.out.try_send(packet.to_vec());
        }
    }

    fn protect_media(&mut self, keys: &SessionKeys, direction: Direction) {
        println!("[{}] protecting {:?} media with {}", self.name, direction, keys.cipher_info());
    }

    fn unprotect_media(&mut self, direction: Direction) {
        println!("[{}] {:?} media in the clear", self.name, direction);
    }

    fn secure_on(&mut self, cipher_info: &str) {
        println!("[{}] secure, {}", self.name, cipher_info);
    }

    fn secure_off(&mut self) {
        println!("[{}] not secure", self.name);
    }

    fn show_sas(&mut self, sas: &str, verified: bool) {
        println!("[{}] SAS {} (verified: {})", self.name, sas, verified);
    }

    fn confirm_go_clear(&mut self) {}

    fn show_message(&mut self, severity: Severity, text: &str) {
        println!("[{}] {:?}: {}", self.name, severity, text);
    }

    fn negotiation_failed(&mut self, severity: Severity, text: &str) {
        println!("[{}] FAILED {:?}: {}", self.name, severity, text);
    }

    fn peer_not_supported(&mut self) {
        println!("[{}] peer does not support ZRTP", self.name);
    }

    fn event_log(&mut self, event: zrtp::LogEvent<'_>) {
        println!(">[{}] {:?}", self.name, event);
    }
}

fn endpoint_main(
    run: &AtomicBool,
    mut app: TestApplication,
    packets_in: mpsc::Receiver<Vec<u8>>,
    config: Config,
    ssrc: u32,
    established: mpsc::Sender<(&'static str, String)>,
) {
    let context = zrtp::Context::<TestCrypto>::new(config, std::sync::Arc::new(MemorySecretStore::with_random_zid(&mut OsRng)), OsRng);
    let session = context.new_session(ssrc);
    session.enable_zrtp(&mut app, true).unwrap();
    let mut next_service = app.time();

    while run.load(Ordering::Relaxed) {
        let wait = (next_service - app.time()).clamp(1, 100) as u64;
        if let Ok(packet) = packets_in.recv_timeout(Duration::from_millis(wait)) {
            match session.receive(&mut app, &packet) {
                Ok(SessionEvent::Established) => {
                    let sas = session.sas().unwrap_or_default();
                    let _ = established.send((app.name, sas));
                }
                Ok(_) => {}
                Err(ReceiveError::ByzantineFault { error, unnatural, .. }) => {
                    println!("[{}] dropped packet: {:?}", app.name, error);
                    assert!(!unnatural);
                }
                Err(ReceiveError::Fatal(e)) => {
                    println!("[{}] ERROR {:?}", app.name, e);
                    return;
                }
            }
        }
        if app.time() >= next_service {
            let delay = session.service(&mut app);
            next_service = app.time().saturating_add(delay);
        }
    }
    session.teardown(&mut app);
}

/// Run a key agreement between two threads over a lossy link. Returns true if both ended up
/// with the same SAS before `timeout`.
fn core(timeout: Duration, packet_success_rate: u32) -> bool {
    let run = &AtomicBool::new(true);
    let (alice_out, bob_in) = mpsc::sync_channel::<Vec<u8>>(256);
    let (bob_out, alice_in) = mpsc::sync_channel::<Vec<u8>>(256);
    let (established_tx, established_rx) = mpsc::channel();

    let alice_app = TestApplication { time: Instant::now(), name: "alice", out: alice_out, packet_success_rate };
    let bob_app = TestApplication { time: Instant::now(), name: "bob", out: bob_out, packet_success_rate };

    thread::scope(|ts| {
        {
            let established = established_tx.clone();
            ts.spawn(move || endpoint_main(run, alice_app, alice_in, Config::default(), 0xa11ce, established));
        }
        ts.spawn(move || endpoint_main(run, bob_app, bob_in, Config::default(), 0xb0b, established_tx));

        let started = Instant::now();
        let mut sas = Vec::new();
        while sas.len() < 2 {
            let remaining = timeout.saturating_sub(started.elapsed());
            match established_rx.recv_timeout(remaining) {
                Ok((name, s)) => {
                    println!("[{}] established after {}ms", name, started.elapsed().as_millis());
                    sas.push(s);
                }
                Err(_) => break,
            }
        }

        run.store(false, Ordering::SeqCst);
        println!("finished");
        sas.len() == 2 && sas[0] == sas[1]
    })
}

fn main() {
    let args = std::env::args();
    let packet_success_rate = if args.len() <= 1 {
        let default_success_rate = 1.0;
        ((u32::MAX as f64) * default_success_rate) as u32
    } else {
        ((u32::MAX as f64) * f64::from_str(args.last().unwrap().as_str()).unwrap()) as u32
    };

    assert!(core(Duration::from_secs(60), packet_success_rate));
}

#[test]
fn test_main() {
    assert!(core(Duration::from_secs(30), ((u32::MAX as f64) * 0.8) as u32));
}
