use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::crypto::*;

/// Split a SEC1 uncompressed point into the ZRTP `x || y` public value.
fn strip_sec1_prefix<const PV: usize>(encoded: &[u8]) -> [u8; PV] {
    let mut out = [0u8; PV];
    // Uncompressed SEC1 is a single 0x04 tag byte followed by x and y.
    out.copy_from_slice(&encoded[1..]);
    out
}

/// Build a SEC1 uncompressed point out of a ZRTP public value, rejecting the all-zero value
/// outright. Off-curve points are rejected later by the curve crate.
fn to_sec1(peer_value: &[u8]) -> Option<Vec<u8>> {
    if peer_value.iter().all(|b| *b == 0) {
        return None;
    }
    let mut sec1 = Vec::with_capacity(peer_value.len() + 1);
    sec1.push(0x04);
    sec1.extend_from_slice(peer_value);
    Some(sec1)
}

/// A P-256 (EC25) ephemeral key pair backed by the `p256` crate.
pub struct CrateP256KeyPair {
    secret: p256::ecdh::EphemeralSecret,
    public: [u8; P256_PUBLIC_VALUE_SIZE],
}

impl<Rng: RngCore + CryptoRng> EcdhKeyPair<Rng, P256_PUBLIC_VALUE_SIZE, P256_SHARED_SECRET_SIZE> for CrateP256KeyPair {
    fn generate(rng: &mut Rng) -> Self {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let secret = p256::ecdh::EphemeralSecret::random(rng);
        let public = strip_sec1_prefix(secret.public_key().to_encoded_point(false).as_bytes());
        Self { secret, public }
    }

    fn public_value(&self) -> [u8; P256_PUBLIC_VALUE_SIZE] {
        self.public
    }

    fn agree(&self, peer_value: &[u8; P256_PUBLIC_VALUE_SIZE]) -> Option<Zeroizing<[u8; P256_SHARED_SECRET_SIZE]>> {
        let peer = p256::PublicKey::from_sec1_bytes(&to_sec1(peer_value)?).ok()?;
        let shared = self.secret.diffie_hellman(&peer);
        let mut out = Zeroizing::new([0u8; P256_SHARED_SECRET_SIZE]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Some(out)
    }
}

/// A P-384 (EC38) ephemeral key pair backed by the `p384` crate.
pub struct CrateP384KeyPair {
    secret: p384::ecdh::EphemeralSecret,
    public: [u8; P384_PUBLIC_VALUE_SIZE],
}

impl<Rng: RngCore + CryptoRng> EcdhKeyPair<Rng, P384_PUBLIC_VALUE_SIZE, P384_SHARED_SECRET_SIZE> for CrateP384KeyPair {
    fn generate(rng: &mut Rng) -> Self {
        use p384::elliptic_curve::sec1::ToEncodedPoint;
        let secret = p384::ecdh::EphemeralSecret::random(rng);
        let public = strip_sec1_prefix(secret.public_key().to_encoded_point(false).as_bytes());
        Self { secret, public }
    }

    fn public_value(&self) -> [u8; P384_PUBLIC_VALUE_SIZE] {
        self.public
    }

    fn agree(&self, peer_value: &[u8; P384_PUBLIC_VALUE_SIZE]) -> Option<Zeroizing<[u8; P384_SHARED_SECRET_SIZE]>> {
        let peer = p384::PublicKey::from_sec1_bytes(&to_sec1(peer_value)?).ok()?;
        let shared = self.secret.diffie_hellman(&peer);
        let mut out = Zeroizing::new([0u8; P384_SHARED_SECRET_SIZE]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Some(out)
    }
}
