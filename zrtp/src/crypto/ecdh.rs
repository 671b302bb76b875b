use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// The size in bytes of a P-256 public value in the ZRTP `x || y` encoding.
pub const P256_PUBLIC_VALUE_SIZE: usize = 64;
/// The size in bytes of the raw output of ECDH over P-256.
pub const P256_SHARED_SECRET_SIZE: usize = 32;
/// The size in bytes of a P-384 public value in the ZRTP `x || y` encoding.
pub const P384_PUBLIC_VALUE_SIZE: usize = 96;
/// The size in bytes of the raw output of ECDH over P-384.
pub const P384_SHARED_SECRET_SIZE: usize = 48;

/// An ephemeral elliptic curve Diffie-Hellman key pair.
///
/// `PV` is the size of the public value as it appears in DHPart messages (the affine `x || y`
/// coordinates with no SEC1 prefix), and `SS` the size of the raw shared secret.
///
/// Instances must securely delete the private key when dropped.
pub trait EcdhKeyPair<Rng: RngCore + CryptoRng, const PV: usize, const SS: usize>: Sized {
    /// Randomly generate a new key pair. This key pair must be fully valid.
    ///
    /// This function may use the provided RNG or its own, so long as the output is cryptographically random.
    fn generate(rng: &mut Rng) -> Self;

    /// Get the public value to place in a DHPart message.
    fn public_value(&self) -> [u8; PV];

    /// Perform ECDH key agreement with the peer's public value, returning the raw (un-hashed!)
    /// shared secret.
    ///
    /// **CRITICAL**: This function must return `None` if `peer_value` is not a point on the curve,
    /// is the identity element, or is otherwise not a valid curve point. Accepting such a
    /// value exposes the private key to small subgroup attacks.
    fn agree(&self, peer_value: &[u8; PV]) -> Option<Zeroizing<[u8; SS]>>;
}
