use hmac::digest::consts::{U32, U48};
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use skein::Skein512;

use crate::crypto::*;

/// Skein-512 truncated to 256 bits, via the skein crate.
pub type CrateSkein256 = Skein512<U32>;
impl ZrtpHash<SKEIN256_HASH_SIZE> for CrateSkein256 {
    fn new() -> Self {
        Digest::new()
    }

    fn reset(&mut self) {
        Digest::reset(self)
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data)
    }

    fn finish_and_reset(&mut self, output: &mut [u8; SKEIN256_HASH_SIZE]) {
        output.copy_from_slice(&Digest::finalize_reset(self));
    }
}

/// Skein-512 truncated to 384 bits, via the skein crate.
pub type CrateSkein384 = Skein512<U48>;
impl ZrtpHash<SKEIN384_HASH_SIZE> for CrateSkein384 {
    fn new() -> Self {
        Digest::new()
    }

    fn reset(&mut self) {
        Digest::reset(self)
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data)
    }

    fn finish_and_reset(&mut self, output: &mut [u8; SKEIN384_HASH_SIZE]) {
        output.copy_from_slice(&Digest::finalize_reset(self));
    }
}

/// HMAC over Skein-512-256. Skein buffers its last block lazily, so this goes through
/// `SimpleHmac` rather than `Hmac`.
pub struct CrateSkeinMac256;
impl ZrtpHmac<SKEIN256_HASH_SIZE> for CrateSkeinMac256 {
    fn new() -> Self {
        Self
    }

    fn hash(&mut self, key: &[u8], segments: &[&[u8]], output: &mut [u8; SKEIN256_HASH_SIZE]) {
        let mut mac = SimpleHmac::<CrateSkein256>::new_from_slice(key).unwrap();
        for segment in segments {
            mac.update(segment);
        }
        output.copy_from_slice(&mac.finalize().into_bytes());
    }
}

pub struct CrateSkeinMac384;
impl ZrtpHmac<SKEIN384_HASH_SIZE> for CrateSkeinMac384 {
    fn new() -> Self {
        Self
    }

    fn hash(&mut self, key: &[u8], segments: &[&[u8]], output: &mut [u8; SKEIN384_HASH_SIZE]) {
        let mut mac = SimpleHmac::<CrateSkein384>::new_from_slice(key).unwrap();
        for segment in segments {
            mac.update(segment);
        }
        output.copy_from_slice(&mac.finalize().into_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skein_known_answer() {
        // Skein-512-256 of the empty message.
        let out = <CrateSkein256 as ZrtpHash<32>>::hash([&b""[..]]);
        assert_eq!(hex::encode(out), "39ccc4554a8b31853b9de7a1fe638a24cce6b35a55f2431009e18780335d2621");
    }

    #[test]
    fn incremental_skein_matches_one_shot() {
        let mut h = <CrateSkein384 as ZrtpHash<48>>::new();
        <CrateSkein384 as ZrtpHash<48>>::update(&mut h, b"Hello");
        <CrateSkein384 as ZrtpHash<48>>::update(&mut h, b"Commit");
        let mut split = [0u8; 48];
        h.finish_and_reset(&mut split);
        assert_eq!(split, <CrateSkein384 as ZrtpHash<48>>::hash([&b"HelloCommit"[..]]));

        // finish_and_reset leaves a fresh instance behind.
        <CrateSkein384 as ZrtpHash<48>>::update(&mut h, b"HelloCommit");
        let mut again = [0u8; 48];
        h.finish_and_reset(&mut again);
        assert_eq!(split, again);
    }

    #[test]
    fn skein_mac_depends_on_key() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut split = [0u8; 32];
        CrateSkeinMac256.hash(b"key one", &[b"GoClear "], &mut a);
        CrateSkeinMac256.hash(b"key two", &[b"GoClear "], &mut b);
        CrateSkeinMac256.hash(b"key one", &[b"GoCl", b"ear "], &mut split);
        assert_ne!(a, b);
        assert_eq!(a, split);
        assert_ne!(a, <CrateSkein256 as ZrtpHash<32>>::hash([&b"GoClear "[..]]));
    }
}
