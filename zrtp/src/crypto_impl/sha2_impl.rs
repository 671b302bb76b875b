use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384};

use crate::crypto::*;

/// An alias for the Sha256 type from the sha2 crate.
pub type CrateSha256 = Sha256;
impl ZrtpHash<SHA256_HASH_SIZE> for CrateSha256 {
    fn new() -> Self {
        Digest::new()
    }

    fn reset(&mut self) {
        Digest::reset(self)
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data)
    }

    fn finish_and_reset(&mut self, output: &mut [u8; SHA256_HASH_SIZE]) {
        output.copy_from_slice(&Digest::finalize_reset(self));
    }
}

/// An alias for the Sha384 type from the sha2 crate.
pub type CrateSha384 = Sha384;
impl ZrtpHash<SHA384_HASH_SIZE> for CrateSha384 {
    fn new() -> Self {
        Digest::new()
    }

    fn reset(&mut self) {
        Digest::reset(self)
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data)
    }

    fn finish_and_reset(&mut self, output: &mut [u8; SHA384_HASH_SIZE]) {
        output.copy_from_slice(&Digest::finalize_reset(self));
    }
}

/// HMAC-SHA-256 via the hmac crate.
pub struct CrateHmacSha256;
impl ZrtpHmac<SHA256_HASH_SIZE> for CrateHmacSha256 {
    fn new() -> Self {
        Self
    }

    fn hash(&mut self, key: &[u8], segments: &[&[u8]], output: &mut [u8; SHA256_HASH_SIZE]) {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
        for segment in segments {
            mac.update(segment);
        }
        output.copy_from_slice(&mac.finalize().into_bytes());
    }
}

/// HMAC-SHA-384 via the hmac crate.
pub struct CrateHmacSha384;
impl ZrtpHmac<SHA384_HASH_SIZE> for CrateHmacSha384 {
    fn new() -> Self {
        Self
    }

    fn hash(&mut self, key: &[u8], segments: &[&[u8]], output: &mut [u8; SHA384_HASH_SIZE]) {
        let mut mac = Hmac::<Sha384>::new_from_slice(key).unwrap();
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
    fn incremental_hashing_equivalence() {
        let a = b"ZRTP incremental ";
        let b = b"hashing equivalence";
        let joined = [&a[..], &b[..]].concat();

        let mut h = <CrateSha384 as ZrtpHash<48>>::new();
        <CrateSha384 as ZrtpHash<48>>::update(&mut h, a);
        <CrateSha384 as ZrtpHash<48>>::update(&mut h, b);
        let mut split = [0u8; 48];
        h.finish_and_reset(&mut split);

        let mut whole = [0u8; 48];
        <CrateSha384 as ZrtpHash<48>>::update(&mut h, &joined);
        h.finish_and_reset(&mut whole);
        assert_eq!(split, whole);

        let segmented = <CrateSha384 as ZrtpHash<48>>::hash([&a[..], &b[..]]);
        assert_eq!(segmented, whole);

        let s256_split = <CrateSha256 as ZrtpHash<32>>::hash([&a[..], &b[..]]);
        let s256_whole = <CrateSha256 as ZrtpHash<32>>::hash([&joined[..]]);
        assert_eq!(s256_split, s256_whole);
    }

    #[test]
    fn sha256_known_answer() {
        let out = <CrateSha256 as ZrtpHash<32>>::hash([&b"abc"[..]]);
        assert_eq!(hex::encode(out), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn hash_context_lifecycle() {
        let mut ctx = HashContext::<CrateSha256, 32>::new();
        ctx.update(b"a").unwrap();
        ctx.update_all([&b"b"[..], &b"c"[..]]).unwrap();
        let first = ctx.finish().unwrap();
        assert_eq!(first, <CrateSha256 as ZrtpHash<32>>::hash([&b"abc"[..]]));

        assert_eq!(ctx.update(b"x"), Err(ContextError::Finalized));
        assert_eq!(ctx.finish(), Err(ContextError::Finalized));

        ctx.reset().unwrap();
        ctx.update(b"abc").unwrap();
        assert_eq!(ctx.finish().unwrap(), first);

        ctx.release();
        assert!(ctx.is_released());
        assert_eq!(ctx.update(b"x"), Err(ContextError::Released));
        assert_eq!(ctx.reset(), Err(ContextError::Released));
    }

    #[test]
    fn segmented_hmac_matches_single() {
        let mut single = [0u8; 32];
        let mut split = [0u8; 32];
        CrateHmacSha256.hash(b"key", &[b"GoClear "], &mut single);
        CrateHmacSha256.hash(b"key", &[b"GoCl", b"ear "], &mut split);
        assert_eq!(single, split);
    }
}
