/// The specified size of an AES-128 key.
pub const AES_128_KEY_SIZE: usize = 16;
/// The specified size of an AES-256 key.
pub const AES_256_KEY_SIZE: usize = 32;
/// The specified size of an AES block, which is also the size of a CFB initialization vector.
pub const AES_BLOCK_SIZE: usize = 16;

/// A trait for encrypting individual blocks of plaintext using AES with a `KEY` byte key.
///
/// ZRTP only ever runs AES in cipher feedback mode, which needs nothing but the forward
/// direction of the block cipher.
///
/// Instances must securely delete their keys when dropped.
pub trait AesEnc<const KEY: usize>: Sized {
    /// Create a new instance of this trait that uses the given key for encryption.
    fn new(key: &[u8; KEY]) -> Self;

    /// Encrypt the given `block` of plaintext directly using the AES block cipher.
    /// The ciphertext should be written directly back to `block`.
    fn encrypt_in_place(&self, block: &mut [u8; AES_BLOCK_SIZE]);
}

/// Encrypt `data` in place with AES in 128-bit cipher feedback mode (CFB-128).
pub fn cfb_encrypt<const KEY: usize, A: AesEnc<KEY>>(key: &[u8; KEY], iv: &[u8; AES_BLOCK_SIZE], data: &mut [u8]) {
    let cipher = A::new(key);
    let mut register = *iv;
    for chunk in data.chunks_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_in_place(&mut register);
        for (i, b) in chunk.iter_mut().enumerate() {
            *b ^= register[i];
            register[i] = *b;
        }
    }
}

/// Decrypt `data` in place with AES in 128-bit cipher feedback mode (CFB-128).
pub fn cfb_decrypt<const KEY: usize, A: AesEnc<KEY>>(key: &[u8; KEY], iv: &[u8; AES_BLOCK_SIZE], data: &mut [u8]) {
    let cipher = A::new(key);
    let mut register = *iv;
    for chunk in data.chunks_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_in_place(&mut register);
        for (i, b) in chunk.iter_mut().enumerate() {
            let c = *b;
            *b ^= register[i];
            register[i] = c;
        }
    }
}
