use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

use crate::crypto::*;

/// AES-128 block encryption via the aes crate.
pub struct CrateAes128(aes::Aes128);
impl AesEnc<AES_128_KEY_SIZE> for CrateAes128 {
    fn new(key: &[u8; AES_128_KEY_SIZE]) -> Self {
        Self(aes::Aes128::new(GenericArray::from_slice(key)))
    }

    fn encrypt_in_place(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        self.0.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// AES-256 block encryption via the aes crate.
pub struct CrateAes256(aes::Aes256);
impl AesEnc<AES_256_KEY_SIZE> for CrateAes256 {
    fn new(key: &[u8; AES_256_KEY_SIZE]) -> Self {
        Self(aes::Aes256::new(GenericArray::from_slice(key)))
    }

    fn encrypt_in_place(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        self.0.encrypt_block(GenericArray::from_mut_slice(block));
    }
}
