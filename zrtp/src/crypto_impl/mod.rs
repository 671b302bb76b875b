/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
#[cfg(feature = "p256")]
pub use p256;

#[cfg(feature = "p384")]
pub use p384;

#[cfg(all(feature = "p256", feature = "p384"))]
mod ecdh_impl;
#[cfg(all(feature = "p256", feature = "p384"))]
pub use ecdh_impl::*;

#[cfg(feature = "sha2")]
mod sha2_impl;
#[cfg(feature = "sha2")]
pub use hmac;
#[cfg(feature = "sha2")]
pub use sha2;
#[cfg(feature = "sha2")]
pub use sha2_impl::*;

#[cfg(feature = "skein")]
mod skein_impl;
#[cfg(feature = "skein")]
pub use skein;
#[cfg(feature = "skein")]
pub use skein_impl::*;

#[cfg(feature = "aes")]
mod aes_impl;
#[cfg(feature = "aes")]
pub use aes;
#[cfg(feature = "aes")]
pub use aes_impl::*;

/// Implement this marker trait on a type to get a `CryptoLayer` built entirely out of the
/// RustCrypto crates, with the default `Settings`.
#[cfg(feature = "default-crypto")]
pub trait DefaultCrypto {}
#[cfg(feature = "default-crypto")]
impl<C: DefaultCrypto> crate::application::CryptoLayer for C {
    type Rng = rand_core::OsRng;
    type Sha256 = CrateSha256;
    type Sha384 = CrateSha384;
    type HmacSha256 = CrateHmacSha256;
    type HmacSha384 = CrateHmacSha384;
    type Skein256 = CrateSkein256;
    type Skein384 = CrateSkein384;
    type SkeinMac256 = CrateSkeinMac256;
    type SkeinMac384 = CrateSkeinMac384;
    type Aes128 = CrateAes128;
    type Aes256 = CrateAes256;
    type P256 = CrateP256KeyPair;
    type P384 = CrateP384KeyPair;
}
