/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c) ZeroTier, Inc.
 * https://www.zerotier.com/
 */
//#![warn(missing_docs, rust_2018_idioms)]
pub mod crypto;
pub mod crypto_impl;

#[cfg(feature = "file-cache")]
mod cache_file;
mod context;
mod log_event;
mod sas;
mod session;
mod suite;

pub mod application;
pub mod config;
pub mod packet;
pub mod proto;
pub mod result;
pub mod retained;

pub use crate::context::*;
pub use crate::log_event::*;
pub use crate::session::{SecretsMatched, Session, State};
