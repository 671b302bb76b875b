use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::CryptoLayer;
use crate::config::Config;
use crate::packet::Zid;
use crate::retained::RetainedSecretStore;
use crate::session::Session;

/// Macro to turn off logging at compile time.
macro_rules! log {
    ($app:expr, $event:expr) => {
        #[cfg(feature = "logging")]
        $app.event_log($event);
    };
}
pub(crate) use log;

/// Endpoint context for the local application.
///
/// Each application using ZRTP must create an instance of this to hold its configuration, its
/// ZID and its retained secret cache, and to create sessions.
///
/// Internally this is just a clonable Arc, so it can be safely shared with multiple threads.
pub struct Context<C: CryptoLayer>(pub Arc<ContextInner<C>>);
impl<C: CryptoLayer> Clone for Context<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// The internal memory of the ZRTP context.
/// One of these is allocated as an `Arc` by `Context::new`.
pub struct ContextInner<C: CryptoLayer> {
    /// The `CryptoRng` instance that was passed to ZRTP when this context was created.
    pub rng: Mutex<C::Rng>,
    pub config: Config,
    /// The retained secret cache, shared by every session of this context.
    pub store: Arc<dyn RetainedSecretStore>,
    pub(crate) zid: Zid,
}

impl<C: CryptoLayer> ContextInner<C> {
    /// Sessions never leave the rng in an inconsistent state, so a poisoned lock is still usable.
    pub(crate) fn rng(&self) -> MutexGuard<'_, C::Rng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: CryptoLayer> Context<C> {
    /// Create a new endpoint context. Our ZID is the one of `store`.
    pub fn new(config: Config, store: Arc<dyn RetainedSecretStore>, rng: C::Rng) -> Self {
        let zid = store.local_zid();
        Self(Arc::new(ContextInner { rng: Mutex::new(rng), config, store, zid }))
    }

    pub fn zid(&self) -> Zid {
        self.0.zid
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Create an idle session for the media stream whose packets carry `ssrc`.
    /// Call `SessionControl::enable_zrtp` to start it.
    pub fn new_session(&self, ssrc: u32) -> Arc<Session<C>> {
        Arc::new(Session::new(self.clone(), ssrc))
    }
}
