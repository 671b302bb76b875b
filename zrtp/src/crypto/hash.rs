/// The size of a SHA-256 hash, which is always 32 bytes.
pub const SHA256_HASH_SIZE: usize = 32;
/// The size of a SHA-384 hash, which is always 48 bytes.
pub const SHA384_HASH_SIZE: usize = 48;
/// The size of a Skein-512-256 hash.
pub const SKEIN256_HASH_SIZE: usize = 32;
/// The size of a Skein-512-384 hash.
pub const SKEIN384_HASH_SIZE: usize = 48;

/// An incremental hash function producing an `N` byte digest.
/// Its interface was designed to make streaming several ZRTP messages into one hash cheap.
/// Does not need to be threadsafe.
pub trait ZrtpHash<const N: usize>: Sized {
    /// Create a new instance of the hash for streaming data to.
    fn new() -> Self;
    /// Discard all input streamed so far, returning the instance to its freshly created state.
    fn reset(&mut self);
    /// Update the instance with input `data`.
    /// This must update the state of the hash as if `data` was appended to the previous input.
    fn update(&mut self, data: &[u8]);
    /// Update the instance with every span of `segments`, in order.
    fn update_all<'a, I: IntoIterator<Item = &'a [u8]>>(&mut self, segments: I) {
        for segment in segments {
            self.update(segment);
        }
    }
    /// Finish streaming input and output the final hash.
    /// The hash must be written to `output`.
    ///
    /// This instance should be reset so that a new, independent hash can be generated.
    fn finish_and_reset(&mut self, output: &mut [u8; N]);

    /// Hash the concatenation of `segments` in one call.
    fn hash<'a, I: IntoIterator<Item = &'a [u8]>>(segments: I) -> [u8; N] {
        let mut h = Self::new();
        h.update_all(segments);
        let mut output = [0u8; N];
        h.finish_and_reset(&mut output);
        output
    }
}

/// An HMAC implementation producing an `N` byte tag.
/// Does not need to be threadsafe.
pub trait ZrtpHmac<const N: usize> {
    /// Allocate space on the stack or heap for repeated Hmac invocations.
    ///
    /// If the library being wrapped does not need a context, this can return an empty type.
    fn new() -> Self;
    /// Pure function computing the HMAC of the concatenation of `segments` under `key`.
    /// Repeat invocations of this function should have no effect on each other.
    fn hash(&mut self, key: &[u8], segments: &[&[u8]], output: &mut [u8; N]);
}

/// An error returned when a hash context is used outside of its lifecycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ContextError {
    /// The context was finalized and has not been reset since.
    Finalized,
    /// The context was released and can no longer be used.
    Released,
}

/// A hash context with an explicit lifecycle: create, zero or more updates, finish, then either
/// `reset` for reuse or `release`.
///
/// Every entry point rejects a finalized or released context.
pub struct HashContext<H: ZrtpHash<N>, const N: usize> {
    inner: Option<H>,
    finalized: bool,
}

impl<H: ZrtpHash<N>, const N: usize> HashContext<H, N> {
    pub fn new() -> Self {
        Self { inner: Some(H::new()), finalized: false }
    }

    /// Re-initialize the context. This is required before a finalized context can be reused.
    pub fn reset(&mut self) -> Result<(), ContextError> {
        let h = self.inner.as_mut().ok_or(ContextError::Released)?;
        h.reset();
        self.finalized = false;
        Ok(())
    }

    pub fn update(&mut self, data: &[u8]) -> Result<(), ContextError> {
        self.live()?.update(data);
        Ok(())
    }

    pub fn update_all<'a, I: IntoIterator<Item = &'a [u8]>>(&mut self, segments: I) -> Result<(), ContextError> {
        self.live()?.update_all(segments);
        Ok(())
    }

    pub fn finish(&mut self) -> Result<[u8; N], ContextError> {
        let mut output = [0u8; N];
        self.live()?.finish_and_reset(&mut output);
        self.finalized = true;
        Ok(output)
    }

    /// Release the underlying hash. Any later call on this context fails with `Released`.
    pub fn release(&mut self) {
        self.inner = None;
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn live(&mut self) -> Result<&mut H, ContextError> {
        match self.inner.as_mut() {
            None => Err(ContextError::Released),
            Some(_) if self.finalized => Err(ContextError::Finalized),
            Some(h) => Ok(h),
        }
    }
}

impl<H: ZrtpHash<N>, const N: usize> Default for HashContext<H, N> {
    fn default() -> Self {
        Self::new()
    }
}
