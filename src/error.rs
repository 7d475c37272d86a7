/// Errors that can occur during session and group-session operations.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A different identity was previously trusted for this address.
    ///
    /// Fatal to the call; safe to retry once an operator has re-verified the
    /// peer. No store state is modified before this is raised.
    #[error("untrusted identity for {0}")]
    UntrustedIdentity(String),

    /// The signed pre-key signature in a bundle did not verify.
    #[error("invalid pre-key signature")]
    InvalidSignature,

    /// A cipher was invoked with no stored record and no bootstrap material.
    #[error("no session for {0}")]
    NoSession(String),

    /// No sender-key distribution message was ever processed for this sender.
    ///
    /// This is a missing-state failure, distinct from [`Error::Mac`].
    #[error("no sender key for {0}")]
    NoSenderKey(String),

    /// Authentication of a ciphertext failed (AEAD tag or signature mismatch).
    ///
    /// The stored record is left untouched, so a corrected ciphertext can
    /// still be retried.
    #[error("message authentication failed")]
    Mac,

    /// The message references a chain position older than the skip window.
    #[error("counter {counter} is behind chain position {current} with no cached key")]
    StaleCounter { counter: u32, current: u32 },

    /// The message jumps further ahead than the skipped-key bound allows.
    #[error("counter {counter} is more than {max_skip} ahead of chain position {current}")]
    SkipLimitExceeded {
        counter: u32,
        current: u32,
        max_skip: u32,
    },

    /// Pre-key lookup or usage failed.
    #[error("pre-key error: {0}")]
    PreKey(String),

    /// A serialized record was neither the canonical format nor any
    /// recognized legacy shape.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A wire message could not be parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An address string or component was rejected.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A cryptographic operation failed.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// Random number generation failed.
    #[error("random number generation failed")]
    Random,

    /// An error raised by the caller-supplied store, passed through verbatim.
    #[error("storage failure: {0}")]
    Store(String),
}
