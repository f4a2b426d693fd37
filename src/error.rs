//! Crate-wide error type.
//!
//! Wire-level problems (bad checksum, oversize payload, parser timeout) are
//! *not* represented here: the receive state machine recovers from those by
//! resynchronizing (see [`crate::parser`]) and merely counts them. `Error`
//! only covers failures the caller must react to: bad configuration and
//! resource exhaustion on the send/listener side.

use crate::listener::Table;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration error, returned by [`crate::config::Config::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A listener table was configured with zero capacity.
    #[error("listener table capacity must be nonzero")]
    ZeroCapacity,
    /// `MAX_PAYLOAD_RX` is zero, which would make every nonempty frame oversize.
    #[error("MAX_PAYLOAD_RX must be nonzero")]
    ZeroMaxPayload,
    /// The send buffer is too small to hold even a bare header.
    #[error("SENDBUF_LEN is too small for the configured header")]
    SendbufTooSmall,
}

/// Errors returned by TinyFrame operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Configuration failed validation; the instance was not created.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A listener could not be added because its table is full.
    #[error("{0:?} listener table is full")]
    TableFull(Table),

    /// `send_multipart` was called while a multipart send was already open.
    #[error("a multipart send is already open")]
    MultipartAlreadyOpen,

    /// `multipart_payload`/`multipart_close` was called with no multipart open.
    #[error("no multipart send is open")]
    MultipartNotOpen,

    /// The bytes supplied across all `multipart_payload` calls didn't match
    /// the length committed by `send_multipart`.
    #[error("multipart payload length mismatch: committed {committed}, sent {sent}")]
    MultipartLengthMismatch {
        /// Length committed to the wire by `send_multipart`.
        committed: usize,
        /// Total bytes actually supplied via `multipart_payload`.
        sent: usize,
    },

    /// The payload passed to `send`/`query`/`respond` exceeds the wire's
    /// `LEN` field width.
    #[error("payload of {len} bytes exceeds the {max}-byte length field")]
    PayloadTooLarge {
        /// Payload length that was rejected.
        len: usize,
        /// Maximum encodable length for the configured `LEN_BYTES`.
        max: usize,
    },

    /// The write sink accepted fewer bytes than requested.
    #[error("write sink accepted fewer bytes than requested")]
    ShortWrite,

    /// The TX lock could not be claimed.
    #[error("failed to claim transmitter lock")]
    TxLockUnavailable,
}
