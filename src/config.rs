/*! Instance configuration.

In the original C library these were compile-time macros in a vendored
`TF_Config.h` (see `examples/original_source/examples/TF_Config.h`):
`ID_BYTES`, `LEN_BYTES`, `TYPE_BYTES`, `CKSUM_TYPE`, `USE_SOF_BYTE`,
`SOF_BYTE`, `MAX_PAYLOAD_RX`, `SENDBUF_LEN`, the three listener table
capacities, and `PARSER_TIMEOUT_TICKS`. Rust has no portable equivalent of
editing a vendored header before compiling, so this crate turns all of them
into runtime fields on [`Config`], validated once at [`crate::TinyFrame::new`]
time - the same role the original's "return a null instance on bad config"
behavior plays, just surfaced as `Result` rather than a null pointer.
*/

use crate::checksum::ChecksumKind;
use crate::error::ConfigError;

/// Width, in bytes, of a fixed-width header field. The wire format only
/// ever uses one, two, or four bytes per field (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldWidth {
    /// One byte (values 0..=255).
    One = 1,
    /// Two bytes (values 0..=65535).
    Two = 2,
    /// Four bytes.
    Four = 4,
}

impl FieldWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Largest value this width can encode.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            FieldWidth::One => 0xff,
            FieldWidth::Two => 0xffff,
            FieldWidth::Four => 0xffff_ffff,
        }
    }
}

/// Peer role, used only to pick outbound id parity (spec.md §4.5). Both
/// ends of a link must agree on opposite roles or ids allocated
/// independently by each side can collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// Allocates even ids.
    Master,
    /// Allocates odd ids.
    Slave,
}

/// Instance configuration, validated by [`Config::validate`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Width of the `id` field.
    pub id_bytes: FieldWidth,
    /// Width of the `len` field; bounds the largest payload this instance
    /// can ever *encode* (receive is further bounded by `max_payload_rx`).
    pub len_bytes: FieldWidth,
    /// Width of the `type` field.
    pub type_bytes: FieldWidth,
    /// Checksum kind used for both header and payload checksums.
    #[cfg_attr(feature = "serde", serde(skip, default = "ChecksumKind::default"))]
    pub checksum: ChecksumKind,
    /// Whether a leading SOF sentinel byte is emitted/expected.
    pub use_sof: bool,
    /// The SOF sentinel byte value, when `use_sof` is set.
    pub sof_byte: u8,
    /// Receive buffer cap; payloads larger than this are drained and
    /// dropped without dispatch (I4).
    pub max_payload_rx: usize,
    /// Size of the chunked transmit buffer used by the sender (component E).
    pub sendbuf_len: usize,
    /// Capacity of the id-listener table.
    pub max_id_listeners: usize,
    /// Capacity of the type-listener table.
    pub max_type_listeners: usize,
    /// Capacity of the generic-listener table.
    pub max_generic_listeners: usize,
    /// Ticks of inactivity before the receive parser resets to its initial
    /// state. `0` disables the parser timeout.
    pub parser_timeout_ticks: u32,
    /// This instance's role, determining outbound id parity.
    pub role: Role,
}

impl Default for Config {
    /// The conventional TinyFrame defaults: 1-byte id, 2-byte len, 1-byte
    /// type, XOR checksum, SOF enabled with the traditional `0x01`
    /// sentinel, 1 KiB receive cap, 32-byte send chunks, 10-entry listener
    /// tables, no parser timeout, master role.
    fn default() -> Self {
        Config {
            id_bytes: FieldWidth::One,
            len_bytes: FieldWidth::Two,
            type_bytes: FieldWidth::One,
            checksum: ChecksumKind::Xor,
            use_sof: true,
            sof_byte: 0x01,
            max_payload_rx: 1024,
            sendbuf_len: 32,
            max_id_listeners: 10,
            max_type_listeners: 10,
            max_generic_listeners: 10,
            parser_timeout_ticks: 0,
            role: Role::Master,
        }
    }
}

impl Config {
    /// Start from the defaults with a given role; chain the `with_*`
    /// setters to customize further.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Config {
            role,
            ..Config::default()
        }
    }

    /// Set the checksum kind.
    #[must_use]
    pub fn with_checksum(mut self, checksum: ChecksumKind) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set the field widths.
    #[must_use]
    pub fn with_widths(mut self, id: FieldWidth, len: FieldWidth, msg_type: FieldWidth) -> Self {
        self.id_bytes = id;
        self.len_bytes = len;
        self.type_bytes = msg_type;
        self
    }

    /// Disable the SOF sentinel byte.
    #[must_use]
    pub fn without_sof(mut self) -> Self {
        self.use_sof = false;
        self
    }

    /// Set the SOF sentinel byte value (implies `use_sof = true`).
    #[must_use]
    pub fn with_sof_byte(mut self, byte: u8) -> Self {
        self.use_sof = true;
        self.sof_byte = byte;
        self
    }

    /// Set the receive payload cap.
    #[must_use]
    pub fn with_max_payload_rx(mut self, max: usize) -> Self {
        self.max_payload_rx = max;
        self
    }

    /// Set the transmit chunk buffer size.
    #[must_use]
    pub fn with_sendbuf_len(mut self, len: usize) -> Self {
        self.sendbuf_len = len;
        self
    }

    /// Set all three listener table capacities at once.
    #[must_use]
    pub fn with_listener_capacities(mut self, id: usize, msg_type: usize, generic: usize) -> Self {
        self.max_id_listeners = id;
        self.max_type_listeners = msg_type;
        self.max_generic_listeners = generic;
        self
    }

    /// Set the parser inactivity timeout, in ticks. `0` disables it.
    #[must_use]
    pub fn with_parser_timeout_ticks(mut self, ticks: u32) -> Self {
        self.parser_timeout_ticks = ticks;
        self
    }

    /// Number of header bytes after any SOF, up to and including `TYPE`:
    /// `ID ‖ LEN ‖ TYPE`.
    #[must_use]
    pub(crate) fn header_len(&self) -> usize {
        self.id_bytes.bytes() + self.len_bytes.bytes() + self.type_bytes.bytes()
    }

    /// Validate the configuration, matching spec.md §7's "Configuration
    /// error" taxonomy: invalid widths (none here - `FieldWidth` can't
    /// represent an invalid width) and zero capacities where required.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_id_listeners == 0
            || self.max_type_listeners == 0
            || self.max_generic_listeners == 0
        {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.max_payload_rx == 0 {
            return Err(ConfigError::ZeroMaxPayload);
        }
        let min_sendbuf = (self.use_sof as usize)
            + self.header_len()
            + self.checksum.width();
        if self.sendbuf_len < min_sendbuf.max(1) {
            return Err(ConfigError::SendbufTooSmall);
        }
        Ok(())
    }
}
