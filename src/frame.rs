//! The [`Frame`] data type: a complete logical unit exchanged over the wire
//! (spec.md §3), plus [`Msg`], the builder used at the send API surface.

/// A complete frame: header fields plus payload. `len` is not stored
/// separately - it's always `data.len()` - since keeping both around would
/// let them disagree, something the original C struct (where `.len` is set
/// independently of `.data` for multipart sends) has to guard against by
/// convention instead of by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Conversation id. Width is `Config::id_bytes` on the wire.
    pub id: u32,
    /// Application-defined payload class. Width is `Config::type_bytes`.
    pub msg_type: u32,
    /// Payload bytes. Width is `Config::len_bytes` on the wire.
    pub data: Vec<u8>,
}

impl Frame {
    /// Build a frame with an explicit id (used by `respond`, or to inspect
    /// a received frame).
    #[must_use]
    pub fn new(id: u32, msg_type: u32, data: Vec<u8>) -> Self {
        Frame { id, msg_type, data }
    }
}

/// A message to be sent: like [`Frame`], but `id` is optional - `None`
/// means "allocate a fresh id" (the common case for `send`/`query`), `Some`
/// means "use this id as-is" (the case for `respond`, correlating with a
/// request's id).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Msg {
    /// Explicit id to reuse, or `None` to allocate a fresh one.
    pub id: Option<u32>,
    /// Application-defined payload class.
    pub msg_type: u32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl Msg {
    /// A message with payload `data` and the given type, allocating a
    /// fresh id on send.
    #[must_use]
    pub fn new(msg_type: u32, data: impl Into<Vec<u8>>) -> Self {
        Msg {
            id: None,
            msg_type,
            data: data.into(),
        }
    }

    /// Set an explicit id, turning this into a reply (`respond`) rather
    /// than a fresh request.
    #[must_use]
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }
}
