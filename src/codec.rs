/*! Wire codec (spec.md §4.2).

Fields are big-endian, unsigned, fixed-width. The frame layout is:

```text
[SOF?] [ID] [LEN] [TYPE] [HEADER_CKSUM] [PAYLOAD bytes...] [PAYLOAD_CKSUM]
```

`SOF` is a single configured byte, present iff `Config::use_sof`.
`HEADER_CKSUM` covers `ID ‖ LEN ‖ TYPE` - everything after any SOF byte, up
to and including `TYPE`. `PAYLOAD_CKSUM` covers `PAYLOAD` only, and both
checksums are omitted entirely when the chosen [`ChecksumKind`] has width 0.
When `len == 0`, the payload and its checksum are both absent (the Open
Question in spec.md §9 is resolved in that direction).

This module only knows how to turn single fixed-width integers into bytes
and back; [`crate::parser`] and [`crate::sender`] own frame-level assembly
and checksum bookkeeping.
*/

use crate::checksum::ChecksumKind;
use crate::config::FieldWidth;

/// Append `value`'s low `width` bytes, big-endian, to `out`.
pub fn encode_field(value: u32, width: FieldWidth, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[4 - width.bytes()..]);
}

/// Decode a big-endian field from exactly `bytes.len()` bytes (1, 2, or 4).
///
/// # Panics
/// Panics if `bytes` isn't 1, 2, or 4 bytes long; callers only ever pass
/// slices sized by a [`FieldWidth`], so this can't happen in practice.
#[must_use]
pub fn decode_field(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf[4 - bytes.len()..].copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

/// Append `value`'s low `width` bytes, big-endian, to `out`. Used for
/// checksum fields, whose width comes from a [`ChecksumKind`] rather than a
/// [`FieldWidth`] and can be 0 (nothing appended).
pub fn encode_checksum(value: u64, width: usize) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    bytes[8 - width..].to_vec()
}

/// Decode a checksum field of the given width (0..=4 bytes: this crate's
/// built-in checksums never exceed 4 bytes, and a custom one is expected to
/// stay within that range too).
#[must_use]
pub fn decode_checksum(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

/// Checksum a run of bytes with the given kind, for encode-side use where
/// the whole slice is available at once (the receive side accumulates
/// incrementally instead, see [`crate::parser`]).
#[must_use]
pub fn checksum_slice(kind: &ChecksumKind, data: &[u8]) -> u64 {
    kind.algorithm().compute(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_widths() {
        for (width, value) in [
            (FieldWidth::One, 0xab),
            (FieldWidth::Two, 0xbeef),
            (FieldWidth::Four, 0xdead_beef),
        ] {
            let mut buf = Vec::new();
            encode_field(value, width, &mut buf);
            assert_eq!(buf.len(), width.bytes());
            assert_eq!(decode_field(&buf), value);
        }
    }

    #[test]
    fn checksum_width_zero_encodes_nothing() {
        assert_eq!(encode_checksum(0xff, 0), Vec::<u8>::new());
    }

    #[test]
    fn checksum_round_trips() {
        let bytes = encode_checksum(0x1234, 2);
        assert_eq!(bytes, vec![0x12, 0x34]);
        assert_eq!(decode_checksum(&bytes), 0x1234);
    }
}
