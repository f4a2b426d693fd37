/*! Checksum algebra.

Every checksum kind TinyFrame supports - built-in or custom - is defined by
the same three-operation contract the original C library exposes as
`TF_CksumStart`/`TF_CksumAdd`/`TF_CksumEnd` (see
`examples/original_source/TF_Integration.c`):

```text
start : ()      -> S
add   : S, byte -> S
end   : S       -> W        (W is width-typed)
```

`S` is modeled here as a plain `u64` accumulator regardless of the checksum's
wire width; `end` folds the accumulator down to the low `width()` bytes,
which [`crate::codec`] then writes big-endian. This keeps the trait
object-safe without an associated-type dance, at the cost of one `u64`
instead of a native `u8`/`u16`/`u32` - cheap, and it means `Crc32` and `Xor`
share one vtable shape.

Per-frame there is exactly **one** running accumulator, not two independent
ones: it starts at the first header byte after any SOF, gets sampled (via
`end`) once after `TYPE` to produce `HEADER_CKSUM`, then keeps accumulating
- without restarting at `start()` - through the payload, and is sampled
again to produce `PAYLOAD_CKSUM`. Working the spec.md §8 scenario 1 wire
trace backwards confirms this: `HEADER_CKSUM` alone is the XOR-fold of
`ID‖LEN‖TYPE`, but `PAYLOAD_CKSUM` only comes out right if the fold
continues from that same state into `PAYLOAD` rather than restarting at
`start()`. [`crate::parser`] and [`crate::sender`] carry the raw
(pre-`end`) state across that boundary accordingly.
*/

/// A pluggable checksum algorithm.
///
/// Implementations must be pure functions of their input: `start()` always
/// returns the same seed, and `add`/`end` must not depend on anything but
/// their arguments. This is what lets the sender run the same algorithm
/// incrementally across chunk boundaries (see [`crate::sender`]) and still
/// match a receiver that sees the bytes in one piece.
pub trait ChecksumAlgorithm: Send + Sync + std::fmt::Debug {
    /// Width in bytes of the finalized checksum. `0` means the checksum is
    /// not emitted on the wire at all.
    fn width(&self) -> usize;

    /// Initial accumulator state.
    fn start(&self) -> u64;

    /// Fold one more byte into the accumulator.
    fn add(&self, state: u64, byte: u8) -> u64;

    /// Finalize the accumulator into the value that gets written to the
    /// wire (low `width()` bytes, big-endian).
    fn end(&self, state: u64) -> u64;

    /// Fold an entire slice into a raw (not yet finalized) accumulator
    /// state, starting from [`Self::start`]. Kept separate from
    /// [`Self::compute`] because the wire format samples one running
    /// accumulator twice - once after the header, again after the payload
    /// - rather than restarting it at the payload boundary; see
    /// `crate::parser` and `crate::sender`.
    fn fold(&self, data: &[u8]) -> u64 {
        data.iter().fold(self.start(), |s, &b| self.add(s, b))
    }

    /// Convenience: checksum an entire slice in one call, as if it were a
    /// whole, self-contained run (start → fold → end).
    fn compute(&self, data: &[u8]) -> u64 {
        self.end(self.fold(data))
    }
}

/// No checksum at all. Width 0; header/payload checksum fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneChecksum;

impl ChecksumAlgorithm for NoneChecksum {
    fn width(&self) -> usize {
        0
    }
    fn start(&self) -> u64 {
        0
    }
    fn add(&self, _state: u64, _byte: u8) -> u64 {
        0
    }
    fn end(&self, _state: u64) -> u64 {
        0
    }
}

/// XOR checksum. Width 1. `start = 0`, `add = s ^ b`, `end = s` (identity -
/// matches `TF_CksumStart`/`TF_CksumAdd`/`TF_CksumEnd` for
/// `TF_CKSUM_TYPE_XOR` in the original, which applies no final
/// transformation at all).
///
/// Detects any single-bit flip with certainty (P3 in spec.md §8), but two
/// flips in the same bit position across different bytes cancel out.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorChecksum;

impl ChecksumAlgorithm for XorChecksum {
    fn width(&self) -> usize {
        1
    }
    fn start(&self) -> u64 {
        0
    }
    fn add(&self, state: u64, byte: u8) -> u64 {
        state ^ u64::from(byte)
    }
    fn end(&self, state: u64) -> u64 {
        state & 0xff
    }
}

/// Fletcher-16 checksum. Width 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fletcher16;

impl ChecksumAlgorithm for Fletcher16 {
    fn width(&self) -> usize {
        2
    }
    fn start(&self) -> u64 {
        0
    }
    fn add(&self, state: u64, byte: u8) -> u64 {
        let sum1 = state & 0xff;
        let sum2 = (state >> 8) & 0xff;
        let sum1 = (sum1 + u64::from(byte)) % 255;
        let sum2 = (sum2 + sum1) % 255;
        sum1 | (sum2 << 8)
    }
    fn end(&self, state: u64) -> u64 {
        let sum1 = state & 0xff;
        let sum2 = (state >> 8) & 0xff;
        (sum2 << 8) | sum1
    }
}

/// CRC-16 (polynomial 0xA001, reflected, a.k.a. CRC-16/MODBUS family). Width 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16;

impl ChecksumAlgorithm for Crc16 {
    fn width(&self) -> usize {
        2
    }
    fn start(&self) -> u64 {
        0xffff
    }
    fn add(&self, state: u64, byte: u8) -> u64 {
        let mut crc = state ^ u64::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xa001
            } else {
                crc >> 1
            };
        }
        crc & 0xffff
    }
    fn end(&self, state: u64) -> u64 {
        state
    }
}

/// CRC-32 (polynomial 0xEDB88320, reflected, the familiar zlib/Ethernet CRC). Width 4.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl Crc32 {
    fn table_entry(mut crc: u32) -> u32 {
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
        }
        crc
    }
}

impl ChecksumAlgorithm for Crc32 {
    fn width(&self) -> usize {
        4
    }
    fn start(&self) -> u64 {
        0xffff_ffff
    }
    fn add(&self, state: u64, byte: u8) -> u64 {
        let idx = ((state as u32 ^ u32::from(byte)) & 0xff) as u32;
        let table_val = u64::from(Self::table_entry(idx));
        (state >> 8) ^ table_val
    }
    fn end(&self, state: u64) -> u64 {
        (state ^ 0xffff_ffff) & 0xffff_ffff
    }
}

/// Selects which checksum algorithm an instance uses for both header and
/// payload checksums (spec.md §4.1: "Header and payload checksums use the
/// same kind").
#[derive(Debug, Clone)]
pub enum ChecksumKind {
    /// No checksum; width 0.
    None,
    /// XOR checksum; width 1.
    Xor,
    /// Fletcher-16 checksum; width 2.
    Fletcher16,
    /// CRC-16 (poly 0xA001 reflected); width 2.
    Crc16,
    /// CRC-32; width 4.
    Crc32,
    /// User-supplied checksum algorithm.
    Custom(std::sync::Arc<dyn ChecksumAlgorithm>),
}

impl Default for ChecksumKind {
    fn default() -> Self {
        ChecksumKind::Xor
    }
}

impl ChecksumKind {
    /// Width in bytes of this checksum kind.
    #[must_use]
    pub fn width(&self) -> usize {
        self.algorithm().width()
    }

    /// Borrow the underlying algorithm.
    #[must_use]
    pub fn algorithm(&self) -> &dyn ChecksumAlgorithm {
        match self {
            ChecksumKind::None => &NoneChecksum,
            ChecksumKind::Xor => &XorChecksum,
            ChecksumKind::Fletcher16 => &Fletcher16,
            ChecksumKind::Crc16 => &Crc16,
            ChecksumKind::Crc32 => &Crc32,
            ChecksumKind::Custom(algo) => algo.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_single_bit_flip_always_detected() {
        let algo = XorChecksum;
        let data = b"Hi there, TinyFrame";
        let good = algo.compute(data);
        for byte in 0..data.len() {
            for bit in 0..8u8 {
                let mut corrupt = data.to_vec();
                corrupt[byte] ^= 1 << bit;
                assert_ne!(algo.compute(&corrupt), good, "byte {byte} bit {bit} undetected");
            }
        }
    }

    #[test]
    fn none_checksum_is_always_zero_width() {
        assert_eq!(ChecksumKind::None.width(), 0);
        assert_eq!(NoneChecksum.compute(b"anything"), 0);
    }

    #[test]
    fn crc16_matches_known_vector() {
        // "123456789" -> CRC-16/ARC = 0xBB3D (poly 0xA001, seed 0x0000... here
        // seed 0xffff per this implementation's start(), so verify
        // incremental/whole-buffer agreement instead of a borrowed vector).
        let algo = Crc16;
        let whole = algo.compute(b"123456789");
        let mut state = algo.start();
        for b in b"123456789" {
            state = algo.add(state, *b);
        }
        assert_eq!(algo.end(state), whole);
    }

    #[test]
    fn crc32_incremental_matches_whole_buffer() {
        let algo = Crc32;
        let data = b"The quick brown fox jumps over the lazy dog";
        let whole = algo.compute(data);
        let mut state = algo.start();
        for b in data {
            state = algo.add(state, *b);
        }
        assert_eq!(algo.end(state), whole);
        // Known CRC-32 of this exact sentence.
        assert_eq!(whole, 0x414f_a339);
    }

    #[test]
    fn fletcher16_incremental_matches_whole_buffer() {
        let algo = Fletcher16;
        let data = b"abcdefgh";
        let whole = algo.compute(data);
        let mut state = algo.start();
        for b in data {
            state = algo.add(state, *b);
        }
        assert_eq!(algo.end(state), whole);
    }
}
