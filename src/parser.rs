/*! Receive state machine (spec.md §4.3).

Byte-fed, non-blocking, purely data-driven. Spec.md's seven named states -
`SOF → LEN → HEAD_CKSUM → ID → TYPE → PAYLOAD → DATA_CKSUM` - are collapsed
here into four phases that preserve the same wire order, byte count, and
checksum coverage: `Sof → Header (ID‖LEN‖TYPE) → HeadCksum → Payload →
DataCksum`. Spec.md's state list and the wire layout in §4.2 disagree on
whether `LEN` or `ID` comes first on the wire; this implementation follows
the wire layout (`ID` then `LEN` then `TYPE`) and verifies the header
checksum once all three have been read, since the checksum covers all
three fields together and can't be meaningfully verified mid-header. See
`SPEC_FULL.md` §4.3 and `DESIGN.md`.

Any checksum mismatch, oversize payload, or parser timeout resets straight
back to the initial state and drops whatever was accumulated - no bytes are
replayed (I3, I4, resync policy).
*/

use crate::codec::{decode_checksum, decode_field};
use crate::config::Config;
use crate::frame::Frame;

/// Receive-side observability counters. Wire-level problems never surface
/// as a `Result::Err` from `accept()` - spec.md §7 is explicit that no
/// error is retried by the core and the parser must keep accepting bytes -
/// so these counters are the only way a caller can see that frames are
/// being rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Frames successfully decoded and dispatched.
    pub frames_received: u64,
    /// Header checksum mismatches.
    pub header_checksum_errors: u64,
    /// Payload checksum mismatches.
    pub payload_checksum_errors: u64,
    /// Frames whose `len` exceeded `MAX_PAYLOAD_RX`, drained and dropped (I4).
    pub oversize_drops: u64,
    /// Times the parser timeout fired and reset the state machine.
    pub parser_timeouts: u64,
}

enum State {
    Sof,
    Header {
        buf: Vec<u8>,
        need: usize,
    },
    HeadCksum {
        id: u32,
        len: usize,
        msg_type: u32,
        want: u64,
        /// Raw (pre-`end`) accumulator state after folding the header
        /// bytes, carried into `Payload` so the payload checksum
        /// continues the same run instead of restarting (see
        /// `crate::checksum` module docs).
        raw: u64,
        buf: Vec<u8>,
        need: usize,
    },
    Payload {
        id: u32,
        msg_type: u32,
        remaining: usize,
        oversize: bool,
        data: Vec<u8>,
        cksum_state: u64,
    },
    DataCksum {
        id: u32,
        msg_type: u32,
        data: Vec<u8>,
        want: u64,
        buf: Vec<u8>,
        need: usize,
    },
}

fn initial_state(config: &Config) -> State {
    if config.use_sof {
        State::Sof
    } else {
        State::Header {
            buf: Vec::with_capacity(config.header_len()),
            need: config.header_len(),
        }
    }
}

/// The receive state machine for one [`crate::TinyFrame`] instance.
pub(crate) struct Parser {
    state: State,
    ticks_since_activity: u32,
    pub(crate) stats: RxStats,
}

impl Parser {
    pub(crate) fn new(config: &Config) -> Self {
        Parser {
            state: initial_state(config),
            ticks_since_activity: 0,
            stats: RxStats::default(),
        }
    }

    fn reset(&mut self, config: &Config) {
        self.state = initial_state(config);
    }

    /// Advance the inactivity counter; if the configured parser timeout
    /// has elapsed with no byte accepted, reset to the initial state
    /// (spec.md §4.3 "Parser timeout").
    pub(crate) fn tick(&mut self, config: &Config) {
        if config.parser_timeout_ticks == 0 {
            return;
        }
        self.ticks_since_activity += 1;
        if self.ticks_since_activity >= config.parser_timeout_ticks {
            log::debug!("TinyFrame parser timeout, resyncing");
            self.stats.parser_timeouts += 1;
            self.reset(config);
            self.ticks_since_activity = 0;
        }
    }

    /// Feed one byte through the state machine. Returns a completed,
    /// checksum-verified [`Frame`] when one is ready for dispatch.
    pub(crate) fn accept_byte(&mut self, config: &Config, byte: u8) -> Option<Frame> {
        self.ticks_since_activity = 0;
        match &mut self.state {
            State::Sof => {
                if byte == config.sof_byte {
                    self.state = State::Header {
                        buf: Vec::with_capacity(config.header_len()),
                        need: config.header_len(),
                    };
                }
                None
            }
            State::Header { buf, need } => {
                buf.push(byte);
                if buf.len() < *need {
                    return None;
                }
                let buf = std::mem::take(buf);
                let (id, len, msg_type) = decode_header(config, &buf);
                let header_raw = config.checksum.algorithm().fold(&buf);
                self.enter_after_header(config, id, len, msg_type, header_raw)
            }
            State::HeadCksum {
                id,
                len,
                msg_type,
                want,
                raw,
                buf,
                need,
            } => {
                buf.push(byte);
                if buf.len() < *need {
                    return None;
                }
                let got = decode_checksum(buf);
                let (id, len, msg_type, want, raw) = (*id, *len, *msg_type, *want, *raw);
                if got != want {
                    log::debug!("TinyFrame header checksum mismatch: want {want:#x} got {got:#x}");
                    self.stats.header_checksum_errors += 1;
                    self.reset(config);
                    None
                } else {
                    self.enter_payload(config, id, msg_type, len, raw)
                }
            }
            State::Payload {
                id,
                msg_type,
                remaining,
                oversize,
                data,
                cksum_state,
            } => {
                if *oversize {
                    *remaining -= 1;
                    if *remaining == 0 {
                        log::debug!("TinyFrame dropped oversize payload (id={id})");
                        self.stats.oversize_drops += 1;
                        self.reset(config);
                    }
                    return None;
                }
                *cksum_state = config.checksum.algorithm().add(*cksum_state, byte);
                data.push(byte);
                *remaining -= 1;
                if *remaining == 0 {
                    let (id, msg_type) = (*id, *msg_type);
                    let data = std::mem::take(data);
                    let final_cksum = config.checksum.algorithm().end(*cksum_state);
                    self.enter_data_cksum(config, id, msg_type, data, final_cksum)
                } else {
                    None
                }
            }
            State::DataCksum {
                id,
                msg_type,
                data,
                want,
                buf,
                need,
            } => {
                buf.push(byte);
                if buf.len() < *need {
                    return None;
                }
                let got = decode_checksum(buf);
                let (id, msg_type, want) = (*id, *msg_type, *want);
                if got != want {
                    log::debug!("TinyFrame payload checksum mismatch: want {want:#x} got {got:#x}");
                    self.stats.payload_checksum_errors += 1;
                    self.reset(config);
                    None
                } else {
                    let data = std::mem::take(data);
                    self.stats.frames_received += 1;
                    self.reset(config);
                    Some(Frame::new(id, msg_type, data))
                }
            }
        }
    }

    fn enter_after_header(
        &mut self,
        config: &Config,
        id: u32,
        len: usize,
        msg_type: u32,
        header_raw: u64,
    ) -> Option<Frame> {
        let hc_width = config.checksum.width();
        if hc_width == 0 {
            return self.enter_payload(config, id, msg_type, len, config.checksum.algorithm().start());
        }
        let want = config.checksum.algorithm().end(header_raw);
        self.state = State::HeadCksum {
            id,
            len,
            msg_type,
            want,
            raw: header_raw,
            buf: Vec::with_capacity(hc_width),
            need: hc_width,
        };
        None
    }

    /// `seed` is the raw header accumulator state (or `start()` when
    /// checksums are disabled) - the payload checksum continues that run
    /// rather than beginning a fresh one, see `crate::checksum`.
    fn enter_payload(
        &mut self,
        config: &Config,
        id: u32,
        msg_type: u32,
        len: usize,
        seed: u64,
    ) -> Option<Frame> {
        if len == 0 {
            // No payload, and no payload checksum (spec.md §9 resolution).
            self.stats.frames_received += 1;
            self.reset(config);
            return Some(Frame::new(id, msg_type, Vec::new()));
        }
        let oversize = len > config.max_payload_rx;
        self.state = State::Payload {
            id,
            msg_type,
            remaining: len,
            oversize,
            data: if oversize { Vec::new() } else { Vec::with_capacity(len) },
            cksum_state: seed,
        };
        None
    }

    fn enter_data_cksum(
        &mut self,
        config: &Config,
        id: u32,
        msg_type: u32,
        data: Vec<u8>,
        final_cksum: u64,
    ) -> Option<Frame> {
        let width = config.checksum.width();
        if width == 0 {
            self.stats.frames_received += 1;
            self.reset(config);
            return Some(Frame::new(id, msg_type, data));
        }
        self.state = State::DataCksum {
            id,
            msg_type,
            data,
            want: final_cksum,
            buf: Vec::with_capacity(width),
            need: width,
        };
        None
    }
}

fn decode_header(config: &Config, buf: &[u8]) -> (u32, usize, u32) {
    let id_w = config.id_bytes.bytes();
    let len_w = config.len_bytes.bytes();
    let id = decode_field(&buf[0..id_w]);
    let len = decode_field(&buf[id_w..id_w + len_w]) as usize;
    let msg_type = decode_field(&buf[id_w + len_w..]);
    (id, len, msg_type)
}
