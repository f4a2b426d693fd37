/*! Sender & multipart engine (spec.md §4.5).

Three concerns live here: turning a [`Msg`] into wire bytes through a
bounded chunk buffer, allocating outbound ids with role parity (`MASTER`
even, `SLAVE` odd - fixed per this implementation, see `DESIGN.md`), and
the multipart protocol that spreads one frame's payload across many
`multipart_payload` calls under a held transmitter lock (I5).

The header and payload checksums are not two independent runs: per
`crate::checksum`, one running accumulator is seeded at `ID`, sampled after
`TYPE` for `HEADER_CKSUM`, then keeps accumulating - uninterrupted - through
the payload for `PAYLOAD_CKSUM`. `send_frame` folds straight through both;
multipart carries the post-header accumulator in [`MultipartState`] across
calls instead.
*/

use crate::codec::{encode_checksum, encode_field};
use crate::error::{Error, Result};
use crate::frame::Msg;
use crate::listener::{Handler, TimeoutHandler};
use crate::sink::WriteSink;
use crate::tf::TinyFrame;

/// Draws the next outbound id, skipping any id currently bound to a live
/// id-listener (P6). `TinyFrame::next_id` always holds the next candidate
/// already aligned to this instance's role parity; advancing by 2 modulo
/// `2^(8·ID_BYTES)` (always a power of two, hence even) preserves that
/// parity forever.
pub(crate) fn allocate_id<U>(tf: &mut TinyFrame<U>) -> u32 {
    let modulus = tf.config.id_bytes.max_value() + 1;
    loop {
        let candidate = tf.next_id;
        tf.next_id = ((u64::from(candidate) + 2) % modulus) as u32;
        if !tf.listeners.id_in_use(candidate) {
            return candidate;
        }
    }
}

/// A chunked output buffer: bytes accumulate until `cap` is reached, then
/// flush through the sink in one call (spec.md §4.5 "chunked output").
/// `flush` is also used to drain a partial trailing chunk at the end of a
/// send.
struct SendBuffer {
    buf: Vec<u8>,
    cap: usize,
}

impl SendBuffer {
    fn new(cap: usize) -> Self {
        SendBuffer {
            buf: Vec::with_capacity(cap.max(1)),
            cap: cap.max(1),
        }
    }

    fn push_bytes(&mut self, sink: &mut dyn WriteSink, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.buf.push(b);
            if self.buf.len() >= self.cap {
                self.flush(sink)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn WriteSink) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let n = sink.write(&self.buf);
        let ok = n == self.buf.len();
        self.buf.clear();
        if ok {
            Ok(())
        } else {
            Err(Error::ShortWrite)
        }
    }
}

/// State of an open multipart send (spec.md §4.5), held by
/// `TinyFrame::multipart` between `send_multipart` and `multipart_close`.
pub(crate) struct MultipartState {
    id: u32,
    committed_len: usize,
    sent_len: usize,
    /// Running checksum accumulator, continuing from the header fold.
    cksum_raw: u64,
    hc_width: usize,
    buf: SendBuffer,
}

/// Build and write a complete single-shot frame: header, header checksum,
/// payload, payload checksum - chunked through a fresh [`SendBuffer`] and
/// wrapped in a claim/release of the transmitter lock (spec.md §5, §6).
pub(crate) fn send_frame<U>(tf: &mut TinyFrame<U>, id: u32, msg_type: u32, data: &[u8]) -> Result<()> {
    let max_len = tf.config.len_bytes.max_value() as usize;
    if data.len() > max_len {
        return Err(Error::PayloadTooLarge {
            len: data.len(),
            max: max_len,
        });
    }
    if !tf.tx_lock.claim() {
        return Err(Error::TxLockUnavailable);
    }
    let result = send_frame_locked(tf, id, msg_type, data);
    tf.tx_lock.release();
    result
}

fn send_frame_locked<U>(tf: &mut TinyFrame<U>, id: u32, msg_type: u32, data: &[u8]) -> Result<()> {
    let use_sof = tf.config.use_sof;
    let sof_byte = tf.config.sof_byte;
    let id_bytes = tf.config.id_bytes;
    let len_bytes = tf.config.len_bytes;
    let type_bytes = tf.config.type_bytes;
    let header_len = tf.config.header_len();
    let checksum = tf.config.checksum.clone();
    let mut buf = SendBuffer::new(tf.config.sendbuf_len);

    if use_sof {
        buf.push_bytes(tf.sink.as_mut(), &[sof_byte])?;
    }

    let mut header = Vec::with_capacity(header_len);
    encode_field(id, id_bytes, &mut header);
    encode_field(data.len() as u32, len_bytes, &mut header);
    encode_field(msg_type, type_bytes, &mut header);
    buf.push_bytes(tf.sink.as_mut(), &header)?;

    let algo = checksum.algorithm();
    let header_raw = algo.fold(&header);
    let hc_width = algo.width();
    if hc_width > 0 {
        let hc = encode_checksum(algo.end(header_raw), hc_width);
        buf.push_bytes(tf.sink.as_mut(), &hc)?;
    }

    if !data.is_empty() {
        buf.push_bytes(tf.sink.as_mut(), data)?;
        if hc_width > 0 {
            let payload_raw = data.iter().fold(header_raw, |s, &b| algo.add(s, b));
            let pc = encode_checksum(algo.end(payload_raw), hc_width);
            buf.push_bytes(tf.sink.as_mut(), &pc)?;
        }
    }

    buf.flush(tf.sink.as_mut())
}

/// `send(msg)`: write `msg` as a single frame, allocating a fresh id
/// unless `msg.id` is already set.
pub(crate) fn send<U>(tf: &mut TinyFrame<U>, msg: &Msg) -> Result<()> {
    let id = msg.id.unwrap_or_else(|| allocate_id(tf));
    send_frame(tf, id, msg.msg_type, &msg.data)
}

/// `respond(msg)`: send a reply. Identical machinery to [`send`]; named
/// separately because callers reach for it specifically when `msg.id` is
/// the id of a frame they just received (`Frame::id` carried over via
/// `Msg::with_id`).
pub(crate) fn respond<U>(tf: &mut TinyFrame<U>, msg: &Msg) -> Result<()> {
    send(tf, msg)
}

/// `query(msg, handler, timeout_ticks, timeout_handler, userdata)`:
/// register an id-listener bound to the allocated id *before* writing the
/// first byte (so a reply that arrives immediately cannot miss it), then
/// send. If the id-listener table is full, nothing is written and the
/// table-full error is returned.
pub(crate) fn query<U>(
    tf: &mut TinyFrame<U>,
    msg: &Msg,
    handler: Handler<U>,
    timeout_ticks: u32,
    timeout_handler: Option<TimeoutHandler<U>>,
    userdata: U,
) -> Result<()> {
    let id = msg.id.unwrap_or_else(|| allocate_id(tf));
    tf.listeners
        .add_id(id, handler, timeout_ticks, timeout_handler, userdata)
        .map_err(Error::TableFull)?;
    if let Err(e) = send_frame(tf, id, msg.msg_type, &msg.data) {
        tf.listeners.remove_id(id);
        return Err(e);
    }
    Ok(())
}

/// `send_multipart(msg)`: commit `msg.data.len()` to the wire as `LEN` and
/// write the header (plus header checksum), but not `msg.data` itself -
/// that arrives via [`multipart_payload`]. Claims the transmitter lock,
/// held until [`multipart_close`] (I5).
pub(crate) fn send_multipart<U>(tf: &mut TinyFrame<U>, msg: &Msg) -> Result<()> {
    if tf.multipart.is_some() {
        return Err(Error::MultipartAlreadyOpen);
    }
    let max_len = tf.config.len_bytes.max_value() as usize;
    let committed_len = msg.data.len();
    if committed_len > max_len {
        return Err(Error::PayloadTooLarge {
            len: committed_len,
            max: max_len,
        });
    }
    if !tf.tx_lock.claim() {
        return Err(Error::TxLockUnavailable);
    }
    let id = msg.id.unwrap_or_else(|| allocate_id(tf));

    let use_sof = tf.config.use_sof;
    let sof_byte = tf.config.sof_byte;
    let id_bytes = tf.config.id_bytes;
    let len_bytes = tf.config.len_bytes;
    let type_bytes = tf.config.type_bytes;
    let header_len = tf.config.header_len();
    let checksum = tf.config.checksum.clone();
    let mut buf = SendBuffer::new(tf.config.sendbuf_len);

    let opened = (|| -> Result<u64> {
        if use_sof {
            buf.push_bytes(tf.sink.as_mut(), &[sof_byte])?;
        }
        let mut header = Vec::with_capacity(header_len);
        encode_field(id, id_bytes, &mut header);
        encode_field(committed_len as u32, len_bytes, &mut header);
        encode_field(msg.msg_type, type_bytes, &mut header);
        buf.push_bytes(tf.sink.as_mut(), &header)?;

        let algo = checksum.algorithm();
        let header_raw = algo.fold(&header);
        let hc_width = algo.width();
        if hc_width > 0 {
            let hc = encode_checksum(algo.end(header_raw), hc_width);
            buf.push_bytes(tf.sink.as_mut(), &hc)?;
        }
        Ok(header_raw)
    })();

    let header_raw = match opened {
        Ok(raw) => raw,
        Err(e) => {
            tf.tx_lock.release();
            return Err(e);
        }
    };

    tf.multipart = Some(MultipartState {
        id,
        committed_len,
        sent_len: 0,
        cksum_raw: header_raw,
        hc_width: checksum.width(),
        buf,
    });
    Ok(())
}

/// `multipart_payload(bytes)`: append `bytes` to the open multipart send.
/// The running checksum is folded in immediately; the bytes themselves are
/// streamed through the send buffer, possibly flushing. Overrunning the
/// length committed by `send_multipart` aborts the send (releases the lock,
/// clears the open state) and reports a length mismatch.
pub(crate) fn multipart_payload<U>(tf: &mut TinyFrame<U>, data: &[u8]) -> Result<()> {
    let Some(mut mp) = tf.multipart.take() else {
        return Err(Error::MultipartNotOpen);
    };
    if mp.sent_len + data.len() > mp.committed_len {
        let sent = mp.sent_len + data.len();
        let committed = mp.committed_len;
        tf.tx_lock.release();
        return Err(Error::MultipartLengthMismatch { committed, sent });
    }
    let checksum = tf.config.checksum.clone();
    let algo = checksum.algorithm();
    for &b in data {
        mp.cksum_raw = algo.add(mp.cksum_raw, b);
    }
    mp.sent_len += data.len();
    if let Err(e) = mp.buf.push_bytes(tf.sink.as_mut(), data) {
        tf.tx_lock.release();
        return Err(e);
    }
    tf.multipart = Some(mp);
    Ok(())
}

/// `multipart_close()`: once `sent_len == committed_len`, emit the payload
/// checksum, flush any trailing buffered bytes, and release the
/// transmitter lock. Closing early (before the committed length has been
/// reached) is a length mismatch, same as overrunning it.
pub(crate) fn multipart_close<U>(tf: &mut TinyFrame<U>) -> Result<()> {
    let Some(mut mp) = tf.multipart.take() else {
        return Err(Error::MultipartNotOpen);
    };
    if mp.sent_len != mp.committed_len {
        let (committed, sent) = (mp.committed_len, mp.sent_len);
        tf.tx_lock.release();
        return Err(Error::MultipartLengthMismatch { committed, sent });
    }
    let checksum = tf.config.checksum.clone();
    let id = mp.id;
    let result = (|| -> Result<()> {
        if mp.committed_len > 0 && mp.hc_width > 0 {
            let pc = encode_checksum(checksum.algorithm().end(mp.cksum_raw), mp.hc_width);
            mp.buf.push_bytes(tf.sink.as_mut(), &pc)?;
        }
        mp.buf.flush(tf.sink.as_mut())
    })();
    tf.tx_lock.release();
    log::trace!("multipart send closed: id={id}");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_buffer_flushes_at_capacity() {
        let mut out = Vec::new();
        let mut sink = |b: &[u8]| -> usize {
            out.extend_from_slice(b);
            b.len()
        };
        let mut buf = SendBuffer::new(4);
        buf.push_bytes(&mut sink, &[1, 2, 3, 4, 5, 6]).unwrap();
        buf.flush(&mut sink).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn send_buffer_reports_short_write() {
        let mut sink = |b: &[u8]| -> usize { b.len().saturating_sub(1) };
        let mut buf = SendBuffer::new(4);
        let err = buf.push_bytes(&mut sink, &[1, 2, 3, 4]).unwrap_err();
        assert_eq!(err, Error::ShortWrite);
    }

    #[test]
    fn flush_on_empty_buffer_is_a_no_op() {
        let mut calls = 0;
        let mut sink = |b: &[u8]| -> usize {
            calls += 1;
            b.len()
        };
        let mut buf = SendBuffer::new(4);
        buf.flush(&mut sink).unwrap();
        assert_eq!(calls, 0);
    }
}
