/*! The `TinyFrame` instance (spec.md §3 "Instance (`TF`)"), wiring
components A-E together: configuration, the receive state machine, the
three listener tables, id allocation, and the write sink / transmitter
lock seams.

`U` is this instance's listener userdata type (spec.md's opaque
`void *userdata`, modeled here as a caller-chosen generic rather than a
type-erased pointer - see `DESIGN.md`). Instances with no need for
per-listener state use the default `U = ()`.
*/

use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{Frame, Msg};
use crate::listener::{self, GenericListenerId, Handler, Listeners, Table, TimeoutHandler};
use crate::parser::{Parser, RxStats};
use crate::sender::{self, MultipartState};
use crate::sink::{NoopLock, TxLock, WriteSink};

/// A TinyFrame instance. See the module documentation for what `U` is.
pub struct TinyFrame<U = ()> {
    pub(crate) config: Config,
    pub(crate) parser: Parser,
    pub(crate) listeners: Listeners<U>,
    pub(crate) sink: Box<dyn WriteSink>,
    pub(crate) tx_lock: Box<dyn TxLock>,
    pub(crate) next_id: u32,
    pub(crate) multipart: Option<MultipartState>,
}

impl<U> TinyFrame<U> {
    /// Build a new instance, validating `config` first (spec.md §8: the
    /// Rust rendition of the original's "returns a null instance" on bad
    /// configuration). The transmitter lock defaults to [`NoopLock`]; use
    /// [`TinyFrame::new_with_lock`] when sends need cross-thread exclusion.
    pub fn new(config: Config, sink: impl WriteSink + 'static) -> Result<Self> {
        Self::new_with_lock(config, sink, NoopLock)
    }

    /// Like [`TinyFrame::new`], with an explicit [`TxLock`] implementation.
    pub fn new_with_lock(
        config: Config,
        sink: impl WriteSink + 'static,
        tx_lock: impl TxLock + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let parser = Parser::new(&config);
        let listeners = Listeners::new(
            config.max_id_listeners,
            config.max_type_listeners,
            config.max_generic_listeners,
        );
        let next_id = match config.role {
            crate::config::Role::Master => 0,
            crate::config::Role::Slave => 1,
        };
        log::info!(
            "TinyFrame instance created: role={:?} checksum={:?}",
            config.role,
            config.checksum
        );
        Ok(TinyFrame {
            config,
            parser,
            listeners,
            sink: Box::new(sink),
            tx_lock: Box::new(tx_lock),
            next_id,
            multipart: None,
        })
    }

    /// Feed one byte through the receive state machine, dispatching a
    /// completed frame through the listener tables if one results.
    pub fn accept(&mut self, byte: u8) {
        if let Some(frame) = self.parser.accept_byte(&self.config, byte) {
            self.dispatch(frame);
        }
    }

    /// Feed a run of bytes, in order.
    pub fn accept_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.accept(b);
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        listener::dispatch(self, &frame);
    }

    /// Advance one tick: ages the parser-timeout clock and every
    /// id/type-listener TTL, evicting (and firing the timeout handler of)
    /// any that reach zero (spec.md §4.3, §4.4, P5).
    pub fn tick(&mut self) {
        self.parser.tick(&self.config);
        listener::tick(self);
    }

    /// Receive-side observability counters (spec.md §7: wire errors are
    /// never returned from `accept`, only counted and logged).
    #[must_use]
    pub fn rx_stats(&self) -> RxStats {
        self.parser.stats
    }

    /// Send `msg` as a single frame, allocating a fresh id unless
    /// `msg.id` is set.
    pub fn send(&mut self, msg: &Msg) -> Result<()> {
        sender::send(self, msg)
    }

    /// Send a reply - same machinery as [`TinyFrame::send`], named for
    /// call-site clarity when `msg.id` came from a received [`Frame`].
    pub fn respond(&mut self, msg: &Msg) -> Result<()> {
        sender::respond(self, msg)
    }

    /// Send `msg` and register an id-listener bound to its id before the
    /// first wire byte goes out, so an immediate reply cannot be missed
    /// (spec.md §4.5 ordering guarantee (ii)).
    pub fn query(
        &mut self,
        msg: &Msg,
        handler: Handler<U>,
        timeout_ticks: u32,
        timeout_handler: Option<TimeoutHandler<U>>,
        userdata: U,
    ) -> Result<()> {
        sender::query(self, msg, handler, timeout_ticks, timeout_handler, userdata)
    }

    /// Open a multipart send: commits `msg.data.len()` as `LEN` and writes
    /// the header, but not `msg.data` - supply payload bytes via
    /// [`TinyFrame::multipart_payload`]. Holds the transmitter lock until
    /// [`TinyFrame::multipart_close`] (I5).
    pub fn send_multipart(&mut self, msg: &Msg) -> Result<()> {
        sender::send_multipart(self, msg)
    }

    /// Append bytes to an open multipart send.
    pub fn multipart_payload(&mut self, data: &[u8]) -> Result<()> {
        sender::multipart_payload(self, data)
    }

    /// Close an open multipart send: emits the payload checksum, flushes,
    /// and releases the transmitter lock.
    pub fn multipart_close(&mut self) -> Result<()> {
        sender::multipart_close(self)
    }

    /// Register an id-listener. Fails if the id-listener table is full.
    pub fn add_id_listener(
        &mut self,
        id: u32,
        handler: Handler<U>,
        timeout_ticks: u32,
        timeout_handler: Option<TimeoutHandler<U>>,
        userdata: U,
    ) -> Result<()> {
        self.listeners
            .add_id(id, handler, timeout_ticks, timeout_handler, userdata)
            .map_err(Error::TableFull)
    }

    /// Register a type-listener. Fails if the type-listener table is full.
    pub fn add_type_listener(
        &mut self,
        msg_type: u32,
        handler: Handler<U>,
        timeout_ticks: u32,
        timeout_handler: Option<TimeoutHandler<U>>,
        userdata: U,
    ) -> Result<()> {
        self.listeners
            .add_type(msg_type, handler, timeout_ticks, timeout_handler, userdata)
            .map_err(Error::TableFull)
    }

    /// Register a generic listener (no id or type predicate - sees
    /// anything not already claimed by an id- or type-listener). Returns
    /// a handle usable with [`TinyFrame::remove_generic_listener`], since
    /// closures can't be compared for removal the way the original's
    /// function pointers can (spec.md §9 Open Question, resolved).
    pub fn add_generic_listener(
        &mut self,
        handler: Handler<U>,
        userdata: U,
    ) -> Result<GenericListenerId> {
        self.listeners
            .add_generic(handler, userdata)
            .map_err(Error::TableFull)
    }

    /// Remove an id-listener. Returns `false` if no listener was bound to
    /// `id`.
    pub fn remove_id_listener(&mut self, id: u32) -> bool {
        self.listeners.remove_id(id)
    }

    /// Remove a type-listener. Returns `false` if none was bound to
    /// `msg_type`.
    pub fn remove_type_listener(&mut self, msg_type: u32) -> bool {
        self.listeners.remove_type(msg_type)
    }

    /// Remove a generic listener by the handle [`TinyFrame::add_generic_listener`]
    /// returned.
    pub fn remove_generic_listener(&mut self, id: GenericListenerId) -> bool {
        self.listeners.remove_generic(id)
    }

    /// Reset an id-listener's TTL to its configured `timeout_ticks`,
    /// without waiting for a matching frame to arrive (spec.md §4.4).
    pub fn renew_id_listener(&mut self, id: u32) -> bool {
        self.listeners.renew_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::config::{FieldWidth, Role};
    use crate::listener::ListenerResult;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn loopback_config(role: Role) -> Config {
        Config::new(role)
            .with_widths(FieldWidth::One, FieldWidth::Two, FieldWidth::One)
            .with_checksum(ChecksumKind::Xor)
            .with_sof_byte(0x01)
    }

    #[test]
    fn send_then_accept_round_trips_through_a_shared_buffer() {
        let wire: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let wire_write = wire.clone();
        let sink = move |buf: &[u8]| -> usize {
            wire_write.borrow_mut().extend_from_slice(buf);
            buf.len()
        };
        let mut tf: TinyFrame<()> = TinyFrame::new(loopback_config(Role::Master), sink).unwrap();
        tf.send(&Msg::new(0x22, b"Hi".to_vec())).unwrap();

        let received: Rc<RefCell<Option<Frame>>> = Rc::new(RefCell::new(None));
        let received_write = received.clone();
        tf.add_generic_listener(
            Box::new(move |_tf, frame, _u| {
                *received_write.borrow_mut() = Some(frame.clone());
                ListenerResult::Close
            }),
            (),
        )
        .unwrap();

        let bytes = wire.borrow().clone();
        tf.accept_bytes(&bytes);

        let got = received.borrow().clone().expect("frame should have dispatched");
        assert_eq!(got.msg_type, 0x22);
        assert_eq!(got.data, b"Hi");
    }

    #[test]
    fn query_fails_and_writes_nothing_when_the_id_table_is_full() {
        // spec.md §4.5: "Registering an id-listener in query when the
        // table is full — the frame is not sent and false is returned."
        let cfg = loopback_config(Role::Master).with_listener_capacities(1, 10, 10);
        let written = Rc::new(RefCell::new(false));
        let written_w = written.clone();
        let sink = move |buf: &[u8]| -> usize {
            *written_w.borrow_mut() = true;
            buf.len()
        };
        let mut tf: TinyFrame<()> = TinyFrame::new(cfg, sink).unwrap();
        tf.add_id_listener(0xaa, Box::new(|_tf, _frame, _u| ListenerResult::Stay), 0, None, ())
            .unwrap();

        let result = tf.query(
            &Msg::new(0x10, b"ping".to_vec()),
            Box::new(|_tf, _frame, _u| ListenerResult::Close),
            10,
            None,
            (),
        );
        assert!(matches!(result, Err(Error::TableFull(Table::Id))));
        assert!(!*written.borrow());
    }
}
