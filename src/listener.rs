/*! Listener registry & dispatch (spec.md §4.4).

Three fixed-capacity tables - id, type, generic - hold listeners matched in
that order, each table walked in registration order, with a handler result
other than [`ListenerResult::Next`] stopping the whole dispatch (spec.md §9
Open Question, resolved: `Next` crosses table boundaries uniformly, the
same way the original exhibits for generic listeners).

A listener's handler needs to be able to call back into the owning
[`crate::TinyFrame`] (to `respond`, register a follow-up listener, and so
on) - the same shape as the original's `listener(TinyFrame *tf, TF_Msg
*msg)`. Rust's ownership rules don't allow a table entry to be borrowed
while also handing out `&mut TinyFrame` to run it, so dispatch and `tick`
both pull the entry out of its slot first (an owned local, no longer
borrowed from `self`), call the handler with `&mut TinyFrame`, and decide
from the returned [`ListenerResult`] whether to put it back.
*/

use crate::frame::Frame;
use crate::tf::TinyFrame;

/// Outcome of a listener handler, controlling what dispatch does with the
/// entry afterwards (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerResult {
    /// Remove the listener. No timeout handler is fired - this is a normal
    /// close, distinct from an eviction by TTL.
    Close,
    /// Keep the listener as-is; `remaining_ticks` is untouched.
    Stay,
    /// Keep the listener and reset `remaining_ticks := timeout_ticks`.
    Renew,
    /// This listener declines the frame; dispatch continues to the next
    /// entry (within this table, then the next table).
    Next,
}

/// Which listener table an operation concerns. Used by
/// [`crate::Error::TableFull`] and by the per-tick timeout callback to say
/// which kind of key timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// The id-listener table.
    Id,
    /// The type-listener table.
    Type,
    /// The generic-listener table.
    Generic,
}

/// A handler: takes the owning instance (so it can `respond`, register
/// follow-up listeners, etc.) and the dispatched frame, plus this
/// listener's own userdata slot.
pub type Handler<U> = Box<dyn FnMut(&mut TinyFrame<U>, &Frame, &mut U) -> ListenerResult>;

/// A timeout callback, run once when a listener's TTL reaches zero.
pub type TimeoutHandler<U> = Box<dyn FnMut(&mut TinyFrame<U>, u32)>;

/// Opaque handle to a registered generic listener, returned by
/// `add_generic_listener` and needed to remove it again.
///
/// The original C API removes a generic listener by comparing function
/// pointers (`remove_generic_listener(handler)`); Rust closures aren't
/// comparable, so this crate hands back a stable slot handle instead - the
/// idiomatic substitute for "the same listener you just registered".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericListenerId(usize);

struct IdEntry<U> {
    id: u32,
    handler: Handler<U>,
    timeout_handler: Option<TimeoutHandler<U>>,
    timeout_ticks: u32,
    remaining_ticks: u32,
    userdata: U,
}

struct TypeEntry<U> {
    msg_type: u32,
    handler: Handler<U>,
    timeout_handler: Option<TimeoutHandler<U>>,
    timeout_ticks: u32,
    remaining_ticks: u32,
    userdata: U,
}

struct GenericEntry<U> {
    handler: Handler<U>,
    userdata: U,
}

/// The three listener tables. Each `Vec` is pre-sized to its configured
/// capacity and never grows past it - the Rust rendition of the original's
/// fixed-size C arrays (spec.md §9: "dynamic growth is explicitly out of
/// scope").
pub struct Listeners<U> {
    id_table: Vec<Option<IdEntry<U>>>,
    type_table: Vec<Option<TypeEntry<U>>>,
    generic_table: Vec<Option<GenericEntry<U>>>,
}

impl<U> Listeners<U> {
    pub(crate) fn new(max_id: usize, max_type: usize, max_generic: usize) -> Self {
        Listeners {
            id_table: (0..max_id).map(|_| None).collect(),
            type_table: (0..max_type).map(|_| None).collect(),
            generic_table: (0..max_generic).map(|_| None).collect(),
        }
    }

    /// `true` if any live id-listener is bound to `id` (used by the id
    /// allocator, I2).
    pub(crate) fn id_in_use(&self, id: u32) -> bool {
        self.id_table
            .iter()
            .any(|e| e.as_ref().is_some_and(|e| e.id == id))
    }

    pub(crate) fn add_id(
        &mut self,
        id: u32,
        handler: Handler<U>,
        timeout_ticks: u32,
        timeout_handler: Option<TimeoutHandler<U>>,
        userdata: U,
    ) -> Result<(), Table> {
        let slot = self
            .id_table
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(Table::Id)?;
        *slot = Some(IdEntry {
            id,
            handler,
            timeout_handler,
            timeout_ticks,
            remaining_ticks: timeout_ticks,
            userdata,
        });
        Ok(())
    }

    pub(crate) fn add_type(
        &mut self,
        msg_type: u32,
        handler: Handler<U>,
        timeout_ticks: u32,
        timeout_handler: Option<TimeoutHandler<U>>,
        userdata: U,
    ) -> Result<(), Table> {
        let slot = self
            .type_table
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(Table::Type)?;
        *slot = Some(TypeEntry {
            msg_type,
            handler,
            timeout_handler,
            timeout_ticks,
            remaining_ticks: timeout_ticks,
            userdata,
        });
        Ok(())
    }

    pub(crate) fn add_generic(
        &mut self,
        handler: Handler<U>,
        userdata: U,
    ) -> Result<GenericListenerId, Table> {
        let (idx, slot) = self
            .generic_table
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.is_none())
            .ok_or(Table::Generic)?;
        *slot = Some(GenericEntry { handler, userdata });
        Ok(GenericListenerId(idx))
    }

    pub(crate) fn remove_id(&mut self, id: u32) -> bool {
        if let Some(slot) = self.id_table.iter_mut().find(|e| {
            e.as_ref().is_some_and(|e| e.id == id)
        }) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_type(&mut self, msg_type: u32) -> bool {
        if let Some(slot) = self
            .type_table
            .iter_mut()
            .find(|e| e.as_ref().is_some_and(|e| e.msg_type == msg_type))
        {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_generic(&mut self, id: GenericListenerId) -> bool {
        match self.generic_table.get_mut(id.0) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn renew_id(&mut self, id: u32) -> bool {
        if let Some(Some(entry)) = self.id_table.iter_mut().find(|e| {
            e.as_ref().is_some_and(|e| e.id == id)
        }) {
            entry.remaining_ticks = entry.timeout_ticks;
            true
        } else {
            false
        }
    }
}

/// Run one `tick()` worth of TTL decrement over id/type listeners,
/// evicting any that reach zero and firing their timeout handler
/// (spec.md §4.4, P5). Generic listeners have no timeout and are
/// untouched.
pub(crate) fn tick<U>(tf: &mut TinyFrame<U>) {
    tick_table(tf, Table::Id);
    tick_table(tf, Table::Type);
}

fn tick_table<U>(tf: &mut TinyFrame<U>, which: Table) {
    let len = match which {
        Table::Id => tf.listeners.id_table.len(),
        Table::Type => tf.listeners.type_table.len(),
        Table::Generic => return,
    };
    for i in 0..len {
        let due = match which {
            Table::Id => tf.listeners.id_table[i]
                .as_mut()
                .filter(|e| e.timeout_ticks > 0)
                .map(|e| {
                    e.remaining_ticks = e.remaining_ticks.saturating_sub(1);
                    (e.remaining_ticks == 0, e.id)
                }),
            Table::Type => tf.listeners.type_table[i]
                .as_mut()
                .filter(|e| e.timeout_ticks > 0)
                .map(|e| {
                    e.remaining_ticks = e.remaining_ticks.saturating_sub(1);
                    (e.remaining_ticks == 0, e.msg_type)
                }),
            Table::Generic => None,
        };
        let Some((expired, key)) = due else { continue };
        if !expired {
            continue;
        }
        let mut timeout_handler = match which {
            Table::Id => tf.listeners.id_table[i].take().and_then(|e| e.timeout_handler),
            Table::Type => tf.listeners.type_table[i].take().and_then(|e| e.timeout_handler),
            Table::Generic => None,
        };
        if let Some(handler) = timeout_handler.as_mut() {
            handler(tf, key);
        }
        log::debug!("listener TTL expired: table={which:?} key={key}");
    }
}

/// Dispatch `frame` through the id, then type, then generic tables, in
/// registration order within each, stopping at the first entry whose
/// handler returns anything other than [`ListenerResult::Next`] (spec.md
/// §4.4, P4).
pub(crate) fn dispatch<U>(tf: &mut TinyFrame<U>, frame: &Frame) {
    if dispatch_id(tf, frame) {
        return;
    }
    if dispatch_type(tf, frame) {
        return;
    }
    dispatch_generic(tf, frame);
}

/// Returns `true` if dispatch should stop (a non-`Next` result was seen).
fn dispatch_id<U>(tf: &mut TinyFrame<U>, frame: &Frame) -> bool {
    let len = tf.listeners.id_table.len();
    for i in 0..len {
        let matches = tf.listeners.id_table[i]
            .as_ref()
            .is_some_and(|e| e.id == frame.id);
        if !matches {
            continue;
        }
        let Some(mut entry) = tf.listeners.id_table[i].take() else {
            continue;
        };
        let result = (entry.handler)(tf, frame, &mut entry.userdata);
        match result {
            ListenerResult::Close => {}
            ListenerResult::Stay => tf.listeners.id_table[i] = Some(entry),
            ListenerResult::Renew => {
                entry.remaining_ticks = entry.timeout_ticks;
                tf.listeners.id_table[i] = Some(entry);
            }
            ListenerResult::Next => {
                tf.listeners.id_table[i] = Some(entry);
                continue;
            }
        }
        return true;
    }
    false
}

fn dispatch_type<U>(tf: &mut TinyFrame<U>, frame: &Frame) -> bool {
    let len = tf.listeners.type_table.len();
    for i in 0..len {
        let matches = tf.listeners.type_table[i]
            .as_ref()
            .is_some_and(|e| e.msg_type == frame.msg_type);
        if !matches {
            continue;
        }
        let Some(mut entry) = tf.listeners.type_table[i].take() else {
            continue;
        };
        let result = (entry.handler)(tf, frame, &mut entry.userdata);
        match result {
            ListenerResult::Close => {}
            ListenerResult::Stay => tf.listeners.type_table[i] = Some(entry),
            ListenerResult::Renew => {
                entry.remaining_ticks = entry.timeout_ticks;
                tf.listeners.type_table[i] = Some(entry);
            }
            ListenerResult::Next => {
                tf.listeners.type_table[i] = Some(entry);
                continue;
            }
        }
        return true;
    }
    false
}

fn dispatch_generic<U>(tf: &mut TinyFrame<U>, frame: &Frame) -> bool {
    let len = tf.listeners.generic_table.len();
    for i in 0..len {
        let Some(mut entry) = tf.listeners.generic_table[i].take() else {
            continue;
        };
        let result = (entry.handler)(tf, frame, &mut entry.userdata);
        match result {
            ListenerResult::Close => {}
            ListenerResult::Stay | ListenerResult::Renew => {
                tf.listeners.generic_table[i] = Some(entry);
            }
            ListenerResult::Next => {
                tf.listeners.generic_table[i] = Some(entry);
                continue;
            }
        }
        return true;
    }
    false
}
