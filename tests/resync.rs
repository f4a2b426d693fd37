//! P2 (resync): arbitrary garbage before a valid frame must never prevent
//! that frame from eventually being dispatched, given SOF framing.
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use rand::Rng;
use tinyframe::{Config, Frame, ListenerResult, Msg, Role, TinyFrame};

fn wire_sink() -> (Rc<RefCell<Vec<u8>>>, impl FnMut(&[u8]) -> usize) {
    let wire: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let w = wire.clone();
    let sink = move |buf: &[u8]| -> usize {
        w.borrow_mut().extend_from_slice(buf);
        buf.len()
    };
    (wire, sink)
}

#[test]
fn garbage_of_varying_length_never_blocks_the_next_valid_frame() -> Result<()> {
    let mut rng = rand::rng();
    for garbage_len in 0..64 {
        let (wire, sink) = wire_sink();
        let mut tf: TinyFrame<()> = TinyFrame::new(Config::new(Role::Master), sink)?;
        tf.send(&Msg::new(0x22, b"resync".to_vec()))?;
        let valid = wire.borrow().clone();

        let garbage: Vec<u8> = (0..garbage_len).map(|_| rng.random::<u8>()).collect();
        let mut stream = garbage;
        stream.extend_from_slice(&valid);

        let received: Rc<RefCell<Vec<Frame>>> = Rc::new(RefCell::new(Vec::new()));
        let received_w = received.clone();
        tf.add_generic_listener(
            Box::new(move |_tf, frame, _u| {
                received_w.borrow_mut().push(frame.clone());
                ListenerResult::Stay
            }),
            (),
        )?;
        tf.accept_bytes(&stream);

        let got = received.borrow();
        assert_eq!(got.len(), 1, "garbage_len={garbage_len} should still yield exactly one frame");
        assert_eq!(got[0].data, b"resync");
    }
    Ok(())
}

#[test]
fn single_bit_flip_in_payload_is_never_delivered() -> Result<()> {
    let (wire, sink) = wire_sink();
    let mut tf: TinyFrame<()> = TinyFrame::new(Config::new(Role::Master), sink)?;
    tf.send(&Msg::new(0x22, b"Hi there".to_vec()))?;
    let base = wire.borrow().clone();

    // Header is [SOF][ID][LEN_hi][LEN_lo][TYPE][HEADER_CKSUM]; payload
    // starts right after, here at offset 6.
    let payload_start = 6;
    for byte_idx in payload_start..payload_start + 8 {
        for bit in 0..8u8 {
            let mut corrupt = base.clone();
            corrupt[byte_idx] ^= 1 << bit;

            let delivered = Rc::new(RefCell::new(false));
            let delivered_w = delivered.clone();
            let (_discard_wire, discard_sink) = wire_sink();
            let mut peer: TinyFrame<()> = TinyFrame::new(Config::new(Role::Slave), discard_sink)?;
            peer.add_generic_listener(
                Box::new(move |_tf, _frame, _u| {
                    *delivered_w.borrow_mut() = true;
                    ListenerResult::Stay
                }),
                (),
            )?;
            peer.accept_bytes(&corrupt);
            assert!(
                !*delivered.borrow(),
                "single-bit flip at byte {byte_idx} bit {bit} was delivered despite XOR checksum"
            );
        }
    }
    Ok(())
}
