//! Chunked multipart send demo.
//!
//! Mirrors `examples/original_source/demo/simple_multipart/test.c`: a long
//! message is committed via `send_multipart`, streamed through repeated
//! `multipart_payload` calls in fixed-size chunks, and finished with
//! `multipart_close`. A peer instance receives it as one ordinary assembled
//! frame - multipart is purely a transmit-side chunking concern.
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;

use tinyframe::{Config, ListenerResult, Msg, Role, TinyFrame};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Verbosity (repeat for more: -v, -vv, -vvv).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// How many bytes to send per `multipart_payload` call.
    #[arg(long, default_value_t = 16)]
    chunk_size: usize,

    /// Message type to tag the frame with.
    #[arg(long, default_value_t = 0x22)]
    msg_type: u32,
}

const ROMEO: &str = "THE TRAGEDY OF ROMEO AND JULIET\n\nby William Shakespeare\n";

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("tinyframe")
        .quiet(false)
        .verbosity(opt.verbose as usize)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;
    anyhow::ensure!(opt.chunk_size > 0, "chunk-size must be nonzero");

    let wire: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let wire_write = wire.clone();
    let sink = move |buf: &[u8]| -> usize {
        wire_write.borrow_mut().extend_from_slice(buf);
        buf.len()
    };
    let mut sender: TinyFrame<()> =
        TinyFrame::new(Config::new(Role::Master).with_max_payload_rx(ROMEO.len() + 16), sink)?;

    let received: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
    let received_write = received.clone();
    let mut receiver: TinyFrame<()> =
        TinyFrame::new(Config::new(Role::Slave).with_max_payload_rx(ROMEO.len() + 16), |_: &[u8]| 0usize)?;
    receiver.add_generic_listener(
        Box::new(move |_tf, frame, _u| {
            log::info!("receiver got {} bytes, type={:#x}", frame.data.len(), frame.msg_type);
            *received_write.borrow_mut() = Some(frame.data.clone());
            ListenerResult::Stay
        }),
        (),
    )?;

    println!("sending {} bytes in chunks of {}", ROMEO.len(), opt.chunk_size);
    // `.data` here only carries its *length* - send_multipart commits that
    // length to the wire as LEN but ignores the bytes themselves, which
    // arrive via the multipart_payload calls below.
    let open = Msg::new(opt.msg_type, vec![0u8; ROMEO.len()]);
    sender.send_multipart(&open)?;
    for chunk in ROMEO.as_bytes().chunks(opt.chunk_size) {
        sender.multipart_payload(chunk)?;
    }
    sender.multipart_close()?;

    let bytes: Vec<u8> = wire.borrow().clone();
    receiver.accept_bytes(&bytes);

    let got = received
        .borrow()
        .clone()
        .context("receiver never dispatched the multipart frame")?;
    anyhow::ensure!(got == ROMEO.as_bytes(), "payload mismatch after multipart transfer");
    println!("FILE TRANSFERRED OK ({} bytes)", got.len());
    Ok(())
}
