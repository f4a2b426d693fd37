//! Self-contained send/accept loopback demo.
//!
//! Builds two `TinyFrame` instances - a master and a slave - bridged by a
//! shared byte queue standing in for a wire, the same shape as the original
//! C library's demos, which loop `TF_WriteImpl` straight back into
//! `TF_Accept` (see `examples/original_source/demo/simple_multipart/test.c`).
//! A real instance can't feed its own sink into its own `accept` (that would
//! be a live `&mut self` borrow while already inside a `&mut self` call), so
//! this demo uses two instances instead, exactly as two real peers would.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;

use tinyframe::{Config, ListenerResult, Msg, Role, TinyFrame};

const TYPE_PING: u32 = 0x10;
const TYPE_PONG: u32 = 0x11;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Verbosity (repeat for more: -v, -vv, -vvv).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Text to send as the ping payload.
    #[arg(long, default_value = "ping")]
    message: String,
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("tinyframe")
        .quiet(false)
        .verbosity(opt.verbose as usize)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let wire_to_slave: Rc<RefCell<VecDeque<u8>>> = Rc::new(RefCell::new(VecDeque::new()));
    let wire_to_master: Rc<RefCell<VecDeque<u8>>> = Rc::new(RefCell::new(VecDeque::new()));

    let to_slave = wire_to_slave.clone();
    let master_sink = move |buf: &[u8]| -> usize {
        to_slave.borrow_mut().extend(buf.iter().copied());
        buf.len()
    };
    let to_master = wire_to_master.clone();
    let slave_sink = move |buf: &[u8]| -> usize {
        to_master.borrow_mut().extend(buf.iter().copied());
        buf.len()
    };

    let mut master: TinyFrame<()> = TinyFrame::new(Config::new(Role::Master), master_sink)?;
    let mut slave: TinyFrame<()> = TinyFrame::new(Config::new(Role::Slave), slave_sink)?;

    slave.add_generic_listener(
        Box::new(|tf, frame, _u| {
            log::info!("slave received type={:#x} data={:?}", frame.msg_type, frame.data);
            if frame.msg_type == TYPE_PING {
                let reply = Msg::new(TYPE_PONG, b"pong".to_vec()).with_id(frame.id);
                tf.respond(&reply).expect("respond should succeed");
            }
            ListenerResult::Stay
        }),
        (),
    )?;

    master.query(
        &Msg::new(TYPE_PING, opt.message.clone().into_bytes()),
        Box::new(|_tf, frame, _u| {
            println!(
                "master got reply: type={:#x} data={:?}",
                frame.msg_type,
                String::from_utf8_lossy(&frame.data)
            );
            ListenerResult::Close
        }),
        50,
        Some(Box::new(|_tf, id| {
            log::warn!("query to id={id:#x} timed out with no reply");
        })),
        (),
    )?;

    // Ship the ping across, let the slave dispatch and respond.
    let ping_bytes: Vec<u8> = wire_to_slave.borrow_mut().drain(..).collect();
    slave.accept_bytes(&ping_bytes);

    // Ship the pong back, let the master dispatch to its query handler.
    let pong_bytes: Vec<u8> = wire_to_master.borrow_mut().drain(..).collect();
    master.accept_bytes(&pong_bytes);

    Ok(())
}
