#![warn(missing_docs)]
/*! TinyFrame: a compact framing and multiplexing protocol for
byte-oriented transports.

A single logical frame -

```text
[SOF?] [ID] [LEN] [TYPE] [HEADER_CKSUM] [PAYLOAD...] [PAYLOAD_CKSUM]
```

- is built from five pieces, each its own module: a pluggable
[`checksum`] algebra, a fixed-width big-endian [`codec`], a byte-fed
resynchronizing [`parser`], an id/type/generic [`listener`] registry with
TTL-based eviction, and a [`sender`] that handles single, chunked, and
multipart sends under a transmitter lock. [`tf::TinyFrame`] wires all five
together into one instance.

This crate has no opinion on the transport: a [`sink::WriteSink`] writes
encoded bytes wherever they need to go (UART, socket, pipe, ...), and bytes
come back in one at a time through [`tf::TinyFrame::accept`]. Nothing here
retries, acknowledges, retransmits, or routes - that's left to the
application, same as the original C library this is patterned on.

# Example

```
use tinyframe::{Config, Msg, Role, TinyFrame};

let mut tf: TinyFrame<()> = TinyFrame::new(Config::new(Role::Master), |buf: &[u8]| buf.len())
    .expect("default config is always valid");
tf.send(&Msg::new(0x01, b"hello".to_vec())).unwrap();
```

## Links

* Original C library: `eternal-echo/TinyFrame`
*/

pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod listener;
pub mod parser;
pub mod sender;
pub mod sink;
pub mod tf;

pub use checksum::{ChecksumAlgorithm, ChecksumKind};
pub use config::{Config, FieldWidth, Role};
pub use error::{ConfigError, Error, Result};
pub use frame::{Frame, Msg};
pub use listener::{GenericListenerId, Handler, ListenerResult, Table, TimeoutHandler};
pub use parser::RxStats;
pub use sink::{NoopLock, TxLock, WriteSink};
pub use tf::TinyFrame;
