//! Framed-message relay protocol over TCP sockets and raw descriptors.
//!
//! relaykit lets peers exchange typed, addressed packets over any
//! byte-stream transport, authenticate endpoint names on connect, and run
//! background forwarders that filter or rewrite traffic in flight.
//!
//! # Crate Structure
//!
//! - [`packet`] — Wire format and (de)serialization
//! - [`transport`] — Byte-stream transport abstraction (TCP, raw fds)
//! - [`client`] — Packet-level client, listener, and relay pipe

/// Re-export packet types.
pub mod packet {
    pub use relaykit_packet::*;
}

/// Re-export transport types.
pub mod transport {
    pub use relaykit_transport::*;
}

/// Re-export client types.
pub mod client {
    pub use relaykit_client::*;
}
