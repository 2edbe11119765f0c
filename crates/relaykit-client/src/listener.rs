use std::net::{SocketAddr, TcpListener};

use relaykit_packet::ENDPOINT_LEN;
use relaykit_transport::{TcpTransport, TransportError};
use tracing::{debug, info};

use crate::client::{ClientConfig, RelayClient};
use crate::error::{ClientError, Result};

/// Accept-side counterpart of the client's authentication handshake.
///
/// Accepts TCP connections, requires each to open with an `AUTH` packet
/// naming the peer, acknowledges it, and hands back the connected client
/// together with the authenticated name.
pub struct RelayListener {
    listener: TcpListener,
    config: ClientConfig,
}

impl RelayListener {
    /// Bind to `addr` (`host:port`).
    pub fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, &ClientConfig::default())
    }

    /// Bind with explicit configuration for accepted clients.
    pub fn bind_with_config(addr: &str, config: &ClientConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        info!(addr, "listening for relay clients");
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self
            .listener
            .local_addr()
            .map_err(TransportError::Io)?)
    }

    /// Accept one connection and run the server side of the handshake
    /// (blocking).
    ///
    /// Returns the connected client (anonymous on our side) and the peer's
    /// authenticated name. A connection that does not open with a valid
    /// `AUTH` packet is answered with `NACK` and rejected.
    pub fn accept(&self) -> Result<(RelayClient, String)> {
        let (stream, peer_addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer_addr, "accepted relay connection");

        let transport = TcpTransport::from_stream(stream)?;
        let mut client =
            RelayClient::with_transport("", Box::new(transport), false, &self.config)?;

        let hello = client
            .recv_packet()
            .map_err(|err| ClientError::Auth(format!("no greeting: {err}")))?;

        if !hello.type_is("AUTH") {
            let _ = client.send_data("NACK", "", b"");
            return Err(ClientError::Auth(format!(
                "expected AUTH greeting, got '{}'",
                hello.type_str()
            )));
        }

        let name = String::from_utf8_lossy(&hello.payload).into_owned();
        if name.is_empty() || name.len() > ENDPOINT_LEN {
            let _ = client.send_data("NACK", "", b"");
            return Err(ClientError::Auth(format!(
                "invalid endpoint name length: {}",
                name.len()
            )));
        }

        client.send_data("AUTH", &name, name.as_bytes())?;
        info!(peer = %name, "relay client authenticated");
        Ok((client, name))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn bind_local() -> (RelayListener, String) {
        let listener = RelayListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn handshake_roundtrip_over_tcp() {
        let (listener, addr) = bind_local();

        let server = thread::spawn(move || {
            let (mut peer, name) = listener.accept().unwrap();
            assert_eq!(name, "probe");
            let packet = peer.recv_packet().unwrap();
            assert_eq!(packet.local_str(), "probe");
            packet.payload.to_vec()
        });

        let mut client = RelayClient::connect("probe", &addr).unwrap();
        client.send_text("DATA", "sink", "over tcp").unwrap();

        assert_eq!(server.join().unwrap(), b"over tcp");
    }

    #[test]
    fn anonymous_greeting_rejected_with_nack() {
        let (listener, addr) = bind_local();

        let server = thread::spawn(move || listener.accept());

        // Skip the handshake and send a data packet straight away.
        let mut client = RelayClient::connect("", &addr).unwrap();
        client.send_text("DATA", "", "rude").unwrap();

        let err = server.join().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));

        // The peer is told why before the server hangs up.
        let nack = client.recv_packet().unwrap();
        assert!(nack.type_is("NACK"));
    }

    #[test]
    fn overlong_name_in_greeting_rejected() {
        let (listener, addr) = bind_local();

        let server = thread::spawn(move || listener.accept());

        // Hand-roll an AUTH whose payload is longer than a name may be;
        // Packet::new would truncate the *header* field, but the payload
        // carries the full string.
        let mut client = RelayClient::connect("", &addr).unwrap();
        client
            .send_data("AUTH", "", b"far-too-long-name")
            .unwrap();

        let err = server.join().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));
    }
}
