use relaykit_client::{ClientError, RelayClient};

use crate::cmd::EchoArgs;
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// Connect as a named endpoint and echo every DATA packet back to its
/// sender as ECHO, printing everything received along the way.
pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = RelayClient::connect(&args.name, &args.addr)
        .map_err(|err| client_error("connect failed", err))?;
    tracing::info!(name = %args.name, addr = %args.addr, "echo client connected");

    loop {
        let packet = match client.recv_packet() {
            Ok(packet) => packet,
            Err(ClientError::Disconnected) => return Ok(SUCCESS),
            Err(err) => return Err(client_error("receive failed", err)),
        };

        if packet.type_is("DATA") {
            let sender = packet.local_str().into_owned();
            client
                .send_data("ECHO", &sender, packet.payload.as_ref())
                .map_err(|err| client_error("echo failed", err))?;
            tracing::debug!(to = %sender, bytes = packet.payload.len(), "echoed packet");
        }

        print_packet(&packet, format);
    }
}
