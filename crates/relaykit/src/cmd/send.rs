use std::fs;
use std::io::Read;

use relaykit_client::{ClientConfig, RelayClient};

use crate::cmd::SendArgs;
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        mtu: args.mtu.unwrap_or_else(|| ClientConfig::default().mtu),
    };
    let mut client = RelayClient::connect_with_config(&args.name, &args.addr, &config)
        .map_err(|err| client_error("connect failed", err))?;

    let payload = resolve_payload(&args)?;
    client
        .send_data(&args.packet_type, &args.to, &payload)
        .map_err(|err| client_error("send failed", err))?;
    tracing::info!(
        bytes = payload.len(),
        to = %args.to,
        "packet sent"
    );

    if args.wait {
        let packet = client
            .recv_packet()
            .map_err(|err| client_error("receive failed", err))?;
        print_packet(&packet, format);
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    let mut payload = Vec::new();
    std::io::stdin()
        .read_to_end(&mut payload)
        .map_err(|err| crate::exit::io_error("failed reading stdin", err))?;
    Ok(payload)
}
