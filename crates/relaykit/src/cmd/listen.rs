use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relaykit_client::{ClientConfig, ClientError, RelayListener};

use crate::cmd::ListenArgs;
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        mtu: args.mtu.unwrap_or_else(|| ClientConfig::default().mtu),
    };
    let listener = RelayListener::bind_with_config(&args.addr, &config)
        .map_err(|err| client_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let (mut peer, name) = match listener.accept() {
            Ok(accepted) => accepted,
            // A failed handshake only poisons that one connection.
            Err(ClientError::Auth(reason)) => {
                tracing::warn!(%reason, "rejected connection");
                continue;
            }
            Err(err) => return Err(client_error("accept failed", err)),
        };
        tracing::info!(peer = %name, "client connected");

        while running.load(Ordering::SeqCst) {
            let packet = match peer.recv_packet() {
                Ok(packet) => packet,
                Err(ClientError::Disconnected) => break,
                Err(err) => return Err(client_error("receive failed", err)),
            };

            if let Some(wanted) = &args.packet_type {
                if !packet.type_is(wanted) {
                    continue;
                }
            }

            print_packet(&packet, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
