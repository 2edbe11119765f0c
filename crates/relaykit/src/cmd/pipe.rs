use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relaykit_client::{ClientConfig, RelayPipe, Tap};

use crate::cmd::PipeArgs;
use crate::exit::{client_error, io_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};

/// Connect both endpoints raw (no authentication, like the pipe's own
/// anonymous clients) and forward packets until interrupted.
pub fn run(args: PipeArgs) -> CliResult<i32> {
    let input = connect(&args.input)?;
    let output = connect(&args.output)?;

    let tap = args.accept_type.clone().map(|wanted| -> Tap {
        Box::new(move |packet| packet.type_is(&wanted))
    });

    let config = ClientConfig {
        mtu: args.mtu.unwrap_or_else(|| ClientConfig::default().mtu),
    };
    let pipe = RelayPipe::with_config(input.into(), output.into(), tap, &config)
        .map_err(|err| client_error("pipe setup failed", err))?;
    tracing::info!(input = %args.input, output = %args.output, "pipe running");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        if let Some(failure) = pipe.take_failure() {
            pipe.shutdown();
            return Err(CliError::new(FAILURE, format!("pipe stopped: {failure:?}")));
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    pipe.shutdown();
    Ok(SUCCESS)
}

fn connect(addr: &str) -> CliResult<TcpStream> {
    let stream =
        TcpStream::connect(addr).map_err(|err| io_error(&format!("connect {addr}"), err))?;
    stream
        .set_nodelay(true)
        .map_err(|err| io_error("set_nodelay", err))?;
    Ok(stream)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
