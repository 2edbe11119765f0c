use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod pipe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single packet.
    Send(SendArgs),
    /// Listen, authenticate clients, and print received packets.
    Listen(ListenArgs),
    /// Connect and echo DATA packets back to their sender.
    Echo(EchoArgs),
    /// Forward packets between two relay endpoints.
    Pipe(PipeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Pipe(args) => pipe::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Relay address to connect to (host:port).
    pub addr: String,
    /// Endpoint name to authenticate as (empty skips authentication).
    #[arg(long, short = 'n', default_value = "")]
    pub name: String,
    /// Recipient endpoint name.
    #[arg(long, default_value = "")]
    pub to: String,
    /// Packet type.
    #[arg(long = "type", short = 't', default_value = "DATA")]
    pub packet_type: String,
    /// Inline payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file. When neither --data nor --file is given the
    /// payload is read from stdin.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response packet and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum frame size for this connection.
    #[arg(long)]
    pub mtu: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Only print packets of this type.
    #[arg(long = "type", short = 't')]
    pub packet_type: Option<String>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Maximum frame size for accepted connections.
    #[arg(long)]
    pub mtu: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Relay address to connect to (host:port).
    pub addr: String,
    /// Endpoint name to authenticate as.
    #[arg(long, short = 'n')]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct PipeArgs {
    /// Address packets are read from (host:port).
    pub input: String,
    /// Address packets are forwarded to (host:port).
    pub output: String,
    /// Only forward packets of this type; everything else is dropped.
    #[arg(long)]
    pub accept_type: Option<String>,
    /// Maximum frame size for both ends.
    #[arg(long)]
    pub mtu: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
