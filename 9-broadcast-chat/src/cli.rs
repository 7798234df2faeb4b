use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_LISTEN, DEFAULT_QUEUE_CAPACITY, DeliveryFailurePolicy};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying each line to every other client.
    Serve(ServeArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// What to do with a client whose delivery fails.
    #[arg(long, value_enum, default_value_t = DeliveryFailurePolicy::Ignore)]
    pub on_delivery_failure: DeliveryFailurePolicy,

    /// Events buffered between sessions and the broadcaster.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name announced to the room. Empty falls back to your address.
    #[arg(default_value = "")]
    pub name: String,

    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:9000")]
    pub server: SocketAddr,
}
