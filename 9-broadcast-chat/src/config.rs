use std::net::SocketAddr;

use clap::ValueEnum;

use crate::cli::ServeArgs;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:9000";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What happens to a recipient when a line cannot be delivered to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DeliveryFailurePolicy {
    /// Log and move on. The recipient stays registered until its own read
    /// fails, so its leave announcement may come much later.
    #[default]
    Ignore,
    /// Hang up on the recipient. Its session tears down immediately and
    /// announces the leave.
    Evict,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub delivery_failure: DeliveryFailurePolicy,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
            delivery_failure: DeliveryFailurePolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: args.listen,
            delivery_failure: args.on_delivery_failure,
            queue_capacity: args.queue_capacity,
        }
    }
}
