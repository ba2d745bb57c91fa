//! Client options shared by subcommands.

use std::time::Duration;

use clap::Args;

use confsync_client::{ClientConfig, ReconnectPolicy};

/// Client tuning options.
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Notifications buffered per listener
    #[arg(long, default_value_t = confsync_client::config::DEFAULT_LISTENER_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Upstream open timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub open_timeout_ms: u64,

    /// First reconnect delay in milliseconds
    #[arg(long, default_value_t = 250)]
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub reconnect_cap_ms: u64,

    /// Give up after this many failed reconnects
    #[arg(long)]
    pub max_reconnects: Option<u32>,
}

impl From<&ClientArgs> for ClientConfig {
    fn from(args: &ClientArgs) -> Self {
        let mut policy = ReconnectPolicy::new(
            Duration::from_millis(args.reconnect_base_ms),
            Duration::from_millis(args.reconnect_cap_ms),
        );
        if let Some(max) = args.max_reconnects {
            policy = policy.with_max_attempts(max);
        }

        ClientConfig::new()
            .with_listener_queue_capacity(args.queue_capacity)
            .with_open_timeout(Duration::from_millis(args.open_timeout_ms))
            .with_reconnect(policy)
    }
}
