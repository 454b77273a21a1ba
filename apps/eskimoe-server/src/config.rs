use std::time::Duration;

use crate::models::server::ServerMode;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Display name of the server. ASCII letters only, at most 64 characters.
    pub name: String,
    /// Welcome message shown to visitors.
    pub message: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Unique id of the member who owns this server.
    pub owner_id: String,
    /// Secret the owner must present when joining.
    pub owner_token: String,
    /// PostgreSQL connection string. When absent the in-memory store is used.
    pub database_url: Option<String>,
    /// Admission mode applied to the server record on startup.
    pub mode: ServerMode,
    /// Required when `mode` is `passphrase`.
    pub passphrase: Option<String>,
    /// Per-connection outbound queue capacity, in frames.
    pub hub_outbound_buffer: usize,
    /// Capacity of the hub's broadcast submission queue.
    pub hub_broadcast_queue: usize,
    /// Deadline for a single websocket write.
    pub ws_write_timeout: Duration,
}

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_MESSAGE_LEN: usize = 256;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing
    /// or a value is out of range.
    pub fn from_env() -> Self {
        let name = std::env::var("NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Eskimoe".to_string());
        if let Err(reason) = validate_name(&name) {
            panic!("NAME {reason}");
        }

        let message = std::env::var("MESSAGE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Eskimoe Chat Server".to_string());
        if message.chars().count() > MAX_MESSAGE_LEN {
            panic!("MESSAGE must be at most {MAX_MESSAGE_LEN} characters");
        }

        let mode = match std::env::var("SERVER_MODE") {
            Ok(raw) if !raw.is_empty() => raw
                .parse::<ServerMode>()
                .unwrap_or_else(|_| panic!("SERVER_MODE must be open, invite_only or passphrase")),
            _ => ServerMode::Open,
        };
        let passphrase = std::env::var("SERVER_PASSPHRASE")
            .ok()
            .filter(|s| !s.is_empty());
        if mode == ServerMode::Passphrase && passphrase.is_none() {
            panic!("SERVER_PASSPHRASE env var is required when SERVER_MODE=passphrase");
        }

        Self {
            name,
            message,
            port: parsed_var("PORT", 8000),
            owner_id: required_var("OWNER_ID"),
            owner_token: required_var("OWNER_TOKEN"),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            mode,
            passphrase,
            hub_outbound_buffer: parsed_var("HUB_OUTBOUND_BUFFER", 64).max(1),
            hub_broadcast_queue: parsed_var("HUB_BROADCAST_QUEUE", 4096).max(1),
            ws_write_timeout: Duration::from_millis(parsed_var("WS_WRITE_TIMEOUT_MS", 5000)),
        }
    }
}

/// Checks a server display name.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err("must be between 1 and 64 characters");
    }
    if !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err("must contain only letters");
    }
    Ok(())
}

fn required_var(name: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} env var has an invalid value: {raw}")),
        _ => default,
    }
}
