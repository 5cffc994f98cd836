//! Connection configuration.

use std::sync::Arc;
use std::time::Duration;

use tdslink_protocol::ServerMessage;

/// Handler invoked for every INFO and ERROR message the server sends.
///
/// When installed, server errors no longer fail the statement; they are
/// reported here and the statement drains normally.
pub type MessageHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Handler invoked for every DONE token with a valid row count.
pub type CountHandler = Arc<dyn Fn(u64, u16) + Send + Sync>;

/// Transport encryption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// No TLS, if the server permits it.
    Off,
    /// TLS when the server supports it.
    #[default]
    On,
    /// TLS or fail.
    Required,
}

/// Client configuration.
#[derive(Clone)]
pub struct Config {
    /// Server hostname or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Username for SQL authentication.
    pub user: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Application name reported at login.
    pub app_name: String,
    /// Initial database.
    pub database: Option<String>,
    /// Encryption policy.
    pub encryption: Encryption,
    /// Verify the server certificate chain.
    pub check_certificate: bool,
    /// Multiplex logical sessions over the connection (MARS).
    pub enable_mars: bool,
    /// Outgoing packet pacing, packets per second.
    pub rate_limit: Option<u32>,
    /// Declare read-only application intent at login.
    pub read_only_intent: bool,
    /// Deadline for every wait on a server reply. `None` waits forever; an
    /// elapsed deadline cancels the statement.
    pub command_timeout: Option<Duration>,
    pub(crate) message_handler: Option<MessageHandler>,
    pub(crate) count_handler: Option<CountHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            user: String::new(),
            password: String::new(),
            app_name: "tdslink".to_string(),
            database: None,
            encryption: Encryption::default(),
            check_certificate: true,
            enable_mars: false,
            rate_limit: None,
            read_only_intent: false,
            command_timeout: None,
            message_handler: None,
            count_handler: None,
        }
    }
}

impl Config {
    /// Start a configuration for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the port (default 1433).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the encryption policy.
    #[must_use]
    pub fn encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Enable or disable server certificate verification.
    #[must_use]
    pub fn check_certificate(mut self, check: bool) -> Self {
        self.check_certificate = check;
        self
    }

    /// Enable MARS.
    #[must_use]
    pub fn enable_mars(mut self, enable: bool) -> Self {
        self.enable_mars = enable;
        self
    }

    /// Cap outgoing packets per second.
    #[must_use]
    pub fn rate_limit(mut self, packets_per_second: u32) -> Self {
        self.rate_limit = Some(packets_per_second);
        self
    }

    /// Declare read-only intent.
    #[must_use]
    pub fn read_only_intent(mut self, read_only: bool) -> Self {
        self.read_only_intent = read_only;
        self
    }

    /// Set the per-wait command deadline.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Install a handler for server INFO/ERROR messages.
    #[must_use]
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.message_handler = Some(Arc::new(handler));
        self
    }

    /// Install a handler for row counts.
    #[must_use]
    pub fn on_row_count<F>(mut self, handler: F) -> Self
    where
        F: Fn(u64, u16) + Send + Sync + 'static,
    {
        self.count_handler = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("encryption", &self.encryption)
            .field("check_certificate", &self.check_certificate)
            .field("enable_mars", &self.enable_mars)
            .field("rate_limit", &self.rate_limit)
            .field("read_only_intent", &self.read_only_intent)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
