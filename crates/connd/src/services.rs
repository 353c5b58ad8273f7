//! Registry of the long-running services hosted by the daemon.
//!
//! Each service is started through a [`ServiceProvider`] the first time it is
//! needed, after the services it depends on. Services are stopped in the
//! reverse of the order they started in.

use thiserror::Error;

use connd_config::Config;
use strum::{Display, EnumString};

/// Services hosted by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServiceKind {
    /// Connection to the native mDNS resolver daemon.
    Connector,
    /// Network arbitration engine.
    Arbiter,
    /// Service discovery multiplexer.
    Discovery,
}

/// Error returned when parsing a [`ServiceKind`] fails.
pub type ServiceKindParseError = strum::ParseError;

impl ServiceKind {
    /// Every service, in start order.
    pub const ALL: [Self; 3] = [Self::Connector, Self::Arbiter, Self::Discovery];

    /// Services that must be running before this one starts.
    #[must_use]
    pub const fn dependencies(self) -> &'static [Self] {
        match self {
            Self::Connector | Self::Arbiter => &[],
            Self::Discovery => &[Self::Connector],
        }
    }
}

/// A service failed to start.
#[derive(Debug, Error)]
#[error("service {kind} failed to start: {message}")]
pub struct ServiceStartupError {
    /// Service that failed.
    pub kind: ServiceKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServiceStartupError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(kind: ServiceKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error wrapping the failure reported by the service.
    #[must_use]
    pub fn with_source(
        kind: ServiceKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Starts and stops the daemon's services.
pub trait ServiceProvider {
    /// Starts `kind`. Its dependencies are already running.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceStartupError`] when the service cannot be started.
    fn start_service(&mut self, kind: ServiceKind, config: &Config)
    -> Result<(), ServiceStartupError>;

    /// Stops a service previously started by this provider.
    fn stop_service(&mut self, kind: ServiceKind);
}

/// Tracks which services are running.
#[derive(Debug)]
pub struct ManagedServices<P> {
    config: Config,
    provider: P,
    started: Vec<ServiceKind>,
}

impl<P> ManagedServices<P> {
    /// Builds an empty registry over `provider`.
    #[must_use]
    pub const fn new(config: Config, provider: P) -> Self {
        Self {
            config,
            provider,
            started: Vec::new(),
        }
    }

    /// Resolved configuration handed to the provider.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Services currently running, in start order.
    #[must_use]
    pub fn started(&self) -> &[ServiceKind] {
        &self.started
    }

    /// Whether `kind` is running.
    #[must_use]
    pub fn is_started(&self, kind: ServiceKind) -> bool {
        self.started.contains(&kind)
    }

    /// Mutable access to the provider.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}

impl<P> ManagedServices<P>
where
    P: ServiceProvider,
{
    /// Starts `kind` and its dependencies unless already running.
    ///
    /// A failed start is not remembered, so the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns the first [`ServiceStartupError`] reported by the provider.
    pub fn ensure_started(&mut self, kind: ServiceKind) -> Result<(), ServiceStartupError> {
        if self.is_started(kind) {
            return Ok(());
        }
        for dependency in kind.dependencies() {
            self.ensure_started(*dependency)?;
        }
        self.provider.start_service(kind, &self.config)?;
        self.started.push(kind);
        Ok(())
    }

    /// Stops every running service, last started first, and returns the
    /// order in which they were stopped.
    pub fn stop_all(&mut self) -> Vec<ServiceKind> {
        let mut stopped = Vec::with_capacity(self.started.len());
        while let Some(kind) = self.started.pop() {
            self.provider.stop_service(kind);
            stopped.push(kind);
        }
        stopped
    }
}
