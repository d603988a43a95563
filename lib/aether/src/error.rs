use std::fmt;

/// Classification of every failure mode that can surface across a component
/// boundary. Nothing in here carries control via panics or exceptions:
/// every fallible call returns a [`Result`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    // Input
    InvalidArgument,
    InvalidUsername,
    InvalidEmail,
    WeakPassword,

    // Auth
    InvalidCredentials,
    AuthenticationFailed,
    UserAlreadyExists,
    RateLimitExceeded,
    InvalidToken,
    TokenExpired,
    TokenRevoked,
    RefreshTokenExpired,

    // Gateway
    GatewayNotStarted,
    GatewayAlreadyStarted,
    SessionNotFound,
    ConnectionLimitReached,
    ClientNotAuthenticated,
    GatewayRateLimited,
    MigrationFailed,

    // Network
    InvalidMessage,
    SendFailed,
    ListenFailed,
    NetworkError,

    // Plugin
    PluginNotFound,
    PluginAlreadyLoaded,
    PluginLoadFailed,
    PluginInitFailed,
    PluginInvalidState,
    PluginVersionMismatch,
    DependencyError,
    HotReloadDisabled,
    HotReloadFailed,
    StateSerializationFailed,
    StateDeserializationFailed,

    // Logger
    LoggerError,
    LoggerNotInitialized,
    LoggerFlushFailed,

    // Generic
    NotFound,
    AlreadyExists,
    InvalidBinaryData,
    InvalidJsonData,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A `(kind, message)` pair. Internal failures of one subsystem used by
/// another are wrapped here with a component-specific kind and the original
/// message appended, rather than losing context.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an upstream error, preserving its message and attaching a new
    /// kind meaningful to the wrapping component.
    pub fn wrap(kind: ErrorKind, source: &Error) -> Self {
        Error {
            kind,
            message: format!("{}: {}", source.kind, source.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
