//! Error taxonomy for listener startup and the log sink

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecoyError {
    /// Privileged port without privilege. Kept apart from other bind
    /// failures so the diagnostic stays actionable for the operator.
    #[error("permission denied binding port {port}: {source} (use a port above 1024 or grant CAP_NET_BIND_SERVICE)")]
    BindPermission {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("log sink unavailable at {path}: {source}")]
    Sink {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no listener could be started")]
    NoListeners,
}
