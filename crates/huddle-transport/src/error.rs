/// Transport-level errors.
///
/// Everything here is a per-endpoint fault: the caller recovers by
/// reporting a failed connection or restarting its listener, never by
/// tearing down the process.
#[derive(Debug, thiserror::Error)]
pub enum HuddleTransportError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("listener closed")]
    ListenerClosed,

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no endpoint listening at {target}")]
    Unreachable { target: String },
}
