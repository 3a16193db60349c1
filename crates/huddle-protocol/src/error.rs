/// Engine-level errors.
///
/// Wraps transport errors and adds runtime-lifecycle variants. Peer-level
/// faults (read/write failures, bad auth) never surface here; they arrive
/// as events on the hub sink.
#[derive(Debug, thiserror::Error)]
pub enum HuddleProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] huddle_transport::HuddleTransportError),

    #[error("session runtime shut down")]
    RuntimeClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_runtime_closed() {
        assert_eq!(
            HuddleProtocolError::RuntimeClosed.to_string(),
            "session runtime shut down"
        );
    }

    #[test]
    fn display_wraps_transport() {
        let err: HuddleProtocolError = huddle_transport::HuddleTransportError::Unreachable {
            target: "garage".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "transport error: no endpoint listening at garage"
        );
    }
}
