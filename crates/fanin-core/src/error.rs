use thiserror::Error;

/// Failure to decode bytes received from the network.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] prost::DecodeError),

    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("{message} is missing required field '{field}'")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("unsupported subject '{0}'")]
    UnsupportedSubject(String),
}
