use thiserror::Error;
use tonic::Status;

/// Errors raised while wiring the gRPC transport or the node server.
#[derive(Error, Debug)]
pub enum GrpcError {
    #[error("Invalid endpoint '{uri}': {source}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl From<GrpcError> for Status {
    fn from(err: GrpcError) -> Self {
        match err {
            GrpcError::UnknownMethod(name) => {
                Status::unimplemented(format!("Unknown method '{name}'"))
            }
            other => Status::internal(other.to_string()),
        }
    }
}
