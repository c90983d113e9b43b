//! Error types for Arrow Flight operations

use tabula_core::CoreError;
use thiserror::Error;
use tonic::Code;

/// Message carried by `Unavailable` statuses from a server that has shut down
pub const SERVER_CLOSED_MESSAGE: &str = "flight server is closed";

/// Errors that can occur during Flight operations
#[derive(Debug, Error)]
pub enum FlightError {
    /// Ticket is not registered on the server
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Ticket registered twice
    #[error("Duplicate ticket: {0}")]
    DuplicateTicket(String),

    /// The server rejected the request
    #[error("Request error: {0}")]
    RequestError(String),

    /// Failed to reach the server, or lost the connection to it
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The client was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server was shut down
    #[error("Server closed")]
    ServerClosed,

    /// A dataset producer failed
    #[error("Dataset error: {0}")]
    DatasetError(#[from] CoreError),

    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Arrow Flight encode/decode error
    #[error("Flight error: {0}")]
    FlightDecodeError(String),

    /// gRPC status not covered by the other variants
    #[error("gRPC error ({code}): {message}")]
    GrpcError { code: Code, message: String },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlightError {
    /// Classify a status received from the server
    pub fn from_status(status: &tonic::Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument | Code::NotFound => FlightError::RequestError(message),
            Code::Unavailable if message == SERVER_CLOSED_MESSAGE => FlightError::ServerClosed,
            Code::Unavailable => FlightError::ConnectionError(message),
            code => FlightError::GrpcError { code, message },
        }
    }
}

impl From<tonic::transport::Error> for FlightError {
    fn from(err: tonic::transport::Error) -> Self {
        FlightError::ConnectionError(err.to_string())
    }
}

impl From<tonic::Status> for FlightError {
    fn from(status: tonic::Status) -> Self {
        FlightError::from_status(&status)
    }
}

impl From<arrow_flight::error::FlightError> for FlightError {
    fn from(err: arrow_flight::error::FlightError) -> Self {
        match err {
            arrow_flight::error::FlightError::Tonic(status) => FlightError::from_status(&status),
            arrow_flight::error::FlightError::Arrow(e) => FlightError::ArrowError(e),
            other => FlightError::FlightDecodeError(other.to_string()),
        }
    }
}

impl From<FlightError> for tonic::Status {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::TicketNotFound(msg) => {
                tonic::Status::invalid_argument(format!("Ticket not found: {}", msg))
            }
            FlightError::DuplicateTicket(msg) => tonic::Status::already_exists(msg),
            FlightError::RequestError(msg) => tonic::Status::invalid_argument(msg),
            FlightError::ConnectionError(msg) => tonic::Status::unavailable(msg),
            FlightError::ConnectionClosed => tonic::Status::unavailable("connection closed"),
            FlightError::ServerClosed => tonic::Status::unavailable(SERVER_CLOSED_MESSAGE),
            FlightError::DatasetError(e) => tonic::Status::internal(e.to_string()),
            FlightError::ArrowError(e) => tonic::Status::internal(e.to_string()),
            FlightError::FlightDecodeError(msg) => tonic::Status::internal(msg),
            FlightError::GrpcError { code, message } => tonic::Status::new(code, message),
            FlightError::IoError(e) => tonic::Status::internal(e.to_string()),
            FlightError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
            FlightError::Internal(msg) => tonic::Status::internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_not_found_round_trips_as_request_error() {
        let status = tonic::Status::from(FlightError::TicketNotFound("nope".into()));
        assert_eq!(status.code(), Code::InvalidArgument);

        match FlightError::from(status) {
            FlightError::RequestError(msg) => assert!(msg.contains("nope")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_server_closed_round_trips() {
        let status = tonic::Status::from(FlightError::ServerClosed);
        assert!(matches!(FlightError::from(status), FlightError::ServerClosed));
    }

    #[test]
    fn test_transport_unavailable_is_connection_error() {
        let err = FlightError::from(tonic::Status::unavailable("tcp connect error"));
        assert!(matches!(err, FlightError::ConnectionError(msg) if msg == "tcp connect error"));
    }

    #[test]
    fn test_unclassified_status_is_grpc_error() {
        let err = FlightError::from(tonic::Status::permission_denied("no"));
        assert!(matches!(
            err,
            FlightError::GrpcError {
                code: Code::PermissionDenied,
                ..
            }
        ));
    }
}
