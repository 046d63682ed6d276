//! Error taxonomy shared by every service.
//!
//! Each service owns its own `thiserror` enum. They all implement
//! [`ErrorCode`] so the HTTP layer and the logs can classify a failure
//! without knowing the concrete type.

/// Which party can fix a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-correctable: bad URL, empty image, unknown canvas code.
    Input,
    /// Malformed external data: bad log line, out-of-bounds event.
    Data,
    /// I/O that recovers on its own, such as a dropped feed connection.
    Transient,
    /// Setup failure that stops a canvas from being tracked.
    Fatal,
}

/// Grepable error code and classification for structured error responses.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn kind(&self) -> ErrorKind;

    fn retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
