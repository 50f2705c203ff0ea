use thiserror::Error;

/// Unified error taxonomy for the Veltro core.
///
/// Every variant maps to an HTTP status code and a byte-exact JSON body
/// (see the pre-encoded response table). Handlers and middleware return
/// `CoreError`; the dispatcher's `ErrorHandler` is the only place a
/// variant is turned into bytes on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request too large")]
    RequestTooLarge,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("service unavailable")]
    ServiceUnavailable,
}

impl CoreError {
    /// Map to the HTTP status code this error is reported under.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::NotFound => 404,
            CoreError::MethodNotAllowed => 405,
            CoreError::BadRequest(_) => 400,
            CoreError::RequestTooLarge => 413,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden => 403,
            CoreError::Internal(_) => 500,
            CoreError::ServiceUnavailable => 503,
        }
    }

    /// Byte-exact pre-encoded JSON body for this error's canonical status,
    /// per the response table. Allocation-free: every body is a `'static`
    /// byte slice, never built with `format!`.
    pub fn to_json_body(&self) -> &'static [u8] {
        match self {
            CoreError::NotFound => br#"{"error":"Not Found"}"#,
            CoreError::MethodNotAllowed => br#"{"error":"Method Not Allowed"}"#,
            CoreError::BadRequest(_) => br#"{"error":"Bad Request"}"#,
            CoreError::RequestTooLarge => br#"{"error":"Payload Too Large"}"#,
            CoreError::Unauthorized => br#"{"error":"Unauthorized"}"#,
            CoreError::Forbidden => br#"{"error":"Forbidden"}"#,
            CoreError::Internal(_) => br#"{"error":"Internal Server Error"}"#,
            CoreError::ServiceUnavailable => br#"{"error":"Service Unavailable"}"#,
        }
    }
}
