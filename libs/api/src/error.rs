/// Status code attached to a failed service call.
///
/// Mirrors the canonical RPC status space the service reports, trimmed to
/// the codes the sample flows can meaningfully react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Referenced schema, topic or subscription does not exist.
    NotFound,
    /// Create call collided with an existing resource id.
    AlreadyExists,
    /// Malformed request: bad resource name, bad schema, bad payload.
    InvalidArgument,
    /// Caller is not allowed to perform the operation.
    PermissionDenied,
    /// Quota or flow-control limit hit.
    ResourceExhausted,
    /// Resource is in the wrong state for the call.
    FailedPrecondition,
    /// Concurrency conflict, caller may retry.
    Aborted,
    /// Service unreachable, transient.
    Unavailable,
    /// Call did not finish in time, transient.
    DeadlineExceeded,
    /// Call cancelled by the caller (e.g. client shut down).
    Cancelled,
    /// Anything else.
    Internal,
}

impl Code {
    /// Whether a client runtime may transparently retry a call that failed
    /// with this code.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Code::Unavailable
                | Code::DeadlineExceeded
                | Code::ResourceExhausted
                | Code::Aborted
                | Code::Internal
        )
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Code::NotFound => f.write_str("not_found"),
            Code::AlreadyExists => f.write_str("already_exists"),
            Code::InvalidArgument => f.write_str("invalid_argument"),
            Code::PermissionDenied => f.write_str("permission_denied"),
            Code::ResourceExhausted => f.write_str("resource_exhausted"),
            Code::FailedPrecondition => f.write_str("failed_precondition"),
            Code::Aborted => f.write_str("aborted"),
            Code::Unavailable => f.write_str("unavailable"),
            Code::DeadlineExceeded => f.write_str("deadline_exceeded"),
            Code::Cancelled => f.write_str("cancelled"),
            Code::Internal => f.write_str("internal"),
        }
    }
}

/// Unified error type for every capability trait method.
///
/// Carries a `Code` for categorization and a human-readable message.
/// Implementations pick the code; callers branch on it (not-found
/// handling, retry decisions) without parsing the message.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceError {
    code: Code,
    message: String,
}

impl ServiceError {
    pub fn new(code: Code, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(Code::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(Code::Internal, msg)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Prefix the message with call-site context, keeping the code.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self { code: self.code, message: format!("{ctx}: {}", self.message) }
    }
}

impl std::fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self { code: Code::Unavailable, message: e.to_string() }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self { code: Code::InvalidArgument, message: e.to_string() }
    }
}
