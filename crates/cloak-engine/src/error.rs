use thiserror::Error;
use tracing::error;

/// Input the engine refuses. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message has no content and no attachment")]
    EmptyContent,

    #[error("content is longer than {max} characters")]
    ContentTooLong { max: usize },

    #[error("attachment rejected: {0}")]
    AttachmentRejected(String),

    #[error("nothing is staged for confirmation")]
    NothingStaged,

    #[error("handles are 3-32 characters of letters, digits, '_' or '.'")]
    InvalidHandle,

    #[error("passwords must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("you cannot do that to yourself")]
    SelfTarget,

    #[error("account is not suspended")]
    NotSuspended,

    #[error("an appeal is already waiting for review")]
    AppealAlreadyPending,
}

#[derive(Debug, Error)]
pub enum CloakError {
    #[error("not signed in")]
    Unauthenticated,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("you have already reported this user")]
    DuplicateReport,

    #[error("account is suspended")]
    AccountSuspended,

    #[error("not allowed")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("already a member")]
    AlreadyMember,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username is taken")]
    HandleTaken,

    #[error("appeal has already been reviewed")]
    AppealAlreadyReviewed,

    #[error("service unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl CloakError {
    /// Only infrastructure failures get a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloakError::UpstreamUnavailable(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CloakError::Unauthenticated => "unauthenticated",
            CloakError::Validation(ValidationError::EmptyContent) => "empty_content",
            CloakError::Validation(ValidationError::AttachmentRejected(_)) => "attachment_rejected",
            CloakError::Validation(_) => "validation_error",
            CloakError::DuplicateReport => "duplicate_report",
            CloakError::AccountSuspended => "account_suspended",
            CloakError::Forbidden => "forbidden",
            CloakError::NotFound(_) => "not_found",
            CloakError::AlreadyMember => "already_member",
            CloakError::InvalidCredentials => "invalid_credentials",
            CloakError::HandleTaken => "handle_taken",
            CloakError::AppealAlreadyReviewed => "appeal_already_reviewed",
            CloakError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

/// Store and blob failures surface as `UpstreamUnavailable`.
impl From<anyhow::Error> for CloakError {
    fn from(err: anyhow::Error) -> Self {
        error!("Upstream failure: {:#}", err);
        CloakError::UpstreamUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CloakError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!("Blocking task failed: {}", err);
        CloakError::UpstreamUnavailable("background task failed".into())
    }
}

pub type Result<T> = std::result::Result<T, CloakError>;
