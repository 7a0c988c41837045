use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("not a swarm repository (run `sv init` first)")]
    NotInitialized,

    #[error("swarm already initialized in this repository")]
    AlreadyInitialized,

    #[error("not inside a git repository")]
    NotGitRepository,

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("task id '{0}' is ambiguous; matches: {1}")]
    TaskIdAmbiguous(String, String),

    #[error("invalid task id '{0}': {1}")]
    InvalidTaskId(String, String),

    #[error("task {0} is already in progress (held by '{1}')")]
    TaskClaimed(String, String),

    #[error("task {0} is blocked by unfinished dependencies: {1}")]
    TaskBlocked(String, String),

    #[error("invalid status transition: {0} -> {1}")]
    InvalidTransition(String, String),

    #[error("task {0} is held by '{1}', not '{2}' (pass --force to override)")]
    NotHolder(String, String, String),

    #[error(
        "task {0} has no passing validation since it was claimed; run `sv task validate` first or pass --force"
    )]
    ValidationRequired(String),

    #[error("'{0}' is not a queryable status (ready is derived; use `sv task ready`)")]
    InvalidStatusFilter(String),

    #[error("name '{0}' must be non-empty ASCII alphanumeric/hyphen/underscore")]
    InvalidName(String),

    #[error("agent name '{0}' is already registered")]
    NameTaken(String),

    #[error("topic '{0}' must be non-empty ASCII alphanumeric/hyphen/underscore")]
    InvalidTopic(String),

    #[error("message body must not be empty")]
    EmptyMessage,

    #[error("corrupt store file '{0}': {1}")]
    CorruptStore(String, String),

    #[error("working tree has conflicted paths: {0}")]
    CommitConflict(String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

impl SwarmError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::NotGitRepository => "not_git_repository",
            Self::TaskNotFound(_) => "task_not_found",
            Self::TaskIdAmbiguous(_, _) => "task_id_ambiguous",
            Self::InvalidTaskId(_, _) => "invalid_task_id",
            Self::TaskClaimed(_, _) => "task_claimed",
            Self::TaskBlocked(_, _) => "task_blocked",
            Self::InvalidTransition(_, _) => "invalid_transition",
            Self::NotHolder(_, _, _) => "not_holder",
            Self::ValidationRequired(_) => "validation_required",
            Self::InvalidStatusFilter(_) => "invalid_status",
            Self::InvalidName(_) => "invalid_name",
            Self::NameTaken(_) => "name_taken",
            Self::InvalidTopic(_) => "invalid_topic",
            Self::EmptyMessage => "empty_message",
            Self::CorruptStore(_, _) => "corrupt_store",
            Self::CommitConflict(_) => "commit_conflict",
            Self::Locked(_) => "locked",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Db(_) => "db_error",
            Self::Git(_) => "git_error",
        }
    }

    /// Coarse error class carried in the JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::NotGitRepository
            | Self::InvalidTransition(_, _) => "state",
            Self::TaskNotFound(_) => "not_found",
            Self::TaskClaimed(_, _)
            | Self::NotHolder(_, _, _)
            | Self::NameTaken(_)
            | Self::CommitConflict(_)
            | Self::Locked(_) => "conflict",
            Self::TaskIdAmbiguous(_, _)
            | Self::InvalidTaskId(_, _)
            | Self::TaskBlocked(_, _)
            | Self::ValidationRequired(_)
            | Self::InvalidStatusFilter(_)
            | Self::InvalidName(_)
            | Self::InvalidTopic(_)
            | Self::EmptyMessage => "validation",
            Self::CorruptStore(_, _) | Self::Io(_) | Self::Json(_) | Self::Db(_) | Self::Git(_) => {
                "internal"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
