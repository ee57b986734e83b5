use thiserror::Error;

/// Coarse error classes.
///
/// Hosts match on the kind, never on the message string. Messages may be
/// reworded; kinds never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plugin installed twice, or installed without a required option.
    Installation,
    /// A plugin-level accessor was used before the plugin was installed.
    AccessBeforeInstall,
    /// The store rejected a commit, dispatch or module registration.
    Store,
    /// A wire or emitter effect failed.
    WireEffect,
    /// A user supplied module override could not be merged.
    MalformedOverride,
    /// Configuration could not be merged or deserialized.
    Config,
}

#[derive(Error, Debug)]
pub enum XError {
    #[error("XPlugin is already installed")]
    AlreadyInstalled,

    #[error("XPlugin installation is already in progress")]
    InstallInProgress,

    #[error("missing required install option: {0}")]
    MissingOption(&'static str),

    #[error("XPlugin must be installed before accessing the {0}")]
    NotInstalled(&'static str),

    #[error("unknown mutation type: {0}")]
    UnknownMutation(String),

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("store module already registered at {0}")]
    DuplicateModule(String),

    #[error("invalid store path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("action {0} was dropped before it produced a result")]
    ActionDropped(String),

    #[error("wire effect failed: {0}")]
    WireEffect(String),

    #[error("malformed override for module {module}: {reason}")]
    MalformedOverride { module: String, reason: String },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl XError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XError::AlreadyInstalled | XError::InstallInProgress | XError::MissingOption(_) => {
                ErrorKind::Installation
            }
            XError::NotInstalled(_) => ErrorKind::AccessBeforeInstall,
            XError::UnknownMutation(_)
            | XError::UnknownAction(_)
            | XError::DuplicateModule(_)
            | XError::InvalidPath { .. }
            | XError::ActionDropped(_) => ErrorKind::Store,
            XError::WireEffect(_) => ErrorKind::WireEffect,
            XError::MalformedOverride { .. } => ErrorKind::MalformedOverride,
            XError::Config(_) => ErrorKind::Config,
        }
    }

    /// Shorthand for wire closures that fail with a plain message.
    pub fn wire(message: impl Into<String>) -> Self {
        XError::WireEffect(message.into())
    }
}
