use thiserror::Error;

pub type Result<T> = std::result::Result<T, FatalError>;

/// Condition that aborts the boot attempt.
///
/// Transient problems (bad checksums, stray frames, duplicate blocks) never surface here; they
/// are dropped where they are detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("no response from server")]
    NoResponse,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("incompatible snapshot: {0}")]
    Incompatible(String),

    #[error("invalid boot server address in BOOTP reply")]
    InvalidBootServer,

    #[error("TFTP protocol violation: {0}")]
    Protocol(&'static str),

    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl FatalError {
    pub fn code(&self) -> FatalCode {
        match self {
            Self::NoResponse => FatalCode::NoResponse,
            Self::FileNotFound(_) => FatalCode::FileNotFound,
            Self::Incompatible(_) => FatalCode::Incompatible,
            Self::InvalidBootServer => FatalCode::InvalidBootServer,
            Self::Protocol(_) => FatalCode::Protocol,
            Self::Internal(_) => FatalCode::Internal,
        }
    }
}

/// Diagnostic shown on the border when the firmware halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalCode {
    NoResponse,
    FileNotFound,
    Incompatible,
    InvalidBootServer,
    Protocol,
    Internal,
}

impl FatalCode {
    /// Spectrum border colour index (0 black .. 7 white).
    pub fn border_colour(self) -> u8 {
        match self {
            Self::NoResponse => 2,
            Self::InvalidBootServer | Self::Protocol => 3,
            Self::Incompatible => 5,
            Self::FileNotFound => 6,
            Self::Internal => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoResponse => "NO_RESPONSE",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::Incompatible => "INCOMPATIBLE",
            Self::InvalidBootServer => "INVALID_BOOT_SERVER",
            Self::Protocol => "PROTOCOL",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for FatalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
