use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum ExecReason {
    #[error("invocation failed")]
    Invoke,
    #[error("expression evaluation failed")]
    Eval,
    #[error("state slot is corrupt")]
    StateCorrupt,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for ExecReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Invoke => 1301,
            Self::Eval => 1302,
            Self::StateCorrupt => 1303,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type ExecError = StructError<ExecReason>;
pub type ExecResult<T> = Result<T, ExecError>;
