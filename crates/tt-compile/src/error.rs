use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Stable error kinds surfaced to callers of the compilation pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CompileReason {
    #[error("syntax error")]
    SyntaxError,
    #[error("unknown kind")]
    UnknownKind,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("undeclared name")]
    UndeclaredName,
    #[error("direction violation")]
    DirectionViolation,
    #[error("program is not executable")]
    NonExecutable,
    #[error("remote lowering error")]
    RemoteLoweringError,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CompileReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::SyntaxError => 1201,
            Self::UnknownKind => 1202,
            Self::TypeMismatch => 1203,
            Self::UndeclaredName => 1204,
            Self::DirectionViolation => 1205,
            Self::NonExecutable => 1206,
            Self::RemoteLoweringError => 1207,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CompileError = StructError<CompileReason>;
pub type CompileResult<T> = Result<T, CompileError>;

/// Shorthand for building a reason + detail error.
pub fn err_detail(reason: CompileReason, detail: impl Into<String>) -> CompileError {
    StructError::from(reason).with_detail(detail.into())
}
