use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum SchemaReason {
    #[error("unknown kind")]
    UnknownKind,
    #[error("unknown function")]
    UnknownFunction,
    #[error("invalid class source")]
    BadClassSource,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for SchemaReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::UnknownKind => 1101,
            Self::UnknownFunction => 1102,
            Self::BadClassSource => 1103,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type SchemaError = StructError<SchemaReason>;
pub type SchemaResult<T> = Result<T, SchemaError>;
