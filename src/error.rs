use thiserror::Error;

use crate::construct::ConstructKind;

#[derive(Error, Debug)]
pub enum KunskapError {
    #[error("Schema violation at {location}: {message}")]
    Schema { location: String, message: String },
    #[error("Parse error at {location}: {message}")]
    Parse { location: String, message: String },
    #[error("Unknown element kind <{tag}>")]
    UnknownKind { tag: String },
    #[error("Malformed <{element}>: {message}")]
    Malformed { element: String, message: String },
    #[error("Duplicate {kind} identifier '{id}'")]
    DuplicateIdentifier { kind: ConstructKind, id: String },
    #[error("Dangling reference to {kind} '{id}' (referenced by {referenced_by})")]
    DanglingReference {
        kind: ConstructKind,
        id: String,
        referenced_by: String,
    },
    #[error("Purpose '{id}' is not a root purpose and no variant constitutes it")]
    UnreachablePurpose { id: String },
    #[error("No such {kind} '{id}'")]
    NotFound { kind: ConstructKind, id: String },
    #[error("Variant '{variant}' does not fulfil purpose '{purpose}'")]
    DoesNotFulfil { purpose: String, variant: String },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, KunskapError>;
