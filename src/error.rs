use serde_json::json;
use thiserror::Error;

pub const CONFLICT_MESSAGE: &str = "Email or Register Number already exists.";

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },
    #[error("Field \"{0}\" is not editable")]
    NotEditable(String),
    #[error("{0}")]
    BadParams(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AdmissionError>;

impl AdmissionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AdmissionError::Validation(vec![msg.into()])
    }

    pub fn bad_params(msg: impl Into<String>) -> Self {
        AdmissionError::BadParams(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::Validation(_) => "validation_failed",
            AdmissionError::NotFound(_) => "not_found",
            AdmissionError::Conflict(_) => "conflict",
            AdmissionError::InvalidValue { .. } => "invalid_value",
            AdmissionError::NotEditable(_) => "not_editable",
            AdmissionError::BadParams(_) => "bad_params",
            AdmissionError::NoWorkspace => "no_workspace",
            AdmissionError::Db(_) | AdmissionError::Io(_) | AdmissionError::Internal(_) => {
                "internal"
            }
        }
    }

    /// HTTP-equivalent status carried in the error envelope.
    pub fn status(&self) -> u16 {
        match self {
            AdmissionError::NotFound(_) => 404,
            AdmissionError::Db(_) | AdmissionError::Io(_) | AdmissionError::Internal(_) => 500,
            _ => 400,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() >= 500
    }

    /// Message safe to show the caller. Internal failures are not leaked.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "An unexpected error occurred.".to_string()
        } else {
            self.to_string()
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AdmissionError::Validation(errors) => Some(json!({ "errors": errors })),
            AdmissionError::InvalidValue { value, reason } => {
                Some(json!({ "value": value, "reason": reason }))
            }
            AdmissionError::NotEditable(field) => Some(json!({ "field": field })),
            _ => None,
        }
    }
}

/// Maps SQLite UNIQUE violations to the user-facing conflict; everything
/// else stays a database error.
pub fn map_unique(e: rusqlite::Error) -> AdmissionError {
    if let rusqlite::Error::SqliteFailure(ref inner, _) = e {
        if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            return AdmissionError::Conflict(CONFLICT_MESSAGE.to_string());
        }
    }
    AdmissionError::Db(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AdmissionError::NotFound("admission").status(), 404);
        assert_eq!(AdmissionError::validation("x").status(), 400);
        assert_eq!(AdmissionError::Internal("boom".into()).status(), 500);
        assert_eq!(AdmissionError::NoWorkspace.code(), "no_workspace");
    }

    #[test]
    fn internal_messages_are_generic() {
        let e = AdmissionError::Internal("disk on fire".into());
        assert!(!e.public_message().contains("disk"));
        let v = AdmissionError::validation("Mobile number must be 10 digits");
        assert_eq!(v.public_message(), "Mobile number must be 10 digits");
    }

    #[test]
    fn invalid_value_echoes_input() {
        let e = AdmissionError::InvalidValue {
            value: "abc".into(),
            reason: "not a decimal".into(),
        };
        assert_eq!(e.code(), "invalid_value");
        assert_eq!(
            e.details().and_then(|d| d.get("value").cloned()),
            Some(json!("abc"))
        );
    }
}
