use crate::manifest::Str;

/// Failures the caller can only fix by re-running with corrected input. Raised through
/// `anyhow` so context accumulates on the way up; use `downcast_ref` to classify.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("decoding {what}: {reason}")]
    Decode { what: Str, reason: String },
    #[error("{kind} `{name}` not found")]
    NotFound { kind: &'static str, name: Str },
    #[error("unable to determine what resources should be injected")]
    UnknownDriver,
    #[error("{object}: {reason}")]
    Structural { object: Str, reason: String },
}

impl InjectError {
    pub fn decode(what: impl Into<Str>, reason: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<Str>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn structural(object: impl Into<Str>, reason: impl ToString) -> Self {
        Self::Structural {
            object: object.into(),
            reason: reason.to_string(),
        }
    }
}
