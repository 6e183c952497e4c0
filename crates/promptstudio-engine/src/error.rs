use promptstudio_contracts::prompt::FieldKey;
use promptstudio_contracts::scenes::UserMode;
use thiserror::Error;

/// Rule-engine rejections. State is never mutated when one of these is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("unknown scene '{0}'")]
    UnknownScene(String),
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("field '{key}' is not declared by scene '{scene}'")]
    UndeclaredField { scene: String, key: FieldKey },
    #[error("field '{key}' needs {required} mode to edit (current: {current})")]
    FieldLocked {
        key: FieldKey,
        required: UserMode,
        current: UserMode,
    },
    #[error("weight for '{key}' can only be changed in expert mode on weighted fields")]
    WeightLocked { key: FieldKey },
    #[error("required fields missing: {}", join_keys(.0))]
    MissingRequired(Vec<FieldKey>),
    #[error("a {0} call is already in flight")]
    Busy(&'static str),
    #[error("stale {0} ticket")]
    StaleTicket(&'static str),
    #[error("no history item '{0}'")]
    UnknownHistoryItem(String),
    #[error("unknown photography session '{0}'")]
    UnknownSession(String),
    #[error("unknown shot '{shot}' in session '{session}'")]
    UnknownShot { session: String, shot: String },
    #[error("portrait mode needs a reference image")]
    ReferenceImageRequired,
    #[error("reference image is locked")]
    ReferenceLocked,
}

fn join_keys(keys: &[FieldKey]) -> String {
    keys.iter()
        .map(|key| key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type StudioResult<T> = Result<T, StudioError>;
