use crate::core::ErrorKind;
use crate::model::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// What a retry affordance re-runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTarget {
    Migration,
    PendingSync,
}

/// Inline action offered with a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeAction {
    /// Undo a deletion; carries the client ids to restore.
    Restore(Vec<String>),
    Retry(RetryTarget),
}

/// Transient user-facing message (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub action: Option<NoticeAction>,
    pub error: Option<ErrorKind>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            action: None,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: ErrorKind) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            action: None,
            error: Some(error),
        }
    }

    pub fn with_action(mut self, action: NoticeAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// User intents the optimistic layer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Toggle,
    Move,
    Reorder,
    Delete,
    Restore,
}

impl MutationKind {
    pub fn failure_message(&self, kind: EntityKind, count: usize) -> String {
        let noun = plural(kind, count);
        match self {
            Self::Create => format!("Couldn't sync new {noun}; kept on this device"),
            Self::Update | Self::Toggle => format!("Couldn't save {noun}"),
            Self::Move => format!("Couldn't move {noun}"),
            Self::Reorder => format!("Couldn't reorder {noun}"),
            Self::Delete => format!("Couldn't delete {noun}"),
            Self::Restore => format!("Couldn't restore {noun}"),
        }
    }
}

pub(crate) fn plural(kind: EntityKind, count: usize) -> String {
    if count == 1 {
        kind.label().to_string()
    } else {
        format!("{count} {}s", kind.label())
    }
}

/// "Task deleted", "3 tasks restored".
pub(crate) fn outcome(kind: EntityKind, count: usize, verb: &str) -> String {
    let noun = plural(kind, count);
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => format!("{}{} {verb}", first.to_uppercase(), chars.as_str()),
        None => verb.to_string(),
    }
}
