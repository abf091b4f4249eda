//! Payloads of the five apps.

use super::{EntityKind, EntityPayload};
use crate::core::{Result, SyncError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const MAX_TITLE_CHARS: usize = 500;
const MAX_NOTE_CHARS: usize = 100_000;
const MAX_STICKY_CHARS: usize = 2_000;
const MAX_TIMER_MS: u64 = 24 * 60 * 60 * 1_000;
const MAX_SUBSCRIPTION_SLOTS: usize = 50;

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(SyncError::Validation(format!(
            "{field} is {len} characters, limit is {max}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub list: String,
    #[serde(default)]
    pub position: i64,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: String::new(),
            due_date: None,
            completed: false,
            list: String::new(),
            position: 0,
        }
    }

    pub fn in_list(mut self, list: impl Into<String>) -> Self {
        self.list = list.into();
        self
    }

    pub fn at(mut self, position: i64) -> Self {
        self.position = position;
        self
    }
}

impl EntityPayload for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn apply_defaults(&mut self, today: NaiveDate) {
        if self.due_date.is_none() {
            self.due_date = Some(today);
        }
        if self.list.is_empty() {
            self.list = "inbox".to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(SyncError::Validation("task title must not be empty".to_string()));
        }
        check_len("task title", &self.title, MAX_TITLE_CHARS)?;
        check_len("task notes", &self.notes, MAX_NOTE_CHARS)
    }

    fn group(&self) -> &str {
        &self.list
    }

    fn set_group(&mut self, group: &str) -> bool {
        self.list = group.to_string();
        true
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i64) -> bool {
        self.position = position;
        true
    }

    fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
}

impl JournalNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            pinned: false,
        }
    }
}

impl EntityPayload for JournalNote {
    const KIND: EntityKind = EntityKind::JournalNote;

    fn apply_defaults(&mut self, today: NaiveDate) {
        if self.title.trim().is_empty() {
            self.title = today.format("%B %-d, %Y").to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        check_len("note title", &self.title, MAX_TITLE_CHARS)?;
        check_len("note content", &self.content, MAX_NOTE_CHARS)
    }

    fn toggle(&mut self) -> bool {
        self.pinned = !self.pinned;
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteColor {
    #[default]
    Yellow,
    Pink,
    Blue,
    Green,
    Purple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyNote {
    pub content: String,
    #[serde(default)]
    pub color: NoteColor,
    #[serde(default)]
    pub column: String,
    #[serde(default)]
    pub position: i64,
}

impl StickyNote {
    pub fn new(content: impl Into<String>, color: NoteColor) -> Self {
        Self {
            content: content.into(),
            color,
            column: String::new(),
            position: 0,
        }
    }

    pub fn in_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

impl EntityPayload for StickyNote {
    const KIND: EntityKind = EntityKind::StickyNote;

    fn apply_defaults(&mut self, _today: NaiveDate) {
        if self.column.is_empty() {
            self.column = "board".to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        check_len("sticky note", &self.content, MAX_STICKY_CHARS)
    }

    fn group(&self) -> &str {
        &self.column
    }

    fn set_group(&mut self, group: &str) -> bool {
        self.column = group.to_string();
        true
    }

    fn position(&self) -> Option<i64> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i64) -> bool {
        self.position = position;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub label: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub completed: bool,
}

impl TimerSession {
    pub fn new(label: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            label: label.into(),
            duration_ms,
            elapsed_ms: 0,
            completed: false,
        }
    }
}

impl EntityPayload for TimerSession {
    const KIND: EntityKind = EntityKind::TimerSession;

    fn validate(&self) -> Result<()> {
        if self.duration_ms == 0 || self.duration_ms > MAX_TIMER_MS {
            return Err(SyncError::Validation(format!(
                "timer duration {}ms is outside 1..={}ms",
                self.duration_ms, MAX_TIMER_MS
            )));
        }
        check_len("timer label", &self.label, MAX_TITLE_CHARS)
    }

    fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        if self.completed {
            self.elapsed_ms = self.duration_ms;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSlot {
    pub service: String,
    pub monthly_cost_cents: u64,
    #[serde(default)]
    pub renews_on: Option<NaiveDate>,
}

/// One tracked set of subscriptions (a household, a team card).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSlotSet {
    pub name: String,
    #[serde(default)]
    pub slots: Vec<SubscriptionSlot>,
}

impl SubscriptionSlotSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
        }
    }

    pub fn monthly_total_cents(&self) -> u64 {
        self.slots
            .iter()
            .fold(0u64, |acc, slot| acc.saturating_add(slot.monthly_cost_cents))
    }
}

impl EntityPayload for SubscriptionSlotSet {
    const KIND: EntityKind = EntityKind::SubscriptionSlotSet;

    fn validate(&self) -> Result<()> {
        if self.slots.len() > MAX_SUBSCRIPTION_SLOTS {
            return Err(SyncError::Validation(format!(
                "at most {MAX_SUBSCRIPTION_SLOTS} subscription slots are allowed"
            )));
        }
        if self.slots.iter().any(|slot| slot.service.trim().is_empty()) {
            return Err(SyncError::Validation(
                "subscription service name must not be empty".to_string(),
            ));
        }
        check_len("subscription set name", &self.name, MAX_TITLE_CHARS)
    }
}
