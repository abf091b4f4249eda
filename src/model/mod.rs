mod entity;
mod factory;
pub mod kinds;
mod tombstone;

pub use entity::{Entity, EntityKind, EntityPayload};
pub use factory::EntityFactory;
pub use kinds::{
    JournalNote, NoteColor, StickyNote, SubscriptionSlot, SubscriptionSlotSet, Task,
    TimerSession,
};
pub use tombstone::Tombstone;
