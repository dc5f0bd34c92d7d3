pub mod assistant;
pub mod notifier;
pub mod object_store;
pub mod reminder_actor;
pub mod schedule;

pub use assistant::AssistantService;
pub use notifier::Notifier;
pub use object_store::LocalBucket;
pub use reminder_actor::{ProcessSummary, ReminderHandle};
