pub mod api;
pub mod role;
pub mod task;

pub use api::ApiResponse;
pub use role::{Capability, Role};
pub use task::{Priority, ProjectStatus, TaskStatus};
