//! HTTP handlers, one module per resource. Each exposes a `router()` that is
//! merged under `/api` in [`crate::router::ops_router`].

pub mod assistant;
pub mod files;
pub mod kitchens;
pub mod profiles;
pub mod projects;
pub mod reminders;
pub mod tasks;
pub mod whatsapp;
