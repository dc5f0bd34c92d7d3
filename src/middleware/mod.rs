pub mod auth;
pub mod request;

pub use auth::{Caller, require_ops_key};
pub use request::{ValidJson, ValidQuery};
