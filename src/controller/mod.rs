pub mod api;
pub mod auth;
pub mod controller;
pub mod types;

pub use auth::{Authorizer, HeaderAuthorizer};
pub use controller::rebuild_address;
pub use types::{Controller, ControllerError, ControllerResult, RequestOutcome};
