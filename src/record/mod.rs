pub mod state;
pub mod types;

pub use state::claimable;
pub use types::{RequestRecord, Status};
