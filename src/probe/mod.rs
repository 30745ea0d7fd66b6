pub mod mock;
pub mod probe;
pub mod types;

pub use mock::MockProbe;
pub use probe::HttpProbe;
pub use types::{ProbeError, ProbeResult, SlotProbe};
