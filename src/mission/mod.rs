pub mod machine;
pub mod stats;

pub use machine::{MissionMachine, MissionUpdate};
