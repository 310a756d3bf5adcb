pub mod types;
pub mod naming;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{Job, Step, StepInput, StepOutput, VolumesFrom};
pub use config::Config;
pub use naming::{Role, Stream};
