pub mod args;
pub mod validation;

pub use args::Args;
pub use validation::{validate_mount_point, validate_sources};
