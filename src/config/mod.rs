pub mod pattern;
pub mod registry;
pub mod types;

pub use registry::{ConfigKind, ConfigListener, ConfigRegistry, RegistryOptions};
pub use types::*;
