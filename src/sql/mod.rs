//! Safe SQL compilation: identifiers from config only, values as parameters.

mod builder;

pub use builder::{SqlBuilder, Statement};
