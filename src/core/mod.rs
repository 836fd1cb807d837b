pub mod convert;
pub mod field;
pub mod model;
pub mod normalizer;
pub mod registry;
pub mod resolver;

pub use crate::domain::ports::Storage;
pub use crate::domain::value::Value;
pub use crate::utils::error::Result;
