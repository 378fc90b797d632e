pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistError, Result};
pub use types::AttributeType;
pub use value::Value;
