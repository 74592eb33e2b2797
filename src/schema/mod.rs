// 工具输入契约与校验

mod error;
mod schema;
mod validation;

pub use error::SchemaError;
pub use schema::{InputSchema, PropertySchema, PropertyType};
pub use validation::validate_value;
