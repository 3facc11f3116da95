mod error;
mod traits;
mod types;

pub use error::{RepositoryError, Result};
pub use traits::{PrimaryKeys, Repository};
pub use types::{Entity, EntityId, KeyValue};
