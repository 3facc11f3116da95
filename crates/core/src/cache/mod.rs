mod error;
mod keys;
mod policy;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{
    command_key, count_key, generation_key, hash_canonical, point_key, query_key, GET_BY_ID,
};
pub use policy::CachePolicy;
pub use serialization::{
    deserialize_counter, deserialize_value, serialize_value, SerializationError,
};
pub use traits::CacheBackend;
