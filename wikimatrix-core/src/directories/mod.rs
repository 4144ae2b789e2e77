mod owned_bytes;
mod row_cache;
mod row_store;

pub use owned_bytes::*;
pub use row_cache::*;
pub use row_store::*;
