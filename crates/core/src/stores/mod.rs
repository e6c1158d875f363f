pub mod object_storage;
pub mod postgrest;

pub use object_storage::{BucketConfig, BucketStore};
pub use postgrest::{PostgrestConfig, PostgrestStore};
