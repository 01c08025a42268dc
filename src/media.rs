pub mod delete;
pub mod local;
pub mod store;

pub use delete::MediaDeleter;
