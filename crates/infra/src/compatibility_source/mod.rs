//! Persisted compatibility rule sources.

pub mod json_file;
pub mod postgres;

pub use json_file::JsonFileCompatibilitySource;
pub use postgres::PostgresCompatibilitySource;
