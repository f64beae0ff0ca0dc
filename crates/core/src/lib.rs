//! `hemobank-core`: blood bank value types.
//!
//! This crate contains **pure domain** primitives (no storage, no async, no IO).

pub mod blood_type;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;
pub mod volume;

pub use blood_type::BloodType;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::LotId;
pub use value_object::ValueObject;
pub use volume::Volume;
