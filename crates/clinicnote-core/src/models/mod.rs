//! Shared models for ClinicNote

mod document;
mod entity;

pub use document::{ChangeEvent, DocumentKey, LocalDocument};
pub use entity::EntityType;
