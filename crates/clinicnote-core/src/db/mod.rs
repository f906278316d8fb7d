//! Database layer for ClinicNote

mod connection;
mod document_repository;
mod migrations;

pub use connection::Database;
pub use document_repository::{DocumentRepository, RemoteApplyOutcome, SqliteDocumentRepository};
