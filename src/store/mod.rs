// Varseal - Store Module
//
// SQLite-backed persistence for projects and their variables, keys and labels.
// Secret values are sealed per field, identity fields are signed per row, and
// every variable change is audit-logged with secrets redacted.

mod db;
pub mod entities;
mod error;
mod executor;
pub mod hooks;
pub mod mapping;
mod repository;

pub use db::Database;
pub use error::StoreError;
pub use executor::Executor;
pub use hooks::{HookContext, HookOptions, Lifecycle};
pub use mapping::{Entity, Registry, TableMapping};
pub use repository::{ProjectStore, RowFailure, SqliteProjectStore, VerificationReport};
