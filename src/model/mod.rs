// Varseal - Domain model
//
// Plain value types handed to and returned from the store. Secret-bearing
// types implement `Debug` by hand so secrets never reach logs.

mod audit;
mod key;
mod label;
mod project;
mod variable;

pub use audit::{AuditEvent, ProjectVariableAudit};
pub use key::{KeyType, ProjectKey};
pub use label::Label;
pub use project::{Project, VcsServer};
pub use variable::{redact, Variable, VariableType, PASSWORD_PLACEHOLDER};
