// Action schemas and the local/forward arbitration

mod catalog;
mod error;
mod schema;
mod validator;

pub use catalog::{Exposure, SchemaCatalog};
pub use error::ActionError;
pub use schema::{ActionSchema, Executor, Precondition, ProposedAction};
pub use validator::{validate, Validated};
