//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod validation;
pub mod email;
pub mod list;
pub mod user;

pub use validation::ValidationError;
pub use email::{EmailAddress, ImportBatch};
pub use list::ListName;
pub use user::{SmtpPort, Username};
