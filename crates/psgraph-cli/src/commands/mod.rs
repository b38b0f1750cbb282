//! CLI Command Implementations
//!
//! - [`apply`]: run a pipeline and write the rewritten programs
//! - [`list`]: print pass names

mod apply;
mod list;

pub use apply::ApplyCommand;
pub use list::{ListCommand, ModeArg};
