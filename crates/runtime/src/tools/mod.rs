//! Tool contract, registry and closure-backed tools.

pub mod errors;
mod fn_tool;
mod registry;
mod tool;

pub use errors::{RegistryError, ToolError};
pub use fn_tool::FnTool;
pub use registry::{RegisteredTool, ToolRegistry};
pub use tool::{Concurrency, Tool, ToolContext, ToolFuture};
