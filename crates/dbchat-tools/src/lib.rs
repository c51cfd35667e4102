//! Tool registration and gated execution for dbchat. Tools never run
//! without an approval decision.

mod gateway;
mod tool;
mod validate;

pub use gateway::{REJECTION_MESSAGE, ToolApprover, ToolGateway, ToolOutcome};
pub use tool::{Tool, ToolRegistry};
pub use validate::validate_args;
