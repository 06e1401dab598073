mod error;
mod interface;
mod manager;
mod process;

pub use error::ConnectionError;
pub use interface::{DiscoveredTool, ServerGuidance, ToolInvoker, ToolSet};
pub use manager::ServerManager;
