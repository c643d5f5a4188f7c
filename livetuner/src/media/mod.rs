pub mod cache;
pub mod process;
pub mod proxy;
pub mod tool;

pub use cache::ResolutionCache;
pub use process::PlaybackProcess;
pub use proxy::{DEFAULT_EXIT_GRACE, PlaybackError, StreamProxy};
pub use tool::{CommandTool, StreamTool, ToolError, ToolKind};
