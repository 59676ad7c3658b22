//! stagehand library
//!
//! Project library and asset import orchestration for an externally
//! installed authoring application: template-based project creation, host
//! process control, and a sequential asset import queue.

pub mod engine;
pub mod error;
pub mod host;
pub mod import;
pub mod output;
pub mod project;
pub mod settings;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use engine::{Command, Engine, Outcome};
pub use error::{EngineError, Result};
pub use host::{HostApplication, HostPlatform, HostState, ProcessController};
pub use import::{AssetLibrary, ImportPipeline, ImportRecord, ImportStatus};
pub use project::{Project, ProjectRegistry, TemplateEngine};
pub use settings::{ConfigStore, Settings};
