//! Sequential asset imports into the running host.

mod library;
mod pipeline;

pub use library::{AssetLibrary, AssetRemoval, StagedAsset};
pub use pipeline::{ImportPipeline, ImportRecord, ImportStatus, ImportTicket};
