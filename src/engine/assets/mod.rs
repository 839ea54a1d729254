// Asset loading and task scheduling
//
// Everything the game loads goes through one `AssetManager`. A load turns its
// input (one asset, a list, or a keyed map) into tasks, runs them in parallel
// or one at a time, and hands back results shaped like the input. Tasks can
// discover more assets while they run; those join the same load.
//
// ## Architecture
//
// - `cache`: id-keyed results shared across loads
// - `task`: the task contract and completion handle
// - `registry`: priority-ordered task types
// - `load`: one load session and its scheduler
// - `manager`: the entry point owning all of the above
// - `tasks`: built-in task types
// - `transport`, `sizes`: the boundary to file I/O and display sizes
//
// ## Usage Example
//
// ```rust
// use rusted_assets::engine::assets::{AssetManager, Assets, FileTransport, LoadOptions};
// use std::rc::Rc;
//
// let manager = AssetManager::new(Rc::new(FileTransport::new("assets")));
// manager.load(
//     Assets::map([("bg", "images/bg.png"), ("level", "data/level1.json")]),
//     LoadOptions::new().on_complete(|results| {
//         let level = results.get("level");
//         // ...
//     }),
// );
// ```

mod cache;
mod config;
mod content;
mod descriptor;
mod load;
mod manager;
mod registry;
mod sizes;
mod task;
pub mod tasks;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::AssetCache;
pub use config::AssetConfig;
pub use content::{AssetContent, AssetRef, ImageAsset, Resource};
pub use descriptor::{AssetCompleteFn, AssetDescriptor, Assets, AsyncDone, AsyncLoader};
pub use load::{
    AssetLoad, CompleteFn, ErrorFn, LoadMode, LoadOptions, LoadResults, ProgressFn, TaskDoneFn,
};
pub use manager::AssetManager;
pub use registry::TaskRegistry;
pub use sizes::{filter_url, AssetSize, AssetSizes, SizeNegotiator, SIZE_TOKEN};
pub use task::{derive_id, Task, TaskContext, TaskDone, TaskInfo, TaskStatus, TaskType};
pub use transport::{BackgroundTransport, FetchCallback, FileTransport, Transport};

/// Asset loading errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Failed to load asset: {0}")]
    LoadError(String),

    #[error("No task type can load asset: {0}")]
    Unroutable(String),

    #[error("Discovered asset has no id but the load's results are keyed by id: {0}")]
    ModeConflict(String),

    #[error("Failed to decode asset: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
