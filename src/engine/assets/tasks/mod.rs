// Built-in task types
//
// - `load`: one URL, decoded by type tag or extension
// - `list`: a nested load of several assets
// - `function`: an async function producing the asset
// - `color_alpha`: an image merged from a color and an alpha image
// - `manifest`: a JSON manifest whose entries join the running load
//
// Subsystems outside the core register their own types through
// `AssetManager::register`.

mod cached;
mod color_alpha;
mod function;
mod list;
mod load;
mod manifest;

pub(crate) use cached::CachedTask;
pub use color_alpha::{merge_alpha, ColorAlphaTaskType};
pub use function::FunctionTaskType;
pub use list::ListTaskType;
pub use load::{decode, LoadTaskType};
pub use manifest::ManifestTaskType;

use super::manager::AssetManager;

pub const COLOR_ALPHA_PRIORITY: i32 = 30;
pub const MANIFEST_PRIORITY: i32 = 20;
pub const LIST_PRIORITY: i32 = 10;
pub const FUNCTION_PRIORITY: i32 = 10;
pub const LOAD_PRIORITY: i32 = 0;

/// Register the built-in task types on a manager
pub fn register_builtin(manager: &AssetManager) {
    manager.register(ColorAlphaTaskType, COLOR_ALPHA_PRIORITY);
    manager.register(ManifestTaskType, MANIFEST_PRIORITY);
    manager.register(ListTaskType, LIST_PRIORITY);
    manager.register(FunctionTaskType, FUNCTION_PRIORITY);
    manager.register(LoadTaskType, LOAD_PRIORITY);
}
