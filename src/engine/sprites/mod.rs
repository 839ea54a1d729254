// Sprite subsystem
//
// Lives outside the asset core and plugs its own task type into the
// manager's registry.

mod atlas;

pub use atlas::{atlas_asset, AtlasRegion, AtlasTaskType, SpriteAtlas};

use crate::engine::assets::AssetManager;

/// Atlases must win over the generic URL load
pub const ATLAS_PRIORITY: i32 = 30;

/// Register the sprite task types on a manager
pub fn register(manager: &AssetManager) {
    manager.register(AtlasTaskType, ATLAS_PRIORITY);
}
