// Sprite atlases: frame data plus the sheet image it cuts up

use crate::engine::assets::{
    AssetContent, AssetDescriptor, AssetError, AssetRef, Assets, ImageAsset, LoadOptions, Task,
    TaskContext, TaskDone, TaskType,
};
use glam::Vec2;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;

/// A region within a sprite atlas
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRegion {
    /// Name of the frame
    pub name: String,

    /// Position in the sheet (pixels)
    pub x: u32,
    pub y: u32,

    /// Size of the region (pixels)
    pub width: u32,
    pub height: u32,

    /// UV coordinates (0.0 to 1.0)
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl AtlasRegion {
    /// Create a new atlas region with calculated UV coordinates
    pub fn new(
        name: impl Into<String>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        atlas_width: u32,
        atlas_height: u32,
    ) -> Self {
        let uv_min = Vec2::new(
            x as f32 / atlas_width as f32,
            y as f32 / atlas_height as f32,
        );
        let uv_max = Vec2::new(
            x.saturating_add(width) as f32 / atlas_width as f32,
            y.saturating_add(height) as f32 / atlas_height as f32,
        );

        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
            uv_min,
            uv_max,
        }
    }
}

#[derive(Deserialize)]
struct FrameRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Deserialize)]
struct FrameEntry {
    #[serde(default)]
    filename: Option<String>,
    frame: FrameRect,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Frames {
    Keyed(IndexMap<String, FrameEntry>),
    Listed(Vec<FrameEntry>),
}

#[derive(Deserialize)]
struct SheetSize {
    w: u32,
    h: u32,
}

#[derive(Deserialize, Default)]
struct SheetMeta {
    #[serde(default)]
    size: Option<SheetSize>,
}

#[derive(Deserialize)]
struct SheetData {
    frames: Frames,
    #[serde(default)]
    meta: SheetMeta,
}

/// A sprite sheet and its named regions
pub struct SpriteAtlas {
    /// Width of the sheet
    pub width: u32,

    /// Height of the sheet
    pub height: u32,

    regions: Vec<AtlasRegion>,

    /// Loaded sheet, shared with whoever else holds the image
    image: Option<AssetRef>,
}

impl SpriteAtlas {
    /// Create an empty atlas without a sheet image
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            regions: Vec::new(),
            image: None,
        }
    }

    /// Build an atlas from frame JSON
    ///
    /// Accepts frames keyed by name or listed with a `filename`. The sheet
    /// size comes from `meta.size`, else from the image.
    pub fn from_json(data: &serde_json::Value, image: Option<AssetRef>) -> Result<Self, AssetError> {
        let sheet = SheetData::deserialize(data)?;
        let sheet_image = image.as_ref().and_then(|image| image.as_image());
        let (width, height) = match (&sheet.meta.size, sheet_image) {
            (Some(size), _) => (size.w, size.h),
            (None, Some(image)) => image.dimensions(),
            (None, None) => {
                return Err(AssetError::Decode("atlas has no sheet size".to_string()));
            }
        };
        if width == 0 || height == 0 {
            return Err(AssetError::Decode("atlas sheet is empty".to_string()));
        }

        let entries: Vec<(String, FrameEntry)> = match sheet.frames {
            Frames::Keyed(frames) => frames.into_iter().collect(),
            Frames::Listed(frames) => frames
                .into_iter()
                .enumerate()
                .map(|(i, entry)| (entry.filename.clone().unwrap_or_else(|| i.to_string()), entry))
                .collect(),
        };

        let mut atlas = Self::new(width, height);
        for (name, entry) in entries {
            let rect = entry.frame;
            if rect.x.checked_add(rect.w).is_none() || rect.y.checked_add(rect.h).is_none() {
                return Err(AssetError::Decode(format!("frame '{}' is out of range", name)));
            }
            atlas.add_region(AtlasRegion::new(name, rect.x, rect.y, rect.w, rect.h, width, height));
        }
        atlas.image = image;
        Ok(atlas)
    }

    /// Add a region to the atlas
    pub fn add_region(&mut self, region: AtlasRegion) {
        self.regions.push(region);
    }

    /// Get a region by name
    pub fn get_region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Get all regions
    pub fn regions(&self) -> &[AtlasRegion] {
        &self.regions
    }

    /// Get the number of regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// The sheet image, if one was loaded
    pub fn image(&self) -> Option<&ImageAsset> {
        self.image.as_ref().and_then(|image| image.as_image())
    }

    /// Release the sheet image
    pub fn destroy(&self) {
        if let Some(image) = &self.image {
            image.destroy();
        }
    }
}

impl fmt::Debug for SpriteAtlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpriteAtlas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("regions", &self.regions.len())
            .field("image", &self.image())
            .finish()
    }
}

/// Descriptor for a sprite atlas
pub fn atlas_asset(atlas: impl Into<String>, image: impl Into<String>) -> AssetDescriptor {
    AssetDescriptor::atlas(atlas, image)
}

/// Claims descriptors with both `atlas` and `image`
pub struct AtlasTaskType;

impl TaskType for AtlasTaskType {
    fn name(&self) -> &'static str {
        "atlas"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.atlas.is_some() && asset.image.is_some()
    }

    fn fallback_id<'a>(&self, asset: &'a AssetDescriptor) -> Option<&'a str> {
        asset.atlas.as_deref()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(AtlasTask { asset })
    }
}

struct AtlasTask {
    asset: Rc<AssetDescriptor>,
}

impl Task for AtlasTask {
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone) {
        let (Some(atlas), Some(image)) = (self.asset.atlas.as_deref(), self.asset.image.as_deref())
        else {
            done.finish(None);
            return;
        };

        let atlas = ctx.filter(atlas, &self.asset);
        let image = ctx.filter(image, &self.asset);
        let name = atlas.clone();
        let parts = Assets::map([
            ("frames", AssetDescriptor::src(atlas).with_type("json")),
            ("image", AssetDescriptor::src(image).with_type("image")),
        ]);

        ctx.load(
            parts,
            LoadOptions::new().on_complete(move |results| {
                let frames = results.get("frames").and_then(|f| f.as_json());
                let sheet = results.get("image").cloned();

                let built = match frames {
                    Some(frames) => SpriteAtlas::from_json(frames, sheet),
                    None => Err(AssetError::NotFound(name.clone())),
                };
                match built {
                    Ok(atlas) => done.finish(Some(Rc::new(AssetContent::Atlas(atlas)))),
                    Err(err) => {
                        log::warn!("Atlas '{}' failed: {}", name, err);
                        done.finish(None);
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::testing::{capture, manager_with, png_bytes, MockTransport};
    use approx::assert_relative_eq;
    use image::RgbaImage;
    use serde_json::json;

    fn sheet(src: &str, width: u32, height: u32) -> AssetRef {
        Rc::new(AssetContent::Image(ImageAsset::new(src, RgbaImage::new(width, height))))
    }

    #[test]
    fn test_atlas_region_uv() {
        let region = AtlasRegion::new("test", 0, 0, 64, 64, 256, 256);

        assert_eq!(region.uv_min, Vec2::new(0.0, 0.0));
        assert_eq!(region.uv_max, Vec2::new(0.25, 0.25));
    }

    #[test]
    fn test_keyed_frames() {
        let data = json!({
            "frames": {
                "idle_0": {"frame": {"x": 0, "y": 0, "w": 32, "h": 32}},
                "idle_1": {"frame": {"x": 32, "y": 0, "w": 32, "h": 32}}
            },
            "meta": {"size": {"w": 128, "h": 64}}
        });
        let atlas = SpriteAtlas::from_json(&data, None).unwrap();

        assert_eq!(atlas.region_count(), 2);
        let region = atlas.get_region("idle_1").unwrap();
        assert_relative_eq!(region.uv_min.x, 0.25);
        assert_relative_eq!(region.uv_max.y, 0.5);
        assert!(atlas.get_region("nonexistent").is_none());
    }

    #[test]
    fn test_listed_frames_use_image_size() {
        let data = json!({
            "frames": [
                {"filename": "run_0", "frame": {"x": 0, "y": 0, "w": 8, "h": 8}},
                {"frame": {"x": 8, "y": 0, "w": 8, "h": 8}}
            ]
        });
        let image = sheet("sheet.png", 16, 8);
        let atlas = SpriteAtlas::from_json(&data, Some(image)).unwrap();

        assert_eq!((atlas.width, atlas.height), (16, 8));
        assert!(atlas.get_region("run_0").is_some());
        assert!(atlas.get_region("1").is_some());
    }

    #[test]
    fn test_overflowing_frame_is_error() {
        let data = json!({
            "frames": {"bad": {"frame": {"x": u32::MAX, "y": 0, "w": 2, "h": 2}}},
            "meta": {"size": {"w": 64, "h": 64}}
        });
        let result = SpriteAtlas::from_json(&data, None);
        assert!(matches!(result, Err(AssetError::Decode(_))));

        let region = AtlasRegion::new("edge", u32::MAX, 0, 2, 2, 64, 64);
        assert_eq!(region.uv_max.x, u32::MAX as f32 / 64.0);
    }

    #[test]
    fn test_missing_size_is_error() {
        let data = json!({"frames": []});
        assert!(SpriteAtlas::from_json(&data, None).is_err());
    }

    #[test]
    fn test_destroy_releases_sheet() {
        let data = json!({"frames": []});
        let image = sheet("sheet.png", 4, 4);
        let atlas = SpriteAtlas::from_json(&data, Some(image)).unwrap();

        atlas.destroy();
        assert!(atlas.image().unwrap().is_released());
    }

    #[test]
    fn test_atlas_loads_through_manager() {
        let frames = json!({
            "frames": {"walk_0": {"frame": {"x": 0, "y": 0, "w": 16, "h": 16}}}
        });
        let transport = Rc::new(
            MockTransport::new()
                .with_file("hero.json", frames.to_string())
                .with_file("hero.png", png_bytes(&RgbaImage::new(32, 16))),
        );
        let manager = manager_with(&transport);
        crate::engine::sprites::register(&manager);
        let (options, captured) = capture(LoadOptions::new());

        manager.load(atlas_asset("hero.json", "hero.png").with_cache(true), options);

        let results = captured.borrow_mut().take().unwrap();
        let atlas = results.single().unwrap().as_atlas().unwrap();
        assert_eq!((atlas.width, atlas.height), (32, 16));
        assert_relative_eq!(atlas.get_region("walk_0").unwrap().uv_max.x, 0.5);
        assert!(manager.cache().contains("hero"));

        manager.cache().delete("hero");
        assert!(atlas.image().unwrap().is_released());
    }

    #[test]
    fn test_atlas_without_frames_is_null() {
        let transport = Rc::new(MockTransport::new().with_file("hero.png", png_bytes(&RgbaImage::new(4, 4))));
        let manager = manager_with(&transport);
        crate::engine::sprites::register(&manager);
        let (options, captured) = capture(LoadOptions::new());

        manager.load(atlas_asset("hero.json", "hero.png"), options);

        assert!(captured.borrow().as_ref().unwrap().single().is_none());
    }

    #[test]
    fn test_claims_atlas_descriptors() {
        assert!(AtlasTaskType.test(&atlas_asset("hero.json", "hero.png")));
        assert!(!AtlasTaskType.test(&AssetDescriptor::src("hero.png")));
    }
}
