// Images merged from a color image and a separate alpha image

use crate::engine::assets::content::{AssetContent, ImageAsset};
use crate::engine::assets::descriptor::{AssetDescriptor, Assets};
use crate::engine::assets::load::LoadOptions;
use crate::engine::assets::task::{Task, TaskContext, TaskDone, TaskType};
use image::{Rgba, RgbaImage};
use std::rc::Rc;

/// Claims descriptors with both `color` and `alpha`
pub struct ColorAlphaTaskType;

impl TaskType for ColorAlphaTaskType {
    fn name(&self) -> &'static str {
        "color_alpha"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.color.is_some() && asset.alpha.is_some()
    }

    fn fallback_id<'a>(&self, asset: &'a AssetDescriptor) -> Option<&'a str> {
        asset.color.as_deref()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(ColorAlphaTask { asset })
    }
}

struct ColorAlphaTask {
    asset: Rc<AssetDescriptor>,
}

impl Task for ColorAlphaTask {
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone) {
        let (Some(color), Some(alpha)) = (self.asset.color.as_deref(), self.asset.alpha.as_deref())
        else {
            done.finish(None);
            return;
        };

        let color = ctx.filter(color, &self.asset);
        let alpha = ctx.filter(alpha, &self.asset);
        let source = color.clone();
        let images = Assets::map([
            ("color", AssetDescriptor::src(color).with_type("image")),
            ("alpha", AssetDescriptor::src(alpha).with_type("image")),
        ]);

        ctx.load(
            images,
            LoadOptions::new().on_complete(move |results| {
                let color = results.get("color").and_then(|c| c.as_image());
                let alpha = results.get("alpha").and_then(|a| a.as_image());
                let merged = match (color.and_then(|c| c.pixels()), alpha.and_then(|a| a.pixels())) {
                    (Some(color), Some(alpha)) => Some(merge_alpha(&color, &alpha)),
                    _ => None,
                };

                match merged {
                    Some(pixels) => {
                        done.finish(Some(Rc::new(AssetContent::Image(ImageAsset::new(source, pixels)))))
                    }
                    None => {
                        log::warn!("Could not merge '{}' with its alpha image", source);
                        done.finish(None);
                    }
                }
            }),
        );
    }
}

/// Combine the color channels of one image with the red channel of another as alpha
///
/// Pixels outside the alpha image stay opaque.
pub fn merge_alpha(color: &RgbaImage, alpha: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(color.width(), color.height(), |x, y| {
        let [r, g, b, _] = color.get_pixel(x, y).0;
        let a = if x < alpha.width() && y < alpha.height() {
            alpha.get_pixel(x, y).0[0]
        } else {
            u8::MAX
        };
        Rgba([r, g, b, a])
    })
}
