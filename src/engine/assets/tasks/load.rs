// Single-URL loads

use crate::engine::assets::content::{AssetContent, ImageAsset};
use crate::engine::assets::descriptor::AssetDescriptor;
use crate::engine::assets::task::{Task, TaskContext, TaskDone, TaskType};
use crate::engine::assets::AssetError;
use std::rc::Rc;

const JSON_TYPES: &[&str] = &["json"];
const IMAGE_TYPES: &[&str] = &["image", "png", "jpg", "jpeg"];
const TEXT_TYPES: &[&str] = &["text", "txt", "csv", "xml", "html", "svg", "glsl", "vert", "frag"];

/// Claims descriptors with a `src`; the generic fallback
pub struct LoadTaskType;

impl TaskType for LoadTaskType {
    fn name(&self) -> &'static str {
        "load"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.src.is_some()
    }

    fn fallback_id<'a>(&self, asset: &'a AssetDescriptor) -> Option<&'a str> {
        asset.src.as_deref()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(LoadTask { asset })
    }
}

struct LoadTask {
    asset: Rc<AssetDescriptor>,
}

impl Task for LoadTask {
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone) {
        let Some(src) = self.asset.src.as_deref() else {
            done.finish(None);
            return;
        };

        let url = ctx.filter(src, &self.asset);
        let type_tag = self.asset.type_tag.clone();
        let target = url.clone();
        ctx.fetch(
            &url,
            Box::new(move |result| {
                let content = result.and_then(|bytes| decode(&target, type_tag.as_deref(), bytes));
                match content {
                    Ok(content) => done.finish(Some(Rc::new(content))),
                    Err(err) => {
                        log::warn!("Loading '{}' failed: {}", target, err);
                        done.finish(None);
                    }
                }
            }),
        );
    }
}

/// Decode fetched bytes by type tag, or by URL extension without one
pub fn decode(url: &str, type_tag: Option<&str>, bytes: Vec<u8>) -> Result<AssetContent, AssetError> {
    let kind = type_tag
        .map(str::to_ascii_lowercase)
        .or_else(|| extension(url))
        .unwrap_or_default();

    if JSON_TYPES.contains(&kind.as_str()) {
        Ok(AssetContent::Json(serde_json::from_slice(&bytes)?))
    } else if IMAGE_TYPES.contains(&kind.as_str()) {
        Ok(AssetContent::Image(ImageAsset::from_bytes(url, &bytes)?))
    } else if TEXT_TYPES.contains(&kind.as_str()) {
        String::from_utf8(bytes)
            .map(AssetContent::Text)
            .map_err(|e| AssetError::Decode(format!("{} is not UTF-8: {}", url, e)))
    } else {
        Ok(AssetContent::Bytes(bytes))
    }
}

fn extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_json_by_extension() {
        let content = decode("data/config.json", None, br#"{"lives": 3}"#.to_vec()).unwrap();
        assert_eq!(content.as_json().unwrap()["lives"], 3);
    }

    #[test]
    fn test_decode_type_tag_wins() {
        let content = decode("data/config.dat", Some("json"), b"[1, 2]".to_vec()).unwrap();
        assert!(content.as_json().unwrap().is_array());
    }

    #[test]
    fn test_decode_text() {
        let content = decode("shaders/sprite.glsl", None, b"void main() {}".to_vec()).unwrap();
        assert_eq!(content.as_text(), Some("void main() {}"));
    }

    #[test]
    fn test_decode_image() {
        let content = decode("images/hero.png", None, png_bytes(3, 2)).unwrap();
        assert_eq!(content.as_image().unwrap().dimensions(), (3, 2));
    }

    #[test]
    fn test_decode_unknown_is_bytes() {
        let content = decode("sounds/click.ogg", None, vec![1, 2, 3]).unwrap();
        assert_eq!(content.as_bytes(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("a.json", None, b"{".to_vec()),
            Err(AssetError::Json(_))
        ));
        assert!(matches!(
            decode("a.txt", None, vec![0xff, 0xfe]),
            Err(AssetError::Decode(_))
        ));
        assert!(matches!(
            decode("a.png", None, b"nope".to_vec()),
            Err(AssetError::Image(_))
        ));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/c.PNG").as_deref(), Some("png"));
        assert_eq!(extension("data.json?v=2").as_deref(), Some("json"));
        assert_eq!(extension("dir.v2/readme"), None);
    }

    #[test]
    fn test_fallback_id_is_src() {
        let asset = AssetDescriptor::src("images/bg.png");
        assert_eq!(LoadTaskType.fallback_id(&asset), Some("images/bg.png"));
    }
}
