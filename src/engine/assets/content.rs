// Loaded asset payloads and their release semantics

use crate::engine::sprites::SpriteAtlas;
use image::RgbaImage;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a loaded payload
///
/// A session's aggregate and the cache hold the same value, so a cached
/// result read back later is the exact object the load produced.
pub type AssetRef = Rc<AssetContent>;

/// Anything that owns a releasable resource of its own
pub trait Resource {
    /// Release whatever the resource holds
    fn destroy(&self);

    /// Downcast support for callers that know the concrete type
    fn as_any(&self) -> &dyn Any;
}

/// A decoded image with a releasable source
pub struct ImageAsset {
    src: RefCell<Option<String>>,
    pixels: RefCell<Option<RgbaImage>>,
}

impl ImageAsset {
    /// Create an image from decoded pixels
    pub fn new(src: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            src: RefCell::new(Some(src.into())),
            pixels: RefCell::new(Some(pixels)),
        }
    }

    /// Decode an image from encoded bytes
    pub fn from_bytes(src: impl Into<String>, bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::new(src, img.to_rgba8()))
    }

    /// The source this image was loaded from, if not yet released
    pub fn src(&self) -> Option<String> {
        self.src.borrow().clone()
    }

    /// Borrow the pixel data, if not yet released
    pub fn pixels(&self) -> Option<Ref<'_, RgbaImage>> {
        Ref::filter_map(self.pixels.borrow(), Option::as_ref).ok()
    }

    /// Image dimensions, or (0, 0) once released
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels().map(|p| p.dimensions()).unwrap_or((0, 0))
    }

    /// Clear the source and drop the pixel data
    pub fn clear_src(&self) {
        self.src.borrow_mut().take();
        self.pixels.borrow_mut().take();
    }

    /// Check if the image has been released
    pub fn is_released(&self) -> bool {
        self.src.borrow().is_none()
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("src", &self.src())
            .field("dimensions", &self.dimensions())
            .finish()
    }
}

/// A loaded asset
pub enum AssetContent {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Image(ImageAsset),
    Atlas(SpriteAtlas),
    /// Results of a nested list load, in completion order
    List(Vec<Option<AssetRef>>),
    /// Results of a nested keyed load
    Map(IndexMap<String, Option<AssetRef>>),
    Resource(Box<dyn Resource>),
}

impl AssetContent {
    /// Release the payload
    ///
    /// Resources are destroyed, images and atlases drop their pixel data,
    /// plain data has nothing to release.
    pub fn destroy(&self) {
        match self {
            AssetContent::Resource(resource) => resource.destroy(),
            AssetContent::Image(image) => image.clear_src(),
            AssetContent::Atlas(atlas) => atlas.destroy(),
            _ => {}
        }
    }

    /// Short name of the payload kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            AssetContent::Text(_) => "text",
            AssetContent::Json(_) => "json",
            AssetContent::Bytes(_) => "bytes",
            AssetContent::Image(_) => "image",
            AssetContent::Atlas(_) => "atlas",
            AssetContent::List(_) => "list",
            AssetContent::Map(_) => "map",
            AssetContent::Resource(_) => "resource",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AssetContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            AssetContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AssetContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageAsset> {
        match self {
            AssetContent::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_atlas(&self) -> Option<&SpriteAtlas> {
        match self {
            AssetContent::Atlas(atlas) => Some(atlas),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Option<AssetRef>]> {
        match self {
            AssetContent::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Option<AssetRef>>> {
        match self {
            AssetContent::Map(items) => Some(items),
            _ => None,
        }
    }

    /// Downcast a resource payload to its concrete type
    pub fn resource<T: 'static>(&self) -> Option<&T> {
        match self {
            AssetContent::Resource(resource) => resource.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for AssetContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetContent::Text(text) => f.debug_tuple("Text").field(text).finish(),
            AssetContent::Json(value) => f.debug_tuple("Json").field(value).finish(),
            AssetContent::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            AssetContent::Image(image) => f.debug_tuple("Image").field(image).finish(),
            AssetContent::Atlas(atlas) => f.debug_tuple("Atlas").field(atlas).finish(),
            AssetContent::List(items) => f.debug_tuple("List").field(items).finish(),
            AssetContent::Map(items) => f.debug_tuple("Map").field(items).finish(),
            AssetContent::Resource(_) => f.write_str("Resource(..)"),
        }
    }
}

impl From<String> for AssetContent {
    fn from(text: String) -> Self {
        AssetContent::Text(text)
    }
}

impl From<&str> for AssetContent {
    fn from(text: &str) -> Self {
        AssetContent::Text(text.to_string())
    }
}

impl From<serde_json::Value> for AssetContent {
    fn from(value: serde_json::Value) -> Self {
        AssetContent::Json(value)
    }
}

impl From<Vec<u8>> for AssetContent {
    fn from(bytes: Vec<u8>) -> Self {
        AssetContent::Bytes(bytes)
    }
}
