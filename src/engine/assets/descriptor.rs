// Caller-supplied asset descriptors and load inputs

use super::content::{AssetContent, AssetRef};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Completion handed to an async loader function
pub type AsyncDone = Box<dyn FnOnce(Option<AssetContent>)>;

/// A function that produces an asset and reports it through its completion
pub type AsyncLoader = Rc<dyn Fn(AsyncDone)>;

/// Per-asset completion: `(result, original descriptor, new assets to load)`
pub type AssetCompleteFn = Rc<dyn Fn(Option<&AssetRef>, &AssetDescriptor, &mut Vec<AssetDescriptor>)>;

/// Description of one loadable thing
///
/// Strings normalize to `{src}`, functions to `{loader}`. Which fields are set
/// decides which task type claims the descriptor.
#[derive(Clone, Default)]
pub struct AssetDescriptor {
    /// Result id; required for caching unless one can be derived
    pub id: Option<String>,

    /// URL of a single file
    pub src: Option<String>,

    /// Type tag, inherited from the session default when absent
    pub type_tag: Option<String>,

    /// Whether to store the result in the cache
    pub cache: Option<bool>,

    /// Apply caching to every nested asset of a composite
    pub cache_all: bool,

    /// Nested assets of a composite list
    pub assets: Option<Box<Assets>>,

    /// Function producing the asset
    pub loader: Option<AsyncLoader>,

    /// Color image of a dual-image merge
    pub color: Option<String>,

    /// Alpha image of a dual-image merge
    pub alpha: Option<String>,

    /// URL of a manifest whose entries are loaded into the same session
    pub manifest: Option<String>,

    /// Frame data of a sprite atlas
    pub atlas: Option<String>,

    /// Sheet image of a sprite atlas
    pub image: Option<String>,

    /// Per-asset completion callback
    pub complete: Option<AssetCompleteFn>,

    /// Fields not understood by the built-in task types
    pub extra: Map<String, Value>,

    /// Scale chosen when the URL's size token was substituted
    scale: Cell<Option<f32>>,
}

impl AssetDescriptor {
    /// Descriptor for a single URL
    pub fn src(url: impl Into<String>) -> Self {
        Self {
            src: Some(url.into()),
            ..Default::default()
        }
    }

    /// Descriptor for a composite list of assets
    pub fn list(assets: impl Into<Assets>) -> Self {
        Self {
            assets: Some(Box::new(assets.into())),
            ..Default::default()
        }
    }

    /// Descriptor for an async function
    pub fn function(loader: impl Fn(AsyncDone) + 'static) -> Self {
        Self {
            loader: Some(Rc::new(loader)),
            ..Default::default()
        }
    }

    /// Descriptor for an image merged from a color and an alpha image
    pub fn color_alpha(color: impl Into<String>, alpha: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            alpha: Some(alpha.into()),
            ..Default::default()
        }
    }

    /// Descriptor for a sprite atlas: frame data plus its sheet image
    pub fn atlas(atlas: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            atlas: Some(atlas.into()),
            image: Some(image.into()),
            ..Default::default()
        }
    }

    /// Descriptor for a manifest of further assets
    pub fn manifest(url: impl Into<String>) -> Self {
        Self {
            manifest: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_all(mut self, cache_all: bool) -> Self {
        self.cache_all = cache_all;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Set the per-asset completion callback
    pub fn with_complete(
        mut self,
        complete: impl Fn(Option<&AssetRef>, &AssetDescriptor, &mut Vec<AssetDescriptor>) + 'static,
    ) -> Self {
        self.complete = Some(Rc::new(complete));
        self
    }

    /// Scale recorded by the size filter, if a size token was substituted
    pub fn scale(&self) -> Option<f32> {
        self.scale.get()
    }

    pub(crate) fn set_scale(&self, scale: f32) {
        self.scale.set(Some(scale));
    }

    /// Parse a descriptor from manifest JSON
    ///
    /// Strings become `{src}`. Objects map their known fields and keep the
    /// rest in `extra`. Anything else, or an object with a mistyped known
    /// field, is rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(url) => Some(Self::src(url.as_str())),
            Value::Object(_) => match DescriptorFields::deserialize(value) {
                Ok(fields) => Some(fields.into()),
                Err(err) => {
                    log::warn!("Skipping malformed asset entry: {}", err);
                    None
                }
            },
            _ => None,
        }
    }

    /// Check if an object looks like a single descriptor rather than a keyed map
    fn is_descriptor_object(fields: &Map<String, Value>) -> bool {
        const KEYS: [&str; 6] = ["src", "assets", "color", "manifest", "atlas", "image"];
        KEYS.iter().any(|key| fields.contains_key(*key))
    }
}

/// Manifest form of a descriptor object
#[derive(Deserialize)]
struct DescriptorFields {
    id: Option<String>,
    src: Option<String>,
    #[serde(rename = "type")]
    type_tag: Option<String>,
    cache: Option<bool>,
    #[serde(rename = "cacheAll", default)]
    cache_all: bool,
    assets: Option<Value>,
    color: Option<String>,
    alpha: Option<String>,
    manifest: Option<String>,
    atlas: Option<String>,
    image: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<DescriptorFields> for AssetDescriptor {
    fn from(fields: DescriptorFields) -> Self {
        Self {
            id: fields.id,
            src: fields.src,
            type_tag: fields.type_tag,
            cache: fields.cache,
            cache_all: fields.cache_all,
            assets: fields
                .assets
                .as_ref()
                .and_then(Assets::from_json)
                .map(Box::new),
            color: fields.color,
            alpha: fields.alpha,
            manifest: fields.manifest,
            atlas: fields.atlas,
            image: fields.image,
            extra: fields.extra,
            ..Default::default()
        }
    }
}

impl fmt::Debug for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("AssetDescriptor");
        out.field("id", &self.id);
        if let Some(src) = &self.src {
            out.field("src", src);
        }
        if let Some(type_tag) = &self.type_tag {
            out.field("type", type_tag);
        }
        if let Some(cache) = self.cache {
            out.field("cache", &cache);
        }
        if let Some(assets) = &self.assets {
            out.field("assets", assets);
        }
        if self.loader.is_some() {
            out.field("loader", &"<fn>");
        }
        if let (Some(color), Some(alpha)) = (&self.color, &self.alpha) {
            out.field("color", color).field("alpha", alpha);
        }
        if let Some(manifest) = &self.manifest {
            out.field("manifest", manifest);
        }
        if let Some(atlas) = &self.atlas {
            out.field("atlas", atlas);
        }
        if let Some(image) = &self.image {
            out.field("image", image);
        }
        out.finish_non_exhaustive()
    }
}

impl From<&str> for AssetDescriptor {
    fn from(url: &str) -> Self {
        Self::src(url)
    }
}

impl From<String> for AssetDescriptor {
    fn from(url: String) -> Self {
        Self::src(url)
    }
}

/// Input of one load: a single asset, a list, or a keyed map
#[derive(Debug, Clone)]
pub enum Assets {
    One(AssetDescriptor),
    List(Vec<AssetDescriptor>),
    Map(IndexMap<String, AssetDescriptor>),
}

impl Assets {
    /// Build a keyed map input
    pub fn map<K, D, I>(entries: I) -> Self
    where
        K: Into<String>,
        D: Into<AssetDescriptor>,
        I: IntoIterator<Item = (K, D)>,
    {
        Assets::Map(
            entries
                .into_iter()
                .map(|(key, asset)| (key.into(), asset.into()))
                .collect(),
        )
    }

    /// Number of top-level descriptors
    pub fn len(&self) -> usize {
        match self {
            Assets::One(_) => 1,
            Assets::List(items) => items.len(),
            Assets::Map(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into descriptors, keyed entries taking their key as id
    pub fn into_descriptors(self) -> Vec<AssetDescriptor> {
        match self {
            Assets::One(asset) => vec![asset],
            Assets::List(items) => items,
            Assets::Map(items) => items
                .into_iter()
                .map(|(key, mut asset)| {
                    asset.id.get_or_insert(key);
                    asset
                })
                .collect(),
        }
    }

    /// Parse a load input from manifest JSON
    ///
    /// Arrays become lists. Objects with descriptor fields become a single
    /// asset, other objects a keyed map.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => AssetDescriptor::from_json(value).map(Assets::One),
            Value::Array(items) => Some(Assets::List(
                items.iter().filter_map(AssetDescriptor::from_json).collect(),
            )),
            Value::Object(fields) if AssetDescriptor::is_descriptor_object(fields) => {
                AssetDescriptor::from_json(value).map(Assets::One)
            }
            Value::Object(fields) => Some(Assets::Map(
                fields
                    .iter()
                    .filter_map(|(key, field)| {
                        AssetDescriptor::from_json(field).map(|asset| (key.clone(), asset))
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl From<AssetDescriptor> for Assets {
    fn from(asset: AssetDescriptor) -> Self {
        Assets::One(asset)
    }
}

impl From<&str> for Assets {
    fn from(url: &str) -> Self {
        Assets::One(AssetDescriptor::src(url))
    }
}

impl From<String> for Assets {
    fn from(url: String) -> Self {
        Assets::One(AssetDescriptor::src(url))
    }
}

impl<T: Into<AssetDescriptor>> From<Vec<T>> for Assets {
    fn from(items: Vec<T>) -> Self {
        Assets::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AssetDescriptor>, const N: usize> From<[T; N]> for Assets {
    fn from(items: [T; N]) -> Self {
        Assets::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, AssetDescriptor>> for Assets {
    fn from(items: IndexMap<String, AssetDescriptor>) -> Self {
        Assets::Map(items)
    }
}
