// Display-dependent asset size selection

use super::descriptor::AssetDescriptor;
use serde::Deserialize;
use std::cell::Cell;

/// Token replaced in asset URLs by the selected size id
pub const SIZE_TOKEN: &str = "%SIZE%";

/// One size profile, e.g. `{id: "sd", max_size: 800, scale: 0.5}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetSize {
    /// Substituted for the size token in URLs
    pub id: String,

    /// Largest display dimension this profile is meant for
    #[serde(rename = "maxSize", alias = "max_size")]
    pub max_size: u32,

    /// Scale of the art relative to full size
    pub scale: f32,
}

impl AssetSize {
    pub fn new(id: impl Into<String>, max_size: u32, scale: f32) -> Self {
        Self {
            id: id.into(),
            max_size,
            scale,
        }
    }
}

/// Supplies the size profile assets should currently be loaded at
pub trait SizeNegotiator {
    fn current(&self) -> Option<AssetSize>;
}

/// Size profiles selected by display dimensions
#[derive(Debug)]
pub struct AssetSizes {
    /// Profiles sorted by ascending max size
    sizes: Vec<AssetSize>,

    /// Index of the selected profile
    selected: Cell<Option<usize>>,
}

impl AssetSizes {
    /// Create from a list of profiles; the largest is selected until `refresh`
    pub fn new(mut sizes: Vec<AssetSize>) -> Self {
        sizes.sort_by_key(|size| size.max_size);
        let selected = sizes.len().checked_sub(1);
        Self {
            sizes,
            selected: Cell::new(selected),
        }
    }

    /// Select the smallest profile that covers the display
    ///
    /// Falls back to the largest profile when none is big enough.
    pub fn refresh(&self, width: u32, height: u32) {
        let target = width.max(height);
        let index = self
            .sizes
            .iter()
            .position(|size| size.max_size >= target)
            .or_else(|| self.sizes.len().checked_sub(1));

        if index != self.selected.get() {
            if let Some(size) = index.and_then(|i| self.sizes.get(i)) {
                log::info!("Asset size '{}' selected for {}x{}", size.id, width, height);
            }
        }
        self.selected.set(index);
    }

    /// All profiles, smallest first
    pub fn sizes(&self) -> &[AssetSize] {
        &self.sizes
    }
}

impl Default for AssetSizes {
    fn default() -> Self {
        Self::new(vec![AssetSize::new("sd", 800, 0.5), AssetSize::new("hd", 1600, 1.0)])
    }
}

impl SizeNegotiator for AssetSizes {
    fn current(&self) -> Option<AssetSize> {
        self.selected.get().and_then(|i| self.sizes.get(i)).cloned()
    }
}

/// Replace the size token in a URL and record the chosen scale on the descriptor
///
/// URLs without the token pass through unchanged.
pub fn filter_url(sizes: &dyn SizeNegotiator, url: &str, asset: &AssetDescriptor) -> String {
    if !url.contains(SIZE_TOKEN) {
        return url.to_string();
    }

    match sizes.current() {
        Some(size) => {
            asset.set_scale(size.scale);
            url.replace(SIZE_TOKEN, &size.id)
        }
        None => {
            log::warn!("No asset size available for '{}'", url);
            url.to_string()
        }
    }
}
