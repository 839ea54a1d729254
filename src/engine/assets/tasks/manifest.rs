// Manifests whose entries join the load that requested them

use crate::engine::assets::content::AssetContent;
use crate::engine::assets::descriptor::{AssetDescriptor, Assets};
use crate::engine::assets::task::{Task, TaskContext, TaskDone, TaskType};
use crate::engine::assets::AssetError;
use std::rc::Rc;

/// Claims descriptors with a `manifest` URL
pub struct ManifestTaskType;

impl TaskType for ManifestTaskType {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn test(&self, asset: &AssetDescriptor) -> bool {
        asset.manifest.is_some()
    }

    fn fallback_id<'a>(&self, asset: &'a AssetDescriptor) -> Option<&'a str> {
        asset.manifest.as_deref()
    }

    fn create(&self, asset: Rc<AssetDescriptor>) -> Box<dyn Task> {
        Box::new(ManifestTask { asset })
    }
}

struct ManifestTask {
    asset: Rc<AssetDescriptor>,
}

impl Task for ManifestTask {
    fn start(self: Box<Self>, ctx: TaskContext, done: TaskDone) {
        let Some(manifest) = self.asset.manifest.as_deref() else {
            done.finish(None);
            return;
        };

        let url = ctx.filter(manifest, &self.asset);
        let target = url.clone();
        ctx.fetch(
            &url,
            Box::new(move |result| {
                let parsed = result.and_then(|bytes| {
                    serde_json::from_slice::<serde_json::Value>(&bytes).map_err(AssetError::from)
                });
                let value = match parsed {
                    Ok(value) => value,
                    Err(err) => {
                        log::warn!("Manifest '{}' failed: {}", target, err);
                        done.finish(None);
                        return;
                    }
                };

                let entries = Assets::from_json(&value)
                    .map(Assets::into_descriptors)
                    .unwrap_or_default();
                log::debug!("Manifest '{}' lists {} assets", target, entries.len());

                if let Err(err) = done.finish_with(Some(Rc::new(AssetContent::Json(value))), entries) {
                    log::debug!("Manifest '{}' rejected by its load: {}", target, err);
                }
            }),
        );
    }
}
