use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rusted_assets::engine::assets::{
    AssetConfig, AssetContent, AssetManager, AssetRef, Assets, BackgroundTransport,
    FileTransport, LoadResults, Transport,
};
use rusted_assets::engine::sprites;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(name = "rusted-assets", version, about = "Load every asset a manifest lists")]
struct Cli {
    /// Manifest JSON: a URL, a list of assets, or a map of id to asset
    manifest: PathBuf,

    /// Directory asset URLs are resolved against
    #[arg(long)]
    base: Option<PathBuf>,

    /// Asset configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load assets one at a time
    #[arg(long)]
    serial: bool,

    /// Cache every loaded asset
    #[arg(long)]
    cache_all: bool,

    /// Read files on worker threads
    #[arg(long)]
    background: bool,
}

fn describe(content: Option<&AssetRef>) -> String {
    match content.map(|c| c.as_ref()) {
        None => "nothing".to_string(),
        Some(AssetContent::Text(text)) => format!("text, {} chars", text.chars().count()),
        Some(AssetContent::Json(_)) => "json".to_string(),
        Some(AssetContent::Bytes(bytes)) => format!("{} bytes", bytes.len()),
        Some(AssetContent::Image(image)) => {
            let (width, height) = image.dimensions();
            format!("image {}x{}", width, height)
        }
        Some(AssetContent::Atlas(atlas)) => format!("atlas, {} regions", atlas.region_count()),
        Some(AssetContent::List(items)) => format!("list of {}", items.len()),
        Some(AssetContent::Map(items)) => format!("map of {}", items.len()),
        Some(AssetContent::Resource(_)) => "resource".to_string(),
    }
}

fn report(results: &LoadResults) {
    match results {
        LoadResults::Single(value) => info!("  {}", describe(value.as_ref())),
        LoadResults::List(items) => {
            for (index, item) in items.iter().enumerate() {
                info!("  #{}: {}", index, describe(item.as_ref()));
            }
        }
        LoadResults::Map(items) => {
            for (id, item) in items {
                info!("  {}: {}", id, describe(item.as_ref()));
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AssetConfig::from_file(path)?,
        None => AssetConfig::default(),
    };
    if let Some(base) = cli.base {
        config.base_path = base;
    }
    if cli.serial {
        config.start_all = false;
    }
    if cli.cache_all {
        config.cache_all = true;
    }

    let text = std::fs::read_to_string(&cli.manifest)
        .with_context(|| format!("Failed to read manifest {}", cli.manifest.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text).context("Invalid manifest")?;
    let Some(assets) = Assets::from_json(&value) else {
        bail!("Manifest must be a URL, a list, or a map of assets");
    };

    info!(
        "Loading {} assets from {}",
        assets.len(),
        config.base_path.display()
    );

    let background = if cli.background {
        let transport = BackgroundTransport::new(&config.base_path, config.fetch_workers)?
            .with_retries(config.max_retries);
        info!("Reading assets on {} worker threads", transport.workers());
        Some(Rc::new(transport))
    } else {
        None
    };
    let transport: Rc<dyn Transport> = match &background {
        Some(background) => background.clone(),
        None => Rc::new(FileTransport::new(&config.base_path).with_retries(config.max_retries)),
    };

    let manager = AssetManager::with_config(&config, transport);
    sprites::register(&manager);

    let finished: Rc<RefCell<Option<LoadResults>>> = Rc::new(RefCell::new(None));
    let failed: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    let on_complete = finished.clone();
    let on_error = failed.clone();
    let options = manager
        .options()
        .on_progress(|progress| info!("Loading... {:.0}%", progress * 100.0))
        .on_complete(move |results| *on_complete.borrow_mut() = Some(results))
        .on_error(move |err| *on_error.borrow_mut() = Some(err.to_string()));
    manager.load(assets, options);

    if let Some(background) = &background {
        while finished.borrow().is_none() && failed.borrow().is_none() && !background.is_idle() {
            background.wait();
        }
    }

    if let Some(err) = failed.borrow_mut().take() {
        bail!("Load failed: {}", err);
    }
    let Some(results) = finished.borrow_mut().take() else {
        bail!("Load did not complete");
    };

    info!("Loaded {} results in {:?} mode", results.len(), results.mode());
    report(&results);

    manager.destroy();
    Ok(())
}
