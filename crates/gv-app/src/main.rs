//! Main application entry point
//!
//! Wires one shared store and event bus into three linked mock views and
//! drives a scripted exploration session from the command line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gv_core::{
    BrushBounds, ClearTarget, CoreConfig, EventBus, HighlightManager, HighlightTarget, IdSpace,
    Object, SelectOptions, SelectionManager, Store, SyncManager, Value, ViewAdapter,
    ViewSyncSettings,
};

mod demo;

use demo::{DemoCohort, MockView};

/// Command line: `genoview [--config <path>]`
fn parse_args() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(config)
}

fn load_config(path: Option<PathBuf>) -> Result<CoreConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config = CoreConfig::from_json_str(&json)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            info!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        None => Ok(CoreConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(parse_args()?)?;
    info!(?config, "Starting genoview");

    // Shared state, injected into every manager
    let bus = Arc::new(EventBus::from_config(&config));
    let store = Arc::new(Store::from_config(&config, bus.clone()));
    let selection = SelectionManager::from_config(store.clone(), bus.clone(), &config);
    let highlight = HighlightManager::from_config(store.clone(), bus.clone(), &config);
    let sync = SyncManager::new(store.clone(), bus.clone());

    let cohort = DemoCohort::new();
    selection.load_dataset(IdSpace::Sample, cohort.sample_ids())?;
    selection.load_dataset(IdSpace::Gene, cohort.genes.iter().map(String::as_str))?;
    selection.load_dataset(IdSpace::Mutation, cohort.mutation_ids())?;

    let scatter = MockView::new("scatter");
    let heatmap = MockView::new("heatmap");
    let table = MockView::new("mutation-table");
    for view in [&scatter, &heatmap, &table] {
        let adapter: Arc<dyn ViewAdapter> = view.clone();
        sync.connect(&adapter, ViewSyncSettings::default());
    }

    // Brush a region of the scatter plot
    let brushed = selection.select_from_brush(
        IdSpace::Sample,
        BrushBounds::new(0.0, -3.0, 5.0, 1.0),
        &cohort.samples,
        |point| (point.id.as_str(), point.x, point.y),
        SelectOptions::from_source("scatter"),
    )?;
    info!(samples = ?brushed, "brushed samples");

    // A renderer styles every point per frame from one hash-set snapshot
    let selected = selection.selected_set(IdSpace::Sample);
    let emphasised = cohort.samples.iter().filter(|p| selected.contains(&p.id)).count();
    info!(emphasised, dimmed = cohort.samples.len() - emphasised, "scatter frame");

    // The table follows up with the mutations carried by those samples
    let carried: Vec<String> = cohort.mutations_in(&brushed).map(|m| m.id.clone()).collect();
    selection.select(
        IdSpace::Mutation,
        carried,
        SelectOptions::from_source("mutation-table"),
    )?;

    // Hover a gene row in the heatmap, then move away
    highlight.show(HighlightTarget::of(IdSpace::Gene, ["TP53"]), "heatmap")?;
    tokio::time::sleep(config.highlight_delay + Duration::from_millis(20)).await;
    highlight.hide("heatmap")?;

    // Table-driven filters are undoable through the store
    let mut filters = Object::new();
    filters.insert("minVaf".to_string(), Value::from(0.05));
    filters.insert("genes".to_string(), Value::id_set(["TP53", "KRAS"]));
    sync.apply_filters(filters, "mutation-table")?;

    let url = selection.to_url_params();
    info!(%url, "shareable selection");

    selection.undo()?;
    store.undo()?;
    info!(filters = ?sync.filters(), "filters after undo");

    selection.clear(ClearTarget::All, SelectOptions::from_source("scatter"))?;
    selection.from_url_params(&url)?;
    info!(state = ?selection.state(), "selection restored from url");

    for view in [&scatter, &heatmap, &table] {
        info!(
            view = view.view_id(),
            redraws = view.redraws(),
            last = view.last().as_deref().unwrap_or("-"),
            "session summary"
        );
    }
    info!(events = bus.history().len(), "event history");
    info!(snapshot = %store.to_json()?, "final state");

    Ok(())
}
