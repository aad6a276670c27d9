//! Demo cohort and mock views
//! Synthetic samples, genes and mutations plus console-only panels that log
//! what a real rendered view would redraw.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use gv_core::events::{FilterApply, Highlight, SelectionBrush, SelectionChange, SelectionClear};
use gv_core::ViewAdapter;

/// A sample positioned in the scatter plot (e.g. two expression PCs)
#[derive(Debug, Clone)]
pub struct SamplePoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct Mutation {
    pub id: String,
    pub gene: String,
    pub sample: String,
}

/// Synthetic cohort
pub struct DemoCohort {
    pub samples: Vec<SamplePoint>,
    pub genes: Vec<String>,
    pub mutations: Vec<Mutation>,
}

impl DemoCohort {
    pub fn new() -> Self {
        let samples = (1..=12)
            .map(|i| {
                let t = i as f64 * 0.5;
                SamplePoint {
                    id: format!("S{i}"),
                    x: t.sin() * 4.0 + t,
                    y: t.cos() * 3.0,
                }
            })
            .collect();

        let genes: Vec<String> = ["TP53", "KRAS", "PIK3CA", "EGFR", "BRAF"]
            .into_iter()
            .map(String::from)
            .collect();

        let mutations = [
            ("TP53", "p.R175H", 1),
            ("TP53", "p.R248Q", 4),
            ("KRAS", "p.G12D", 2),
            ("KRAS", "p.G12V", 7),
            ("PIK3CA", "p.H1047R", 3),
            ("EGFR", "p.L858R", 9),
            ("BRAF", "p.V600E", 11),
        ]
        .into_iter()
        .map(|(gene, change, sample)| Mutation {
            id: format!("{gene}:{change}"),
            gene: gene.to_string(),
            sample: format!("S{sample}"),
        })
        .collect();

        Self {
            samples,
            genes,
            mutations,
        }
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.id.as_str())
    }

    pub fn mutation_ids(&self) -> impl Iterator<Item = &str> {
        self.mutations.iter().map(|m| m.id.as_str())
    }

    /// Mutations carried by any of `samples`
    pub fn mutations_in<'a>(&'a self, samples: &'a [String]) -> impl Iterator<Item = &'a Mutation> {
        self.mutations.iter().filter(move |m| samples.contains(&m.sample))
    }
}

/// What a mock view has been told to draw, for the session summary
#[derive(Debug, Default)]
pub struct ViewLog {
    pub redraws: usize,
    pub last: Option<String>,
}

/// Console stand-in for a rendered panel
pub struct MockView {
    id: String,
    log: Mutex<ViewLog>,
}

impl MockView {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            log: Mutex::new(ViewLog::default()),
        })
    }

    pub fn redraws(&self) -> usize {
        self.log.lock().redraws
    }

    pub fn last(&self) -> Option<String> {
        self.log.lock().last.clone()
    }

    fn redraw(&self, reason: String) {
        info!(view = %self.id, "{reason}");
        let mut log = self.log.lock();
        log.redraws += 1;
        log.last = Some(reason);
    }
}

impl ViewAdapter for MockView {
    fn view_id(&self) -> &str {
        &self.id
    }

    fn on_selection_change(&self, change: &SelectionChange) -> anyhow::Result<()> {
        self.redraw(format!(
            "selection from {}: {} samples, {} genes, {} mutations",
            change.source,
            change.sample_ids.len(),
            change.gene_ids.len(),
            change.mutation_ids.len()
        ));
        Ok(())
    }

    fn on_selection_clear(&self, clear: &SelectionClear) -> anyhow::Result<()> {
        let space = clear.id_space.map_or("all", |space| space.as_str());
        self.redraw(format!("selection cleared ({space}) by {}", clear.source));
        Ok(())
    }

    fn on_selection_brush(&self, brush: &SelectionBrush) -> anyhow::Result<()> {
        let b = brush.bounds;
        self.redraw(format!(
            "brush overlay [{:.1}, {:.1}] x [{:.1}, {:.1}] ({} hits)",
            b.x0,
            b.x1,
            b.y0,
            b.y1,
            brush.ids.len()
        ));
        Ok(())
    }

    fn on_highlight_show(&self, highlight: &Highlight) -> anyhow::Result<()> {
        let ids: Vec<&str> = highlight
            .sample_ids
            .iter()
            .chain(&highlight.gene_ids)
            .chain(&highlight.mutation_ids)
            .map(String::as_str)
            .collect();
        self.redraw(format!("emphasise {}", ids.join(", ")));
        Ok(())
    }

    fn on_highlight_hide(&self, _highlight: &Highlight) -> anyhow::Result<()> {
        self.redraw("emphasis removed".to_string());
        Ok(())
    }

    fn on_filter_apply(&self, filters: &FilterApply) -> anyhow::Result<()> {
        let names: Vec<&str> = filters.filters.keys().map(String::as_str).collect();
        self.redraw(format!("filters {}", names.join(", ")));
        Ok(())
    }
}
