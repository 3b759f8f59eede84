//! Runs the avalanche evaluation graph on files described by a settings
//! JSON and writes the results below its output directory.

mod settings;

use anyhow::{Context as _, Result};
use gpu_runtime::Context;

pub use settings::{EVAL_FRICTION_MODEL, EVAL_STEP_LENGTH, EvalSettings, SettingsError};

/// Builds and runs the evaluation graph, then writes the effective
/// `settings.json` and `timings.json` next to the exported rasters.
pub fn run_eval(context: &Context, settings: &EvalSettings) -> Result<()> {
    let graph_settings = settings.graph_settings()?;
    let mut graph = nodes::build_eval_graph(context, &graph_settings);
    log::info!("running evaluation graph with {} nodes", graph.len());
    graph.run()?;
    log::info!("run successful");

    let output_dir = &settings.output_dir_path;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {}", output_dir.display()))?;
    let settings_path = output_dir.join("settings.json");
    log::debug!("writing settings to {}", settings_path.display());
    settings
        .effective()
        .write_to_json_file(&settings_path)
        .with_context(|| format!("write {}", settings_path.display()))?;
    let timings_path = output_dir.join("timings.json");
    log::debug!("writing timings to {}", timings_path.display());
    graph
        .write_timings_to_json_file(&timings_path)
        .with_context(|| format!("write {}", timings_path.display()))?;
    Ok(())
}
