use super::CliError;
use anyhow::Context;
use relhf_core::common::config::RunConfig;
use relhf_core::hf::HartreeFockReport;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Serialize)]
struct RunOutput<'a> {
    config: &'a RunConfig,
    report: &'a HartreeFockReport,
}

pub(super) fn render_orbital_table(config: &RunConfig, report: &HartreeFockReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Z = {}  method = {}  core = {}",
        report.z, report.method, config.core
    );
    let _ = writeln!(
        out,
        "{:<8} {:>20} {:>10} {:>6} {:>6} {:>8}",
        "orbital", "energy (au)", "eps", "its", "nodes", "occ"
    );
    for orbital in &report.orbitals {
        let marker = if orbital.core { "" } else { " v" };
        let _ = writeln!(
            out,
            "{:<8} {:>20.12} {:>10.1e} {:>6} {:>6} {:>8.4}{}",
            orbital.symbol,
            orbital.en,
            orbital.eps,
            orbital.iterations,
            orbital.nodes,
            orbital.occupation,
            marker
        );
    }
    let status = if report.converged() { "converged" } else { "NOT converged" };
    let _ = writeln!(
        out,
        "core: {} iterations, eps = {:.1e} ({status})",
        report.core_loop.iterations, report.core_loop.eps
    );
    if let Some(refinement) = &report.core_refinement {
        let _ = writeln!(
            out,
            "refinement: {} iterations, eps = {:.1e}",
            refinement.iterations, refinement.eps
        );
    }
    let _ = writeln!(out, "E_core = {:.10} au", report.core_energy);
    out
}

pub(super) fn write_run_output(
    path: &Path,
    config: &RunConfig,
    report: &HartreeFockReport,
) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    let rendered = serde_json::to_string_pretty(&RunOutput { config, report })
        .context("failed to serialise the run report")?;
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write report '{}'", path.display()))?;
    Ok(())
}
