use super::helpers::{render_orbital_table, write_run_output};
use super::{CliError, compute};
use relhf_core::common::config::RunConfig;
use relhf_core::hf::HartreeFock;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args, Debug, Default)]
pub(super) struct RunArgs {
    /// JSON run configuration; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Nuclear charge
    #[arg(long)]
    z: Option<u32>,

    /// Nuclear mass number (uniformly charged sphere)
    #[arg(long)]
    mass_number: Option<f64>,

    /// Core configuration, e.g. "[Ne],3s2" or "1s2 2s2 2p6"
    #[arg(long)]
    core: Option<String>,

    /// Valence shells, e.g. "2s,2p"
    #[arg(long)]
    valence: Option<String>,

    /// HartreeFock, ApproxHF, Hartree, GreenPRM or TietzPRM
    #[arg(long)]
    method: Option<String>,

    /// Convergence target: an epsilon below 1, otherwise its negative exponent
    #[arg(long)]
    eps: Option<f64>,

    /// Number of radial grid points
    #[arg(long)]
    points: Option<usize>,

    /// First grid point (bohr)
    #[arg(long)]
    r0: Option<f64>,

    /// Last grid point (bohr)
    #[arg(long)]
    rmax: Option<f64>,

    /// Log-linear turnover radius; 0 selects a logarithmic grid
    #[arg(long)]
    grid_b: Option<f64>,

    /// Write the JSON report here
    #[arg(long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn resolve_config(&self) -> Result<RunConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_path(path).map_err(compute)?,
            None => RunConfig::default(),
        };
        if let Some(z) = self.z {
            config.nucleus.z = z;
        }
        if let Some(mass_number) = self.mass_number {
            config.nucleus.mass_number = Some(mass_number);
        }
        if let Some(core) = &self.core {
            config.core = core.clone();
        }
        if let Some(valence) = &self.valence {
            config.valence = valence.clone();
        }
        if let Some(method) = &self.method {
            config.hartree_fock.method = method.clone();
        }
        if let Some(eps) = self.eps {
            config.hartree_fock.eps_hf = eps;
        }
        if let Some(points) = self.points {
            config.grid.points = points;
        }
        if let Some(r0) = self.r0 {
            config.grid.r0 = r0;
        }
        if let Some(rmax) = self.rmax {
            config.grid.rmax = rmax;
        }
        if let Some(b) = self.grid_b {
            config.grid.b = (b > 0.0).then_some(b);
        }
        config.validate().map_err(compute)?;
        Ok(config)
    }
}

pub(super) fn run_command(args: RunArgs) -> Result<i32, CliError> {
    let config = args.resolve_config()?;
    let mut hf = HartreeFock::from_config(&config).map_err(compute)?;
    let mut report = hf.run(&config.core).map_err(compute)?;
    if !config.valence.trim().is_empty() {
        report = hf.run_valence(&config.valence).map_err(compute)?;
    }

    print!("{}", render_orbital_table(&config, &report));
    if let Some(path) = &args.output {
        write_run_output(path, &config, &report)?;
        info!(path = %path.display(), "report written");
    }
    Ok(0)
}

pub(super) fn config_command() -> Result<i32, CliError> {
    let rendered = RunConfig::default().to_json_pretty().map_err(compute)?;
    println!("{rendered}");
    Ok(0)
}
