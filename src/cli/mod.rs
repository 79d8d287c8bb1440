//! Command-line parsing for the AFM force-curve fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! preprocessing and fitting code. `app::params_from_args` turns the parsed
//! flags into an `AnalysisParameters` value.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{IndenterGeometry, ModelKind, ScanOrder, SegmentKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "afm", version, about = "AFM force-curve analysis (Hertz / Ting)")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every curve of one or more force-map JSON files.
    Fit(FitArgs),
    /// Generate a synthetic force map and fit it.
    Demo(DemoArgs),
    /// Print a previously exported results JSON.
    Show(ShowArgs),
}

/// Analysis settings shared by `fit` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct AnalysisArgs {
    /// Model to fit.
    #[arg(short, long, value_enum, default_value_t = ModelKind::Hertz)]
    pub model: ModelKind,

    /// Height channel used as the z axis, for every file.
    ///
    /// Without it each file's recorded channel is used ("height" if none).
    #[arg(long)]
    pub height_channel: Option<String>,

    /// Deflection sensitivity (nm/V) for every file.
    ///
    /// Without it each file's recorded value is used (20 nm/V if none).
    #[arg(long)]
    pub sensitivity: Option<f64>,

    /// Cantilever spring constant (N/m) for every file.
    ///
    /// Without it each file's recorded value is used (0.05 N/m if none).
    #[arg(short = 'k', long)]
    pub spring_constant: Option<f64>,

    /// Rate-of-Variance window (samples).
    #[arg(long, default_value_t = 50)]
    pub poc_window: usize,

    /// Segment used for the Hertz fit.
    #[arg(long, value_enum, default_value_t = SegmentKind::Extend)]
    pub segment: SegmentKind,

    /// Enable viscous drag correction with a baseline polynomial of this order.
    #[arg(long)]
    pub drag_order: Option<usize>,

    /// Ramp speed (m/s) used to report the drag coefficient.
    #[arg(long, default_value_t = 0.0)]
    pub ramp_speed: f64,

    /// Samples below -offset (m) are excluded from fits.
    #[arg(long, default_value_t = 1e-6)]
    pub contact_offset: f64,

    /// Moving-average window (samples) applied to the indentation for Ting.
    #[arg(long, default_value_t = 5)]
    pub smoothing_window: usize,

    /// Indenter geometry.
    #[arg(long, value_enum, default_value_t = IndenterGeometry::Paraboloid)]
    pub geometry: IndenterGeometry,

    /// Tip radius (m) or half-opening angle (degrees), depending on geometry.
    #[arg(long, default_value_t = 5e-6)]
    pub tip: f64,

    /// Sample Poisson ratio.
    #[arg(long, default_value_t = 0.5)]
    pub poisson: f64,

    /// Upper indentation limit (m) of the Hertz fit.
    #[arg(long)]
    pub max_indentation: Option<f64>,

    /// Initial Young's modulus (Pa).
    #[arg(long, default_value_t = 1000.0)]
    pub e0: f64,

    /// Initial contact offset of the Hertz fit (m).
    #[arg(long, default_value_t = 0.0)]
    pub d0: f64,

    /// Initial Ting fluidity exponent.
    #[arg(long, default_value_t = 0.2)]
    pub beta: f64,

    /// Initial Ting force offset (N).
    #[arg(long, default_value_t = 0.0)]
    pub f0: f64,

    /// Ting relaxation reference time (s).
    #[arg(long, default_value_t = 1.0)]
    pub t0: f64,

    /// Optimizer iteration budget per fit.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Process every input file instead of only the first.
    #[arg(long)]
    pub all_files: bool,
}

/// Output options shared by `fit` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Write all results (parameters, curves, residuals) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Write one row per curve to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_csv: Option<PathBuf>,

    /// Rows of the per-curve table printed for each file (0 disables it).
    #[arg(long, default_value_t = 20)]
    pub table: usize,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Force-map JSON files.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Scan lines of the generated map.
    #[arg(long, default_value_t = 4)]
    pub cols: usize,

    /// Points per scan line.
    #[arg(long, default_value_t = 4)]
    pub rows: usize,

    /// Scan order of the generated map.
    #[arg(long, value_enum, default_value_t = ScanOrder::Serpentine)]
    pub order: ScanOrder,

    /// Samples per extend/retract segment.
    #[arg(long, default_value_t = 300)]
    pub samples: usize,

    /// Deflection noise (V).
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Drag force added to the generated curves (N).
    #[arg(long, default_value_t = 0.0)]
    pub drag_force: f64,

    /// Random seed.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Also write the generated map as force-map JSON.
    #[arg(long, value_name = "JSON")]
    pub save_map: Option<PathBuf>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Results JSON written by `afm fit --export-json`.
    #[arg(value_name = "JSON")]
    pub results: PathBuf,

    /// Only show this file.
    #[arg(long)]
    pub file: Option<String>,

    /// Rows of the per-curve table (0 disables it).
    #[arg(long, default_value_t = 20)]
    pub table: usize,
}
