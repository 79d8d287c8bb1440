//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - loads or generates force maps
//! - runs the batch fit
//! - prints reports and writes optional exports

use clap::Parser;
use log::{info, warn};

use crate::cli::{AnalysisArgs, Command, DemoArgs, FitArgs, OutputArgs, ShowArgs};
use crate::data::{SyntheticConfig, generate_force_map};
use crate::domain::{AnalysisParameters, Calibration, DragCorrection, Indenter};
use crate::error::AppError;
use crate::io::{
    ResultsExport, read_force_map, read_results_json, write_force_map, write_results_csv,
    write_results_json,
};
use crate::report::{format_curve_table, format_run_summary};

pub mod pipeline;

/// Entry point for the `afm` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
        Command::Show(args) => handle_show(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let params = params_from_args(&args.analysis)?;
    let maps = args
        .files
        .iter()
        .map(|path| read_force_map(path))
        .collect::<Result<Vec<_>, _>>()?;
    info!("loaded {} force map(s)", maps.len());

    let run = pipeline::run_batch(&maps, &params, args.analysis.model)?;
    finish(&run.export, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let params = params_from_args(&args.analysis)?;
    let config = SyntheticConfig {
        cols: args.cols,
        rows: args.rows,
        order: args.order,
        samples_per_segment: args.samples,
        noise: args.noise,
        drag_force: args.drag_force,
        seed: args.seed,
        ..SyntheticConfig::default()
    };
    let generated = generate_force_map(&config, &params)?;
    if let Some(path) = &args.save_map {
        write_force_map(path, &generated.file)?;
        info!("wrote force map to {}", path.display());
    }

    let maps = std::slice::from_ref(&generated.file);
    let run = pipeline::run_batch(maps, &params, args.analysis.model)?;
    finish(&run.export, &args.output)?;

    // Generated moduli next to the fitted ones.
    let results = run.export.results.file(&generated.file.file_id);
    let mut errors = Vec::new();
    for (idx, truth) in generated.moduli.iter().enumerate() {
        if let Some(Ok(fit)) = results.and_then(|r| r.get(&idx)) {
            errors.push((fit.params.e0() - truth).abs() / truth);
        }
    }
    if let Some(mean) = crate::math::mean(&errors) {
        println!("Mean relative E0 error vs generated moduli: {:.2}%", mean * 100.0);
    }
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let mut export = read_results_json(&args.results)?;
    if let Some(file_id) = &args.file {
        let Some(results) = export.results.file(file_id).cloned() else {
            return Err(AppError::new(2, format!("File '{file_id}' not found in results.")));
        };
        export.results.clear();
        export.results.replace_file(file_id, results);
    }
    print_report(&export, args.table);
    Ok(())
}

fn finish(export: &ResultsExport, output: &OutputArgs) -> Result<(), AppError> {
    print_report(export, output.table);

    if let Some(path) = &output.export_json {
        write_results_json(path, export)?;
        info!("wrote results JSON to {}", path.display());
    }
    if let Some(path) = &output.export_csv {
        write_results_csv(path, &export.results, &export.grids)?;
        info!("wrote results CSV to {}", path.display());
    }

    if let Some(summary) = &export.summary {
        if summary.succeeded == 0 {
            return Err(AppError::new(4, format!("All {} curves failed to fit.", summary.failed)));
        }
        if summary.failed > 0 {
            warn!("{} of {} curves failed", summary.failed, summary.curves);
        }
    }
    Ok(())
}

fn print_report(export: &ResultsExport, table: usize) {
    println!("{}", format_run_summary(export));
    if table == 0 {
        return;
    }
    for file_id in export.results.file_ids() {
        println!("{file_id}:");
        println!(
            "{}",
            format_curve_table(&export.results, file_id, export.grids.get(file_id), table)
        );
    }
}

/// Build validated analysis parameters from CLI flags.
///
/// Calibration flags become session overrides; the deflection sensitivity is
/// given in nm/V on the command line.
pub fn params_from_args(args: &AnalysisArgs) -> Result<AnalysisParameters, AppError> {
    let defaults = AnalysisParameters::default();
    let params = AnalysisParameters {
        calibration_override: Calibration {
            spring_constant: args.spring_constant,
            deflection_sensitivity: args.sensitivity.map(|s| s * 1e-9),
            height_channel: args.height_channel.clone(),
        },
        height_channel: defaults.height_channel,
        deflection_sensitivity: defaults.deflection_sensitivity,
        spring_constant: defaults.spring_constant,
        poc_window: args.poc_window,
        curve_segment: args.segment,
        viscous_drag: args.drag_order.map(|poly_order| DragCorrection {
            poly_order,
            ramp_speed: args.ramp_speed,
        }),
        contact_offset: args.contact_offset,
        smoothing_window: args.smoothing_window,
        compute_all_files: args.all_files,
        indenter: Indenter {
            geometry: args.geometry,
            tip_parameter: args.tip,
            poisson_ratio: args.poisson,
        },
        max_indentation: args.max_indentation,
        hertz_init_e0: args.e0,
        hertz_init_d0: args.d0,
        ting_init_beta: args.beta,
        ting_init_f0: args.f0,
        ting_t0: args.t0,
        max_iterations: args.max_iterations,
    };
    params.validate()?;
    Ok(params)
}
