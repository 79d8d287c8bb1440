//! Synthetic force maps for demos and tests.
//!
//! Each pixel is an elastic sample probed by the configured indenter. For a
//! piezo height `z` past the contact height `zc` the cantilever deflection
//! `d` balances the Hertz force:
//!
//! ```text
//! k · d = C · E0 · (z − zc − d)^n
//! ```
//!
//! which is solved per sample by bisection. Extend and retract trace the same
//! elastic path; an optional drag force offsets extend upwards and retract
//! downwards. Gaussian noise is added to the raw deflection (V).
//!
//! The calibration used for generation is recorded in the file.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    AnalysisParameters, Calibration, Curve, Indenter, ScanGrid, ScanOrder, Segment, SegmentKind,
};
use crate::error::AppError;
use crate::io::ForceMapFile;

/// Shape of a generated force map.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub file_id: String,
    pub cols: usize,
    pub rows: usize,
    pub order: ScanOrder,
    pub samples_per_segment: usize,
    /// Piezo travel of each ramp (m).
    pub ramp_size: f64,
    /// Duration of each ramp (s).
    pub ramp_duration: f64,
    /// Contact height as a fraction of the ramp.
    pub contact_fraction: f64,
    /// Per-pixel moduli are drawn uniformly from this range (Pa).
    pub modulus_range: (f64, f64),
    /// Standard deviation of the deflection noise (V).
    pub noise: f64,
    /// Drag force added to extend and removed from retract (N).
    pub drag_force: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            file_id: "synthetic".to_string(),
            cols: 4,
            rows: 4,
            order: ScanOrder::Serpentine,
            samples_per_segment: 300,
            ramp_size: 3e-6,
            ramp_duration: 1.0,
            contact_fraction: 0.5,
            modulus_range: (800.0, 2500.0),
            noise: 0.01,
            drag_force: 0.0,
            seed: 7,
        }
    }
}

/// A generated map together with the values it was generated from.
#[derive(Debug, Clone)]
pub struct SyntheticForceMap {
    pub file: ForceMapFile,
    /// True modulus per curve index (Pa).
    pub moduli: Vec<f64>,
}

pub fn generate_force_map(
    config: &SyntheticConfig,
    params: &AnalysisParameters,
) -> Result<SyntheticForceMap, AppError> {
    if config.cols == 0 || config.rows == 0 {
        return Err(AppError::new(2, "Synthetic map must have at least one pixel."));
    }
    if config.samples_per_segment < 2 {
        return Err(AppError::new(2, "Synthetic segments need at least 2 samples."));
    }
    if !(config.ramp_size > 0.0 && config.ramp_duration > 0.0) {
        return Err(AppError::new(2, "Ramp size and duration must be > 0."));
    }
    if !(0.0..1.0).contains(&config.contact_fraction) {
        return Err(AppError::new(2, "Contact fraction must be in [0, 1)."));
    }
    let (e_lo, e_hi) = config.modulus_range;
    if !(e_lo > 0.0 && e_hi >= e_lo) {
        return Err(AppError::new(2, "Invalid modulus range for synthetic data."));
    }

    let params = params.session_calibration();
    let mut rng = StdRng::seed_from_u64(map_seed(config));
    let noise = Normal::new(0.0, config.noise.max(0.0))
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let grid = ScanGrid::new(config.cols, config.rows, config.order);
    let n = config.samples_per_segment;
    let dt = config.ramp_duration / (n - 1) as f64;
    let dz = config.ramp_size / (n - 1) as f64;

    let mut curves = Vec::with_capacity(grid.len());
    let mut moduli = Vec::with_capacity(grid.len());

    for index in 0..grid.len() {
        let e0 = if e_hi > e_lo { rng.gen_range(e_lo..=e_hi) } else { e_lo };
        let jitter = rng.gen_range(-0.05..=0.05) * config.ramp_size;
        let zc = (config.contact_fraction * config.ramp_size + jitter).max(0.0);

        let mut segment = |kind: SegmentKind| -> Result<Segment, AppError> {
            let (t_offset, drag) = match kind {
                SegmentKind::Retract => (config.ramp_duration + dt, -config.drag_force),
                _ => (0.0, config.drag_force),
            };
            let mut time = Vec::with_capacity(n);
            let mut height = Vec::with_capacity(n);
            let mut deflection = Vec::with_capacity(n);
            for i in 0..n {
                let step = match kind {
                    SegmentKind::Retract => n - 1 - i,
                    _ => i,
                };
                let z = step as f64 * dz;
                let d = elastic_deflection(&params.indenter, params.spring_constant, e0, z - zc)
                    + drag / params.spring_constant;
                time.push(t_offset + i as f64 * dt);
                height.push(z);
                deflection.push(d / params.deflection_sensitivity + noise.sample(&mut rng));
            }
            Segment::with_channel(&params.height_channel, time, height, deflection)
                .map_err(|e| AppError::new(4, format!("Synthetic curve {index}: {e}")))
        };

        let extend = segment(SegmentKind::Extend)?;
        let retract = segment(SegmentKind::Retract)?;
        curves.push(Curve {
            index,
            segments: vec![(SegmentKind::Extend, extend), (SegmentKind::Retract, retract)],
        });
        moduli.push(e0);
    }

    Ok(SyntheticForceMap {
        file: ForceMapFile {
            file_id: config.file_id.clone(),
            grid: Some(grid),
            calibration: Calibration {
                spring_constant: Some(params.spring_constant),
                deflection_sensitivity: Some(params.deflection_sensitivity),
                height_channel: Some(params.height_channel.clone()),
            },
            curves,
        },
        moduli,
    })
}

/// Cantilever deflection (m) at piezo travel `travel` past contact.
fn elastic_deflection(indenter: &Indenter, spring_constant: f64, e0: f64, travel: f64) -> f64 {
    if travel <= 0.0 {
        return 0.0;
    }
    let c = indenter.coefficient() * e0;
    let n = indenter.exponent();
    // g(d) = k·d − C·E0·(travel − d)^n is increasing on [0, travel].
    let (mut lo, mut hi) = (0.0, travel);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        let g = spring_constant * mid - c * (travel - mid).powf(n);
        if g > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

fn map_seed(config: &SyntheticConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.file_id.hash(&mut hasher);
    config.seed.hash(&mut hasher);
    hasher.finish()
}
