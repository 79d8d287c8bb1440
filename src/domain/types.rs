//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during preprocessing and fitting
//! - read from / written to force-map JSON files
//! - exported together with fit results

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AppError};

/// Role of a segment within one force-distance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Approach ramp: the tip moves towards (and into) the sample.
    Extend,
    /// Withdrawal ramp.
    Retract,
    /// Dwell at constant height (ignored by the fit pipelines).
    Pause,
}

impl SegmentKind {
    pub fn display_name(self) -> &'static str {
        match self {
            SegmentKind::Extend => "extend",
            SegmentKind::Retract => "retract",
            SegmentKind::Pause => "pause",
        }
    }
}

/// One monotonic ramp of a force curve.
///
/// Heights are stored per channel name (e.g. `"height"`, `"measured_height"`)
/// since instruments usually record more than one; the analysis picks one via
/// `AnalysisParameters::height_channel`. Deflection is the raw sensor signal (V).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub time: Vec<f64>,
    pub heights: BTreeMap<String, Vec<f64>>,
    pub deflection: Vec<f64>,
}

impl Segment {
    /// Build a validated segment.
    pub fn new(
        time: Vec<f64>,
        heights: BTreeMap<String, Vec<f64>>,
        deflection: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let segment = Self {
            time,
            heights,
            deflection,
        };
        segment.validate()?;
        Ok(segment)
    }

    /// Convenience constructor for a single height channel.
    pub fn with_channel(
        channel: &str,
        time: Vec<f64>,
        height: Vec<f64>,
        deflection: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let mut heights = BTreeMap::new();
        heights.insert(channel.to_string(), height);
        Self::new(time, heights, deflection)
    }

    /// Check the equal-length and monotonic-time invariants.
    ///
    /// Deserialized segments bypass `new`, so readers call this explicitly.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let n = self.deflection.len();
        if self.time.len() != n {
            return Err(AnalysisError::MalformedCurve(format!(
                "time has {} samples but deflection has {n}",
                self.time.len()
            )));
        }
        if self.heights.is_empty() {
            return Err(AnalysisError::MalformedCurve("segment has no height channel".into()));
        }
        for (name, h) in &self.heights {
            if h.len() != n {
                return Err(AnalysisError::MalformedCurve(format!(
                    "height channel '{name}' has {} samples but deflection has {n}",
                    h.len()
                )));
            }
        }
        if self.time.windows(2).any(|w| !(w[1] >= w[0])) {
            return Err(AnalysisError::MalformedCurve(
                "segment time is not monotonically non-decreasing".into(),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.deflection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deflection.is_empty()
    }

    /// Height samples for the requested channel.
    pub fn height(&self, channel: &str) -> Result<&[f64], AnalysisError> {
        self.heights.get(channel).map(Vec::as_slice).ok_or_else(|| {
            let known: Vec<&str> = self.heights.keys().map(String::as_str).collect();
            AnalysisError::MalformedCurve(format!(
                "height channel '{channel}' not found (available: {})",
                known.join(", ")
            ))
        })
    }

    /// Deflection converted to meters with the given sensitivity (m/V).
    pub fn deflection_m(&self, sensitivity: f64) -> Vec<f64> {
        self.deflection.iter().map(|v| v * sensitivity).collect()
    }
}

/// One measured force-distance cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub index: usize,
    /// Segments ordered by acquisition time (extend before retract).
    pub segments: Vec<(SegmentKind, Segment)>,
}

impl Curve {
    pub fn first_extend(&self) -> Result<&Segment, AnalysisError> {
        self.segments
            .iter()
            .find(|(kind, _)| *kind == SegmentKind::Extend)
            .map(|(_, s)| s)
            .ok_or_else(|| {
                AnalysisError::MalformedCurve(format!("curve {} has no extend segment", self.index))
            })
    }

    pub fn last_retract(&self) -> Result<&Segment, AnalysisError> {
        self.segments
            .iter()
            .rev()
            .find(|(kind, _)| *kind == SegmentKind::Retract)
            .map(|(_, s)| s)
            .ok_or_else(|| {
                let msg = format!("curve {} has no retract segment", self.index);
                AnalysisError::MalformedCurve(msg)
            })
    }
}

/// Indenter shape used by the contact models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndenterGeometry {
    /// Spherical / parabolic tip; tip parameter is the radius (m).
    Paraboloid,
    /// Conical tip; tip parameter is the half-opening angle (degrees).
    Cone,
    /// Four-sided pyramid; tip parameter is the half-opening angle (degrees).
    Pyramid,
    /// Flat-ended cylindrical punch; tip parameter is the radius (m).
    Cylinder,
}

impl IndenterGeometry {
    /// Power-law exponent `n` in `F ∝ δ^n`.
    pub fn exponent(self) -> f64 {
        match self {
            IndenterGeometry::Paraboloid => 1.5,
            IndenterGeometry::Cone | IndenterGeometry::Pyramid => 2.0,
            IndenterGeometry::Cylinder => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indenter {
    pub geometry: IndenterGeometry,
    pub tip_parameter: f64,
    pub poisson_ratio: f64,
}

impl Indenter {
    /// Geometric prefactor `C` such that `F = C · E · δ^n`.
    pub fn coefficient(&self) -> f64 {
        let nu = 1.0 - self.poisson_ratio * self.poisson_ratio;
        match self.geometry {
            IndenterGeometry::Paraboloid => 4.0 * self.tip_parameter.sqrt() / (3.0 * nu),
            IndenterGeometry::Cone => {
                2.0 * self.tip_parameter.to_radians().tan() / (std::f64::consts::PI * nu)
            }
            IndenterGeometry::Pyramid => 0.7453 * self.tip_parameter.to_radians().tan() / nu,
            IndenterGeometry::Cylinder => 2.0 * self.tip_parameter / nu,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.geometry.exponent()
    }
}

impl Default for Indenter {
    fn default() -> Self {
        Self {
            geometry: IndenterGeometry::Paraboloid,
            tip_parameter: 5e-6,
            poisson_ratio: 0.5,
        }
    }
}

/// Which contact model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Hertz,
    Ting,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Hertz => "Hertz",
            ModelKind::Ting => "Ting",
        }
    }

    /// Number of fitted parameters (for the reduced chi-square).
    pub fn param_count(self) -> usize {
        match self {
            ModelKind::Hertz => 2,
            ModelKind::Ting => 4,
        }
    }
}

/// Viscous drag correction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragCorrection {
    pub poly_order: usize,
    /// Ramp speed (m/s).
    pub ramp_speed: f64,
}

/// Cantilever calibration and height channel, each optional.
///
/// Files carry the values recorded at acquisition; a session-wide value set
/// by the user takes precedence over them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Spring constant (N/m).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring_constant: Option<f64>,
    /// Deflection sensitivity (m/V).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deflection_sensitivity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_channel: Option<String>,
}

impl Calibration {
    pub fn is_empty(&self) -> bool {
        self.spring_constant.is_none()
            && self.deflection_sensitivity.is_none()
            && self.height_channel.is_none()
    }

    /// Reject values that are present but unusable.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if let Some(k) = self.spring_constant {
            if !(k.is_finite() && k > 0.0) {
                return Err(AnalysisError::MalformedCurve(format!(
                    "spring constant {k} must be finite and > 0"
                )));
            }
        }
        if let Some(s) = self.deflection_sensitivity {
            if !(s.is_finite() && s > 0.0) {
                return Err(AnalysisError::MalformedCurve(format!(
                    "deflection sensitivity {s} must be finite and > 0"
                )));
            }
        }
        if self.height_channel.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(AnalysisError::MalformedCurve("height channel name is empty".into()));
        }
        Ok(())
    }
}

/// Configuration of one analysis run.
///
/// Built once by the caller (CLI flags, tests) and only ever read by the
/// pipeline. `height_channel`, `deflection_sensitivity` and `spring_constant`
/// are fallbacks; see `for_file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Session-wide calibration applied to every file.
    #[serde(default, skip_serializing_if = "Calibration::is_empty")]
    pub calibration_override: Calibration,
    pub height_channel: String,
    /// Deflection sensitivity (m/V).
    pub deflection_sensitivity: f64,
    /// Cantilever spring constant (N/m).
    pub spring_constant: f64,
    /// RoV window size (samples).
    pub poc_window: usize,
    /// Segment used by the Hertz pipeline.
    pub curve_segment: SegmentKind,
    pub viscous_drag: Option<DragCorrection>,
    /// Samples with indentation below `-contact_offset` are left out of the fit (m).
    pub contact_offset: f64,
    /// Moving-average window applied to indentation in the Ting model (samples).
    pub smoothing_window: usize,
    pub compute_all_files: bool,

    pub indenter: Indenter,
    /// Upper indentation bound for the Hertz fit domain (m).
    pub max_indentation: Option<f64>,
    pub hertz_init_e0: f64,
    pub hertz_init_d0: f64,
    pub ting_init_beta: f64,
    pub ting_init_f0: f64,
    /// Reference time of the power-law relaxation modulus (s).
    pub ting_t0: f64,
    /// Levenberg–Marquardt iteration budget.
    pub max_iterations: usize,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            calibration_override: Calibration::default(),
            height_channel: "height".to_string(),
            deflection_sensitivity: 20e-9,
            spring_constant: 0.05,
            poc_window: 50,
            curve_segment: SegmentKind::Extend,
            viscous_drag: None,
            contact_offset: 1e-6,
            smoothing_window: 5,
            compute_all_files: false,
            indenter: Indenter::default(),
            max_indentation: None,
            hertz_init_e0: 1000.0,
            hertz_init_d0: 0.0,
            ting_init_beta: 0.2,
            ting_init_f0: 0.0,
            ting_t0: 1.0,
            max_iterations: 200,
        }
    }
}

impl AnalysisParameters {
    /// Reject settings no curve could be analyzed with.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.deflection_sensitivity.is_finite() && self.deflection_sensitivity > 0.0) {
            return Err(AppError::new(2, "Deflection sensitivity must be finite and > 0."));
        }
        if !(self.spring_constant.is_finite() && self.spring_constant > 0.0) {
            return Err(AppError::new(2, "Spring constant must be finite and > 0."));
        }
        if self.poc_window == 0 {
            return Err(AppError::new(2, "PoC window must be >= 1."));
        }
        if self.curve_segment == SegmentKind::Pause {
            return Err(AppError::new(2, "Curve segment must be extend or retract."));
        }
        if !(self.contact_offset.is_finite() && self.contact_offset >= 0.0) {
            return Err(AppError::new(2, "Contact offset must be finite and >= 0."));
        }
        if !(self.indenter.tip_parameter.is_finite() && self.indenter.tip_parameter > 0.0) {
            return Err(AppError::new(2, "Tip parameter must be finite and > 0."));
        }
        if !(0.0..=0.5).contains(&self.indenter.poisson_ratio) {
            return Err(AppError::new(2, "Poisson ratio must lie in [0, 0.5]."));
        }
        if !(self.ting_init_beta > 0.0 && self.ting_init_beta < 1.0) {
            return Err(AppError::new(2, "Initial fluidity exponent must lie in (0, 1)."));
        }
        if !(self.ting_t0.is_finite() && self.ting_t0 > 0.0) {
            return Err(AppError::new(2, "Ting reference time t0 must be finite and > 0."));
        }
        if let Some(drag) = &self.viscous_drag {
            if !(drag.ramp_speed.is_finite() && drag.ramp_speed >= 0.0) {
                return Err(AppError::new(2, "Ramp speed must be finite and >= 0."));
            }
        }
        if self.max_iterations == 0 {
            return Err(AppError::new(2, "Iteration budget must be >= 1."));
        }
        self.calibration_override
            .validate()
            .map_err(|e| AppError::new(2, format!("Invalid calibration: {e}")))?;
        Ok(())
    }

    /// Parameters for one file.
    ///
    /// Each calibration value comes from the session override when set, else
    /// from the file, else from the fallback held here.
    pub fn for_file(&self, file: &Calibration) -> AnalysisParameters {
        let session = &self.calibration_override;
        AnalysisParameters {
            calibration_override: Calibration::default(),
            height_channel: session
                .height_channel
                .as_ref()
                .or(file.height_channel.as_ref())
                .unwrap_or(&self.height_channel)
                .clone(),
            deflection_sensitivity: session
                .deflection_sensitivity
                .or(file.deflection_sensitivity)
                .unwrap_or(self.deflection_sensitivity),
            spring_constant: session
                .spring_constant
                .or(file.spring_constant)
                .unwrap_or(self.spring_constant),
            ..self.clone()
        }
    }

    /// The calibration every file would get if it recorded none.
    pub fn session_calibration(&self) -> AnalysisParameters {
        self.for_file(&Calibration::default())
    }
}

/// Point of contact located on a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOfContact {
    pub index: usize,
    pub height: f64,
    pub deflection: f64,
}

/// Fitted Hertz parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HertzParams {
    /// Elastic modulus (Pa).
    pub e0: f64,
    /// Contact point offset relative to the PoC (m).
    pub delta0: f64,
}

/// Fitted Ting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TingParams {
    /// Apparent modulus at `t0` (Pa).
    pub e0: f64,
    /// Contact time (s, relative to the first fitted sample).
    pub tc: f64,
    /// Power-law fluidity exponent.
    pub beta_e: f64,
    /// Baseline force (N).
    pub f0: f64,
}

/// Model-specific fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ModelParams {
    Hertz(HertzParams),
    Ting {
        ting: TingParams,
        /// Indentation at the sample nearest `tc` (m).
        ting_d0: f64,
        hertz: HertzParams,
        hertz_redchi: f64,
    },
}

impl ModelParams {
    /// Elastic (or apparent) modulus of the fitted model.
    pub fn e0(&self) -> f64 {
        match self {
            ModelParams::Hertz(p) => p.e0,
            ModelParams::Ting { ting, .. } => ting.e0,
        }
    }

    /// Contact point used for plotting the fitted curve.
    pub fn contact_point(&self) -> f64 {
        match self {
            ModelParams::Hertz(p) => p.delta0,
            ModelParams::Ting { ting_d0, .. } => *ting_d0,
        }
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub redchi: f64,
    pub n: usize,
    pub nfree: usize,
    pub iterations: usize,
}

impl FitQuality {
    pub fn new(sse: f64, n: usize, n_params: usize, iterations: usize) -> Self {
        let nfree = n.saturating_sub(n_params).max(1);
        Self {
            sse,
            redchi: sse / nfree as f64,
            n,
            nfree,
            iterations,
        }
    }
}

/// Output of one successful curve fit.
///
/// `indentation`, `best_fit` and `residuals` are aligned sample-by-sample
/// with the fit domain (not with the raw segment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub params: ModelParams,
    pub quality: FitQuality,
    pub poc: PointOfContact,
    pub indentation: Vec<f64>,
    pub best_fit: Vec<f64>,
    pub residuals: Vec<f64>,
}

/// Result slot of one curve: a fit, or the reason there is none.
pub type CurveOutcome = Result<FitResult, AnalysisError>;
