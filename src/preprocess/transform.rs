//! Raw height/deflection to force and indentation.

use crate::error::AnalysisError;

/// Force (N) and indentation (m) relative to a point of contact.
///
/// `poc_deflection` is in metres, i.e. already scaled by `sensitivity`.
pub fn force_indentation(
    height: &[f64],
    deflection_raw: &[f64],
    sensitivity: f64,
    spring_constant: f64,
    poc_height: f64,
    poc_deflection: f64,
) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
    if height.len() != deflection_raw.len() {
        return Err(AnalysisError::MalformedCurve(format!(
            "height has {} samples but deflection has {}",
            height.len(),
            deflection_raw.len()
        )));
    }

    let (force, indentation) = height
        .iter()
        .zip(deflection_raw)
        .map(|(&z, &raw)| {
            let d = raw * sensitivity;
            (d * spring_constant, (z - poc_height) - (d - poc_deflection))
        })
        .unzip();
    Ok((force, indentation))
}

/// Shift a force signal so that its first sample is zero.
pub fn rebaseline(force: &mut [f64]) {
    if let Some(&first) = force.first() {
        rebaseline_by(force, first);
    }
}

/// Subtract a fixed offset from every sample.
pub fn rebaseline_by(force: &mut [f64], offset: f64) {
    for f in force.iter_mut() {
        *f -= offset;
    }
}
