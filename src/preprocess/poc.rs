//! Point-of-contact estimation by the Rate-of-Variance (RoV) method.
//!
//! For every candidate index `i` with a full window on both sides
//! (`i - w >= 0` and `i + w < n`) the score is
//!
//! ```text
//! RoV(i) = var(d[i .. i+w]) / var(d[i-w .. i])
//! ```
//!
//! i.e. post-contact over pre-contact deflection variance. The contact point is
//! the first index with the largest score.
//!
//! Degenerate windows: a zero pre-variance scores `+inf` when the post-window
//! varies and `0` when both windows are flat; windows touching a non-finite
//! sample score `0`.

use crate::domain::PointOfContact;
use crate::error::AnalysisError;
use crate::math::{argmax, variance};

/// RoV score for every valid candidate, paired with its sample index.
pub fn rov_scores(deflection: &[f64], window: usize) -> Result<Vec<(usize, f64)>, AnalysisError> {
    let n = deflection.len();
    if window == 0 {
        return Err(AnalysisError::InsufficientData("PoC window must be >= 1".into()));
    }
    if n <= 2 * window {
        return Err(AnalysisError::InsufficientData(format!(
            "RoV needs more than {} samples for window {window}, got {n}",
            2 * window
        )));
    }

    Ok((window..n - window)
        .map(|i| {
            let pre = &deflection[i - window..i];
            let post = &deflection[i..i + window];
            (i, rov_ratio(pre, post))
        })
        .collect())
}

fn rov_ratio(pre: &[f64], post: &[f64]) -> f64 {
    if pre.iter().chain(post).any(|v| !v.is_finite()) {
        return 0.0;
    }
    let (Some(var_pre), Some(var_post)) = (variance(pre), variance(post)) else {
        return 0.0;
    };
    if var_pre > 0.0 {
        var_post / var_pre
    } else if var_post > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Estimate the contact point of one segment.
pub fn estimate_poc(
    height: &[f64],
    deflection: &[f64],
    window: usize,
) -> Result<PointOfContact, AnalysisError> {
    if height.len() != deflection.len() {
        return Err(AnalysisError::InsufficientData(format!(
            "height has {} samples but deflection has {}",
            height.len(),
            deflection.len()
        )));
    }
    let scores = rov_scores(deflection, window)?;
    let values: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
    let best = argmax(&values)
        .ok_or_else(|| AnalysisError::InsufficientData("no valid RoV candidate".into()))?;
    let index = scores[best].0;

    Ok(PointOfContact {
        index,
        height: height[index],
        deflection: deflection[index],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    /// Flat noisy baseline followed by a linear contact ramp starting at `contact`.
    fn synthetic(n: usize, contact: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1e-3).unwrap();
        let height: Vec<f64> = (0..n).map(|i| i as f64 * 1e-9).collect();
        let deflection: Vec<f64> = (0..n)
            .map(|i| {
                let ramp = if i >= contact { (i - contact) as f64 * 0.05 } else { 0.0 };
                ramp + noise.sample(&mut rng)
            })
            .collect();
        (height, deflection)
    }

    #[test]
    fn finds_contact_of_a_ramp() {
        let (z, d) = synthetic(400, 250, 7);
        let poc = estimate_poc(&z, &d, 20).unwrap();
        assert!(
            (poc.index as i64 - 250).abs() <= 5,
            "estimated contact at {}",
            poc.index
        );
        assert_eq!(poc.height, z[poc.index]);
        assert_eq!(poc.deflection, d[poc.index]);
    }

    #[test]
    fn is_deterministic() {
        let (z, d) = synthetic(300, 120, 11);
        let a = estimate_poc(&z, &d, 15).unwrap();
        let b = estimate_poc(&z, &d, 15).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fails_when_window_does_not_fit() {
        let (z, d) = synthetic(40, 20, 3);
        let err = estimate_poc(&z, &d, 20).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
        // One more sample makes exactly one candidate valid.
        let (z, d) = synthetic(41, 20, 3);
        let poc = estimate_poc(&z, &d, 20).unwrap();
        assert_eq!(poc.index, 20);
    }

    #[test]
    fn candidate_range_respects_both_windows() {
        let d: Vec<f64> = (0..10).map(|i| (i * i) as f64).collect();
        let scores = rov_scores(&d, 3).unwrap();
        assert_eq!(scores.first().map(|s| s.0), Some(3));
        assert_eq!(scores.last().map(|s| s.0), Some(6));
    }

    #[test]
    fn flat_pre_window_scores_infinite() {
        let mut d = vec![0.0; 10];
        d[6] = 1.0;
        let scores = rov_scores(&d, 3).unwrap();
        let at5 = scores.iter().find(|(i, _)| *i == 5).unwrap().1;
        assert!(at5.is_infinite());
        let at3 = scores.iter().find(|(i, _)| *i == 3).unwrap().1;
        assert_eq!(at3, 0.0);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(rov_scores(&[0.0, 1.0, 2.0], 0).is_err());
    }
}
