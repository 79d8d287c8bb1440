//! Small numeric helpers over slices.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`); `None` for an empty slice.
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64)
}

/// Index of the largest value; the first one wins on ties. NaNs are skipped.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the value closest to `target`; the first one wins on ties.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        let d = (v - target).abs();
        if d.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if d >= b => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

/// Centered moving average with a window of `window` samples.
///
/// The window shrinks at the edges so the output has the input's length.
/// Windows of 0 or 1 return the input unchanged.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let half_lo = (window - 1) / 2;
    let half_hi = window / 2;

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half_lo);
            let hi = (i + half_hi + 1).min(values.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Median of the strictly positive consecutive differences.
pub fn median_step(values: &[f64]) -> Option<f64> {
    let mut steps: Vec<f64> = values
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    median_mut(&mut steps)
}

pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Linear interpolation of `y(x)` on an ascending abscissa, clamped at the ends.
pub fn interpolate(x: &[f64], y: &[f64], at: f64) -> Option<f64> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }
    if at <= x[0] {
        return Some(y[0]);
    }
    let last = x.len() - 1;
    if at >= x[last] {
        return Some(y[last]);
    }
    let hi = x.partition_point(|v| *v <= at);
    let lo = hi - 1;
    let span = x[hi] - x[lo];
    if span <= 0.0 {
        return Some(y[hi]);
    }
    let u = (at - x[lo]) / span;
    Some(y[lo] + u * (y[hi] - y[lo]))
}
