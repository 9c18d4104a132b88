//! Math utility functions

/// Softmax function
///
/// Entries of `-inf` get probability zero as long as one entry is finite.
pub fn softmax(x: &[f32]) -> Vec<f32> {
    let max_val = x.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max_val.is_finite() {
        return vec![0.0; x.len()];
    }
    let exp_vals: Vec<f32> = x.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|v| v / sum).collect()
}

/// Argmax - index and value of the maximum; the first index wins ties
pub fn argmax(x: &[f32]) -> Option<(usize, f32)> {
    x.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &val)| match best {
            Some((_, best_val)) if val <= best_val => best,
            _ if val.is_nan() => best,
            _ => Some((idx, val)),
        })
}

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation with an n-1 denominator; `None` below two values
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Mean squared difference between two equally long vectors
pub fn mean_squared_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        / a.len() as f32
}
