/// Scales `values` to unit L2 norm in place. Vectors with a negligible norm are left as zeros.
pub(crate) fn normalize_vector(values: &mut [f64]) {
    let norm: f64 = values.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        values.iter_mut().for_each(|x| *x /= norm);
    } else {
        values.iter_mut().for_each(|x| *x = 0.0);
    }
}

/// Mean and sample standard deviation (n - 1 denominator). The deviation of fewer than two
/// values is reported as 0.
pub(crate) fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
