//! Numerically stable primitives for log-domain likelihood math.

/// Log of the rising factorial: sum of ln(x + i) for i in 0..n.
///
/// Summed term by term so that small trial counts stay exact to rounding.
/// Returns NaN if any term has a non-positive argument, and 0 for n = 0.
pub fn log_rising_factorial(x: f64, n: usize) -> f64 {
    let mut acc = 0.0;
    for i in 0..n {
        let arg = x + i as f64;
        if arg.is_nan() || arg <= 0.0 {
            return f64::NAN;
        }
        acc += arg.ln();
    }
    acc
}
