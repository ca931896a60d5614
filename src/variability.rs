use log::debug;

/// Trailing rolling sample standard deviation (ddof = 1).
///
/// One value per sample; the first `window - 1` positions are `None`, as is
/// everything when the trace is shorter than the window or the window is
/// below two samples.
pub fn rolling_std(data: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if window < 2 || data.len() < window {
        return result;
    }

    // Shift by the first sample to keep the running sums small
    let offset = data[0];
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let n = window as f64;

    for i in 0..data.len() {
        let x = data[i] - offset;
        sum += x;
        sum_sq += x * x;

        if i >= window {
            let old = data[i - window] - offset;
            sum -= old;
            sum_sq -= old * old;
        }

        if i + 1 >= window {
            let variance = ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0);
            result[i] = Some(variance.sqrt());
        }
    }

    debug!(
        "Rolling std over {} samples, {} defined values",
        window,
        data.len() + 1 - window
    );

    result
}
