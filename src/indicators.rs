//! Rolling indicator math over normalized daily series.
//!
//! Every function maps an input slice to an output vector of the same
//! length, with `NaN` standing in for values whose window is not yet fully
//! populated. Inputs are expected to be gap-free daily closes (or
//! high/low/close triples) straight out of the normalizer, so the functions
//! do not themselves handle missing data.

use std::collections::VecDeque;

/// Mean-deviation scaling constant used by the Commodity Channel Index.
pub const CCI_CONSTANT: f64 = 0.015;

/// Day-over-day percentage change of `values`.
///
/// `out[i] = (values[i] - values[i-1]) / values[i-1] * 100`, NaN at index 0.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = (values[i] - values[i - 1]) / values[i - 1] * 100.0;
    }
    out
}

/// Simple moving average over a rolling window of `period` values.
///
/// First defined value at index `period - 1`. The window is carried as an
/// incremental sum, not recomputed per step.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "SMA period must be >= 1");
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;

    for i in period..n {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Relative Strength Index with Wilder smoothing.
///
/// Seeds average gain/loss from the first `period` deltas, then smooths
/// with alpha = 1/period. First defined value at index `period` (one delta
/// per row, so `period` deltas need `period + 1` rows). A window with zero
/// average loss reads 100, zero average gain reads 0.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "RSI period must be >= 1");
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period + 1 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rs_to_rsi(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let delta = values[i] - values[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        out[i] = rs_to_rsi(avg_gain, avg_loss);
    }
    out
}

fn rs_to_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat or monotonically rising window reads 100 by definition.
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Commodity Channel Index over the typical price `(high + low + close) / 3`.
///
/// `cci[i] = (tp[i] - sma(tp)[i]) / (CCI_CONSTANT * mad(tp)[i])` where `mad`
/// is the mean absolute deviation of the window around its own mean. First
/// defined value at index `period - 1`. A fully flat window has zero mean
/// deviation; the quotient is undefined there and the value reads 0.0
/// (price sits exactly on its average) rather than propagating a division
/// fault.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "CCI period must be >= 1");
    assert!(
        high.len() == low.len() && low.len() == close.len(),
        "CCI inputs must have equal length"
    );
    let n = close.len();
    let mut out = vec![f64::NAN; n];

    let mut window: VecDeque<f64> = VecDeque::with_capacity(period + 1);
    let mut sum = 0.0;
    for i in 0..n {
        let tp = (high[i] + low[i] + close[i]) / 3.0;
        window.push_back(tp);
        sum += tp;
        if window.len() > period {
            sum -= window.pop_front().unwrap_or_default();
        }
        if window.len() < period {
            continue;
        }
        let mean = sum / period as f64;
        let mad = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        out[i] = if mad == 0.0 {
            0.0
        } else {
            (tp - mean) / (CCI_CONSTANT * mad)
        };
    }
    out
}
