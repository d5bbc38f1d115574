use serde::{Deserialize, Serialize};

/// Threshold-based label for one analyzed row.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }
}

/// The four oscillator thresholds driving classification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub rsi_buy: f64,
    pub cci_buy: f64,
    pub rsi_sell: f64,
    pub cci_sell: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_buy: 35.0,
            cci_buy: -90.0,
            rsi_sell: 65.0,
            cci_sell: 90.0,
        }
    }
}

/// Classifies one row from its oscillator values.
///
/// Pure and total: both buy legs must agree for `Buy`, both sell legs for
/// `Sell`, anything else is `Hold`. Callers are responsible for excluding
/// rows whose oscillators are still warming up.
pub fn classify(rsi: f64, cci: f64, thresholds: &Thresholds) -> Signal {
    if rsi < thresholds.rsi_buy && cci < thresholds.cci_buy {
        Signal::Buy
    } else if rsi > thresholds.rsi_sell && cci > thresholds.cci_sell {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
