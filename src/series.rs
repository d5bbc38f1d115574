//! Series Normalizer: turns a raw, possibly intraday and gappy observation
//! sequence into one aggregated, gap-free daily series.
//!
//! Within a calendar day the last observed value wins (last price of day).
//! The output covers every day between the first and last observed close,
//! with prices forward-filled through non-trading days and volume
//! backward-filled. Downstream rolling math relies on this: one row per
//! day, strictly ascending, no holes.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::PipelineError;

/// One parsed row of source data, possibly sub-daily.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// One normalized row per calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// Collapses observations to one bar per day and fills calendar gaps.
///
/// The day range is anchored on observations that actually carry a close:
/// the first output row always has a real close, so forward-filling never
/// has to invent one. An input with no close at all is [`PipelineError::EmptySeries`].
pub fn normalize_daily(mut observations: Vec<RawObservation>) -> Result<Vec<DailyBar>, PipelineError> {
    observations.sort_by_key(|o| o.timestamp);

    // Per-field "last value of the day" maps. Fields are aggregated
    // independently so a partially filled intraday row still contributes
    // what it has.
    let mut opens: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut highs: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut lows: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut closes: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut volumes: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for obs in &observations {
        let date = obs.timestamp.date();
        if let Some(v) = obs.open {
            opens.insert(date, v);
        }
        if let Some(v) = obs.high {
            highs.insert(date, v);
        }
        if let Some(v) = obs.low {
            lows.insert(date, v);
        }
        if let Some(v) = obs.close {
            closes.insert(date, v);
        }
        if let Some(v) = obs.volume {
            volumes.insert(date, v);
        }
    }

    let (&first, _) = closes.first_key_value().ok_or(PipelineError::EmptySeries)?;
    let (&last, _) = closes.last_key_value().ok_or(PipelineError::EmptySeries)?;

    let mut bars = Vec::with_capacity((last - first).num_days() as usize + 1);

    let mut open = None;
    let mut high = None;
    let mut low = None;
    let mut close = None;

    for date in first.iter_days().take_while(|d| *d <= last) {
        open = opens.get(&date).copied().or(open);
        close = closes.get(&date).copied().or(close);
        high = highs.get(&date).copied().or(high);
        low = lows.get(&date).copied().or(low);

        // Guaranteed Some: the range starts at the first observed close.
        let close_val = close.ok_or(PipelineError::EmptySeries)?;

        bars.push(DailyBar {
            date,
            open,
            // Sources without high/low granularity on the first days
            // degrade to the close itself.
            high: high.unwrap_or(close_val),
            low: low.unwrap_or(close_val),
            close: close_val,
            volume: None,
        });
    }

    // Volume fills backward: a non-trading day inherits the next observed
    // volume, and a trailing gap stays absent.
    let mut next_volume = None;
    for bar in bars.iter_mut().rev() {
        if let Some(&v) = volumes.get(&bar.date) {
            next_volume = Some(v);
        }
        bar.volume = next_volume;
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(ts: &str, close: f64) -> RawObservation {
        RawObservation {
            timestamp: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap(),
            open: None,
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close: Some(close),
            volume: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn covers_every_calendar_day_in_range() {
        let bars = normalize_daily(vec![
            obs("2025-01-03 10:00:00", 10.0),
            obs("2025-01-10 10:00:00", 12.0),
            obs("2025-01-06 10:00:00", 11.0),
        ])
        .unwrap();

        assert_eq!(bars.len(), 8);
        assert_eq!(bars[0].date, date("2025-01-03"));
        assert_eq!(bars[7].date, date("2025-01-10"));
        for pair in bars.windows(2) {
            assert_eq!(pair[1].date, pair[0].date.succ_opt().unwrap());
        }
    }

    #[test]
    fn gap_days_forward_fill_prices() {
        let bars = normalize_daily(vec![
            obs("2025-01-03 10:00:00", 10.0),
            obs("2025-01-06 10:00:00", 11.0),
        ])
        .unwrap();

        // 04th and 05th carry the 03rd's bar.
        assert_eq!(bars[1].close, 10.0);
        assert_eq!(bars[2].close, 10.0);
        assert_eq!(bars[1].high, 11.0);
        assert_eq!(bars[1].low, 9.0);
        assert_eq!(bars[3].close, 11.0);
    }

    #[test]
    fn last_observation_of_the_day_wins() {
        let bars = normalize_daily(vec![
            obs("2025-01-03 16:00:00", 10.5),
            obs("2025-01-03 09:00:00", 10.0),
            obs("2025-01-03 12:00:00", 10.2),
        ])
        .unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 10.5);
    }

    #[test]
    fn volume_backward_fills_and_trailing_gap_stays_absent() {
        let mut a = obs("2025-01-01 10:00:00", 10.0);
        a.volume = Some(500.0);
        let b = obs("2025-01-03 10:00:00", 11.0);
        let mut c = obs("2025-01-04 10:00:00", 12.0);
        c.volume = Some(700.0);
        let d = obs("2025-01-06 10:00:00", 13.0);

        let bars = normalize_daily(vec![a, b, c, d]).unwrap();

        assert_eq!(bars[0].volume, Some(500.0));
        // 02nd and 03rd have no volume and inherit the 04th's.
        assert_eq!(bars[1].volume, Some(700.0));
        assert_eq!(bars[2].volume, Some(700.0));
        assert_eq!(bars[3].volume, Some(700.0));
        // Nothing observed after the 04th.
        assert_eq!(bars[4].volume, None);
        assert_eq!(bars[5].volume, None);
    }

    #[test]
    fn single_observation_yields_single_bar() {
        let bars = normalize_daily(vec![obs("2025-01-03 10:00:00", 10.0)]).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, date("2025-01-03"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            normalize_daily(vec![]),
            Err(PipelineError::EmptySeries)
        ));
    }

    #[test]
    fn observations_without_any_close_are_an_error() {
        let mut o = obs("2025-01-03 10:00:00", 10.0);
        o.close = None;
        assert!(matches!(
            normalize_daily(vec![o]),
            Err(PipelineError::EmptySeries)
        ));
    }

    #[test]
    fn missing_high_low_degrade_to_close() {
        let mut o = obs("2025-01-03 10:00:00", 10.0);
        o.high = None;
        o.low = None;
        let bars = normalize_daily(vec![o]).unwrap();
        assert_eq!(bars[0].high, 10.0);
        assert_eq!(bars[0].low, 10.0);
    }
}
