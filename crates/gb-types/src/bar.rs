use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single OHLCV price bar, independent of the resolution it was sampled at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarPoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A bar plus the named indicator values computed over it, as handed to the
/// evaluator. `indicators` is produced by an external feature/bar computation
/// collaborator; this crate only defines the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarData {
    pub bar: BarPoint,
    pub indicators: HashMap<String, f64>,
}

impl BarData {
    /// Looks up an indicator by name. NaN and infinite values are treated as
    /// "missing" rather than as valid numbers.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators
            .get(name)
            .copied()
            .filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> BarPoint {
        BarPoint {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn missing_indicator_is_none() {
        let data = BarData {
            bar: bar(100.0),
            indicators: HashMap::new(),
        };
        assert_eq!(data.indicator("atr_14"), None);
    }

    #[test]
    fn nan_indicator_is_treated_as_missing() {
        let mut indicators = HashMap::new();
        indicators.insert("atr_14".to_string(), f64::NAN);
        indicators.insert("rsi_14".to_string(), f64::INFINITY);
        indicators.insert("sma_20".to_string(), 101.5);
        let data = BarData {
            bar: bar(100.0),
            indicators,
        };
        assert_eq!(data.indicator("atr_14"), None);
        assert_eq!(data.indicator("rsi_14"), None);
        assert_eq!(data.indicator("sma_20"), Some(101.5));
    }
}
