//! Unlock Impact Score and signal classification.
//!
//! UIS = (unlock_value_usd / avg_daily_volume_usd) × (1 + 10σ) × historical_dump_factor
//!
//! | UIS            | signal          | expected move      |
//! |----------------|-----------------|--------------------|
//! | > 1.2          | SHORT           | −5 − 2·UIS         |
//! | [0.7, 1.2]     | AVOID           | −1                 |
//! | (0, 0.7)       | LONG_AFTER_DUMP | 5 + 1/UIS          |
//! | 0.00 or no data| AVOID           | 0                  |
//!
//! Everything here is pure; fetching lives in `engine`.

use tracing::debug;

use crate::error::EngineError;
use crate::models::{CandleSeries, SignalType, TradeSignal, UnlockEvent};
use crate::signals::market_aggregator::MarketStats;

pub const SHORT_THRESHOLD: f64 = 1.2;
pub const AVOID_FLOOR: f64 = 0.7;
/// Stand-in for a per-token historical dump lookup.
pub const DEFAULT_HISTORICAL_DUMP_FACTOR: f64 = 1.1;
pub const VOLATILITY_SCALE: f64 = 10.0;

pub const BASE_CONFIDENCE: f64 = 50.0;
pub const CLIFF_CONFIDENCE_BONUS: f64 = 15.0;
pub const ONCHAIN_CONFIDENCE_WEIGHT: f64 = 20.0;
pub const MAX_CONFIDENCE: f64 = 99.0;

const AVOID_EXPECTED_MOVE: f64 = -1.0;

/// Intermediate terms of a UIS computation, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UisBreakdown {
    pub avg_daily_volume_usd: f64,
    pub unlock_value_usd: f64,
    pub pressure_ratio: f64,
    pub volatility: f64,
    pub volatility_factor: f64,
    pub historical_dump_factor: f64,
    pub uis: f64,
}

impl UisBreakdown {
    pub fn compose(
        unlock_value_usd: f64,
        avg_daily_volume_usd: f64,
        volatility: f64,
        historical_dump_factor: f64,
    ) -> Result<Self, EngineError> {
        if avg_daily_volume_usd <= 0.0 || !avg_daily_volume_usd.is_finite() {
            return Err(EngineError::UndefinedRatio("average daily volume is zero"));
        }
        let pressure_ratio = unlock_value_usd / avg_daily_volume_usd;
        let volatility_factor = 1.0 + VOLATILITY_SCALE * volatility;
        let uis = pressure_ratio * volatility_factor * historical_dump_factor;
        if !uis.is_finite() {
            return Err(EngineError::UndefinedRatio("non-finite impact score"));
        }
        Ok(Self {
            avg_daily_volume_usd,
            unlock_value_usd,
            pressure_ratio,
            volatility,
            volatility_factor,
            historical_dump_factor,
            uis,
        })
    }
}

pub fn uis_breakdown(
    event: &UnlockEvent,
    series: &CandleSeries,
    historical_dump_factor: f64,
) -> Result<UisBreakdown, EngineError> {
    let stats = MarketStats::from_series(series).ok_or_else(|| {
        EngineError::DataUnavailable(format!("no candles for {}", event.token_symbol))
    })?;
    let unlock_value_usd = event.unlock_amount * stats.last_close;
    UisBreakdown::compose(
        unlock_value_usd,
        stats.avg_daily_volume_usd,
        stats.volatility,
        historical_dump_factor,
    )
}

/// UIS for an event; every degraded input collapses to 0.0.
pub fn unlock_impact_score(
    event: &UnlockEvent,
    series: &CandleSeries,
    historical_dump_factor: f64,
) -> f64 {
    match uis_breakdown(event, series, historical_dump_factor) {
        Ok(b) => {
            debug!(
                token = %event.token_symbol,
                pressure_ratio = b.pressure_ratio,
                volatility = b.volatility,
                uis = b.uis,
                "UIS computed"
            );
            b.uis
        }
        Err(e) => {
            debug!(token = %event.token_symbol, reason = %e, "UIS degraded to 0.0");
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub signal: SignalType,
    pub expected_move_pct: f64,
    pub insufficient_data: bool,
}

const INSUFFICIENT_DATA: Classification = Classification {
    signal: SignalType::Avoid,
    expected_move_pct: 0.0,
    insufficient_data: true,
};

/// A UIS that would print as 0.00, or whose expected move is not finite,
/// is treated the same as no data.
pub fn classify(uis: f64) -> Classification {
    if !uis.is_finite() || round2(uis) <= 0.0 {
        return INSUFFICIENT_DATA;
    }

    let (signal, expected_move_pct) = if uis > SHORT_THRESHOLD {
        (SignalType::Short, -5.0 - 2.0 * uis)
    } else if uis < AVOID_FLOOR {
        (SignalType::LongAfterDump, 5.0 + 1.0 / uis)
    } else {
        (SignalType::Avoid, AVOID_EXPECTED_MOVE)
    };

    if !expected_move_pct.is_finite() {
        return INSUFFICIENT_DATA;
    }

    Classification {
        signal,
        expected_move_pct,
        insufficient_data: false,
    }
}

/// On-chain pressure only ever corroborates a SHORT.
pub fn confidence(is_cliff: bool, signal: SignalType, onchain_confidence: f64) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if is_cliff {
        confidence += CLIFF_CONFIDENCE_BONUS;
    }
    if signal == SignalType::Short {
        let onchain = if onchain_confidence.is_finite() {
            onchain_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        confidence += onchain * ONCHAIN_CONFIDENCE_WEIGHT;
    }
    confidence.min(MAX_CONFIDENCE)
}

#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The only constructor of `TradeSignal` in the pipeline.
pub fn build_signal(event: &UnlockEvent, uis: f64, onchain_confidence: f64) -> TradeSignal {
    let class = classify(uis);
    let uis = if class.insufficient_data { 0.0 } else { uis };

    let reason = if class.insufficient_data {
        "Insufficient market data: UIS unavailable (0.00)".to_string()
    } else {
        let pressure = match class.signal {
            SignalType::Short => "High",
            SignalType::Avoid => "Moderate",
            SignalType::LongAfterDump => "Low",
        };
        format!("UIS: {:.2} (Pressure: {})", uis, pressure)
    };

    TradeSignal {
        token: event.token_symbol.clone(),
        signal: class.signal,
        uis_score: round2(uis),
        confidence: confidence(event.is_cliff, class.signal, onchain_confidence),
        expected_move_pct: round2(class.expected_move_pct),
        reason,
    }
}
