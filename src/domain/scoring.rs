//! Composite scoring for backtest results.
//!
//! The exact weighting is deliberately pluggable behind `CompositeScorer`;
//! the default `WeightedScorer` guarantees the monotonicity the evaluator
//! relies on: higher Sharpe, win rate, profit factor and return raise the
//! score, deeper drawdown lowers it. Output is always clamped to [0, 1].

use crate::domain::types::BacktestMetrics;
use rust_decimal::prelude::ToPrimitive;

pub trait CompositeScorer: Send + Sync {
    /// Map raw backtest metrics to a scalar in [0, 1].
    fn score(&self, metrics: &BacktestMetrics) -> f64;
}

/// Weighted sum over normalized metrics, minus a drawdown penalty.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    pub sharpe_weight: f64,
    pub win_rate_weight: f64,
    pub profit_factor_weight: f64,
    pub return_weight: f64,
    pub drawdown_penalty: f64,
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self {
            sharpe_weight: 0.30,
            win_rate_weight: 0.25,
            profit_factor_weight: 0.25,
            return_weight: 0.20,
            drawdown_penalty: 0.50,
        }
    }
}

impl WeightedScorer {
    /// Sharpe above 3.0 is treated as saturated.
    fn normalized_sharpe(sharpe: f64) -> f64 {
        (sharpe / 3.0).clamp(0.0, 1.0)
    }

    /// Profit factor of 1.0 (break-even) maps to 0.5, asymptotic to 1.0.
    fn normalized_profit_factor(pf: f64) -> f64 {
        if pf <= 0.0 { 0.0 } else { pf / (pf + 1.0) }
    }

    /// Total return of +100% saturates the return contribution.
    fn normalized_return(total_return: f64) -> f64 {
        total_return.clamp(0.0, 1.0)
    }
}

impl CompositeScorer for WeightedScorer {
    fn score(&self, metrics: &BacktestMetrics) -> f64 {
        let total_return = metrics.total_return.to_f64().unwrap_or(0.0);

        let positive = self.sharpe_weight * Self::normalized_sharpe(metrics.sharpe_ratio)
            + self.win_rate_weight * metrics.win_rate.clamp(0.0, 1.0)
            + self.profit_factor_weight * Self::normalized_profit_factor(metrics.profit_factor)
            + self.return_weight * Self::normalized_return(total_return);

        let penalty = self.drawdown_penalty * metrics.max_drawdown.clamp(0.0, 1.0);

        (positive - penalty).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_metrics() -> BacktestMetrics {
        BacktestMetrics {
            total_return: dec!(0.20),
            sharpe_ratio: 1.5,
            max_drawdown: 0.10,
            win_rate: 0.55,
            profit_factor: 1.4,
        }
    }

    #[test]
    fn test_score_is_bounded() {
        let scorer = WeightedScorer::default();

        let terrible = BacktestMetrics {
            total_return: dec!(-0.90),
            sharpe_ratio: -2.0,
            max_drawdown: 0.95,
            win_rate: 0.05,
            profit_factor: 0.1,
        };
        let stellar = BacktestMetrics {
            total_return: dec!(5.0),
            sharpe_ratio: 9.0,
            max_drawdown: 0.0,
            win_rate: 0.95,
            profit_factor: 10.0,
        };

        assert!((0.0..=1.0).contains(&scorer.score(&terrible)));
        assert!((0.0..=1.0).contains(&scorer.score(&stellar)));
    }

    #[test]
    fn test_higher_sharpe_raises_score() {
        let scorer = WeightedScorer::default();
        let low = base_metrics();
        let mut high = base_metrics();
        high.sharpe_ratio = 2.5;

        assert!(scorer.score(&high) > scorer.score(&low));
    }

    #[test]
    fn test_higher_win_rate_raises_score() {
        let scorer = WeightedScorer::default();
        let low = base_metrics();
        let mut high = base_metrics();
        high.win_rate = 0.70;

        assert!(scorer.score(&high) > scorer.score(&low));
    }

    #[test]
    fn test_higher_profit_factor_raises_score() {
        let scorer = WeightedScorer::default();
        let low = base_metrics();
        let mut high = base_metrics();
        high.profit_factor = 2.2;

        assert!(scorer.score(&high) > scorer.score(&low));
    }

    #[test]
    fn test_deeper_drawdown_lowers_score() {
        let scorer = WeightedScorer::default();
        let shallow = base_metrics();
        let mut deep = base_metrics();
        deep.max_drawdown = 0.40;

        assert!(scorer.score(&deep) < scorer.score(&shallow));
    }
}
