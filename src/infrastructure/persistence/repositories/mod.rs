mod backtest_repository;
mod prediction_repository;
mod strategy_repository;

pub use backtest_repository::SqliteBacktestRepository;
pub use prediction_repository::SqlitePredictionRepository;
pub use strategy_repository::SqliteStrategyRepository;
