// Core entities: candles, indicators, strategies, episodes, signals.
pub mod candle;
pub mod episode;
pub mod indicators;
pub mod signal;
pub mod strategy;
pub mod types;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
