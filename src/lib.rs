//! Crypto advisory signals: candlestick patterns and technical indicators,
//! optionally blended with an AI market read, for a watch-list of futures
//! pairs polled on a fixed cadence.

pub mod business_logic;
pub mod errors;
pub mod models;
pub mod services;
