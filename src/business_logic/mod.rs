pub mod aggregator;
pub mod config;
pub mod extraction;
pub mod indicators;
pub mod patterns;
