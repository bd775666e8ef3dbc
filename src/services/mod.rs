pub mod ai;
pub mod binance;
pub mod callbacks;
pub mod monitor;
pub mod pipeline;
pub mod retry;
