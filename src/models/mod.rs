pub mod candle;
pub mod indicators;
pub mod key_points;
pub mod market_info;
pub mod recommendation;
