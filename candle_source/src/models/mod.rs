pub mod candle;
pub mod period;
pub mod request_params;
pub mod ticker;
