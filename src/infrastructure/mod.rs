pub mod binance_ws;
pub mod persistence;
pub mod vault_http;
