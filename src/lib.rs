pub mod api;
pub mod models;
pub mod stock_saver;
pub mod storage;
pub mod utils;
