pub mod ble;
pub mod config;
pub mod error;
pub mod frame;
pub mod history;
pub mod models;
pub mod negotiate;
pub mod session;
pub mod tags;

pub use error::{AppError, Result};
