pub mod aggregate;
pub mod capture;
pub mod config;
pub mod engine;
pub mod errors;
pub mod export;
pub mod host;
pub mod overlay;
pub mod protocol;
pub mod render;
pub mod storage;
pub mod surface;
pub mod tui;

#[cfg(test)]
pub(crate) mod testing;
