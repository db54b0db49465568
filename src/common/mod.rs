pub mod config;
#[macro_use]
pub mod logging;
pub mod setup;

pub use config::LoaderConfig;
