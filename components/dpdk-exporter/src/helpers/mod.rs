pub mod hostname;
pub mod load_config;
pub mod shutdown;
