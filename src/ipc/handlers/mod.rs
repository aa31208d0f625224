pub mod core;
pub mod records;
pub mod refresh;
pub mod settings;
pub mod stats;
