pub mod analysis;
pub mod batch;
pub mod catalog;
pub mod chord;
pub mod config;
pub mod kripke;
pub mod tonality;

/// Application name for XDG paths
pub const APP_NAME: &str = "tonalogy";
