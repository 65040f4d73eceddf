pub mod canvas;
pub mod config;
pub mod options;
pub mod prompt;
pub mod regions;
