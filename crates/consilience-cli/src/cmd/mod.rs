pub mod config;
pub mod lanes;
pub mod run;
