pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod esri;
pub mod output;
pub mod spatial;
pub mod store;
pub mod tabular;
