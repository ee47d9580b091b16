pub mod application;
pub mod clmath;
pub mod config;
pub mod domain;
pub mod infrastructure;
