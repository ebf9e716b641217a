pub mod config;
pub mod exercise;
pub mod pose;
