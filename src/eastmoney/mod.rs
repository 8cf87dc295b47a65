// src/eastmoney/mod.rs
pub mod client;
pub mod models;
