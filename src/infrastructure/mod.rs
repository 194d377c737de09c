// src/infrastructure/mod.rs
// Backend transports

pub mod http;
pub mod push;
