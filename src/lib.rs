// src/lib.rs
// Main library module declarations

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
