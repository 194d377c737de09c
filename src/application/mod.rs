// src/application/mod.rs
// Client-side state: query cache, mutations, push reconciliation and views

pub mod cache;
pub mod dashboard;
pub mod export;
pub mod mutations;
pub mod notifications;
pub mod queries;
pub mod realtime;
pub mod store;
