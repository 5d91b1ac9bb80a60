//! Route handlers for the HTTP API.

pub mod downloads;
pub mod events;
pub mod health;
pub mod jobs;
pub mod media;
pub mod tools;
pub mod ws;
