//! autofish: keeps a fishing game bot busy and answers its verification checks.

pub mod bot;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod render;
pub mod store;
pub mod supervisor;
pub mod transport;
pub mod verify;
