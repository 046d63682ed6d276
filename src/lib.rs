//! Live tracker for a shared pixel canvas: mirrors the board from the
//! canvas server, measures template progress, and replays archived logs.

pub mod config;
pub mod error;
pub mod palette;
pub mod routes;
pub mod services;
pub mod state;
