//! Tracking engine services used by the HTTP routes, the CLI and the
//! background ingest and refresh tasks.
//!
//! ARCHITECTURE
//! ============
//! `board` holds the live canvas. `ingest` applies feed events to it and
//! `refresh` swaps in a new generation after a canvas reset. Every
//! other module is either a pure computation over snapshots (`template`,
//! `layer`, `cooldown`, `archive`) or an adapter to the canvas server
//! (`bootstrap`, `template_source`).

pub mod archive;
pub mod board;
pub mod bootstrap;
pub mod cooldown;
pub mod ingest;
pub mod layer;
pub mod refresh;
pub mod template;
pub mod template_source;
