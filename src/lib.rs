//! CineBoard — a node-graph storyboard workspace.
//!
//! Generated scene boards live on an infinite canvas; continuing a board
//! chains the new one below it, so each column reads as one evolving scene.

#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod canvas;
pub mod components;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;
pub mod store;
pub mod textures;
