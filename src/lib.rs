//! xdisc library
//!
//! Storage layer for Xbox 360 game discs: monolithic disc images, split
//! virtual discs and package images, read through one filesystem surface.

pub mod cli;
pub mod config;
pub mod disc;
