#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod network;
pub mod transition;

#[cfg(test)]
mod fixtures;

pub use error::{Error, Result};
