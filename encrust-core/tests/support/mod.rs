//! Shared helpers for encrust-core integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod runner;
