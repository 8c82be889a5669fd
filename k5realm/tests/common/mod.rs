//! Common test utilities and infrastructure
//!
//! Fake MIT and Heimdal toolchains plus the standard test realm settings
//! shared by the k5realm integration suites.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::{fake_log, FakeToolchain, TestFixtures};
