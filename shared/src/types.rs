//! Core types used throughout the realm fixture

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervised daemon roles; a realm holds at most one live process per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaemonRole {
    /// Key distribution center
    Kdc,
    /// Remote administration server
    Kadmind,
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonRole::Kdc => write!(f, "kdc"),
            DaemonRole::Kadmind => write!(f, "kadmind"),
        }
    }
}

/// Deterministic block of ten consecutive ports derived from a base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBlock {
    base: u16,
}

impl PortBlock {
    pub const SIZE: u16 = 10;

    pub fn new(base: u16) -> Self {
        Self { base }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Port at `offset` within the block (0..=9)
    pub fn port(&self, offset: u16) -> u16 {
        debug_assert!(offset < Self::SIZE);
        self.base + offset
    }

    pub fn kdc(&self) -> u16 {
        self.port(0)
    }

    pub fn kadmind(&self) -> u16 {
        self.port(1)
    }

    pub fn kpasswd(&self) -> u16 {
        self.port(2)
    }

    pub fn kprop(&self) -> u16 {
        self.port(3)
    }

    pub fn iprop(&self) -> u16 {
        self.port(4)
    }

    /// Port reserved for a generic test server
    pub fn server(&self) -> u16 {
        self.port(5)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..Self::SIZE).map(move |offset| self.port(offset))
    }
}

impl Default for PortBlock {
    fn default() -> Self {
        Self::new(61000)
    }
}
