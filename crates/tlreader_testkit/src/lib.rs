//! # tlreader testkit
//!
//! Test utilities for the timeline reader.
//!
//! This crate provides:
//! - A fault-injecting storage connector
//! - A scripted liveness probe that can be held mid-probe
//! - A reader factory that counts strategy requests
//! - Seeded store fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use tlreader_core::TimelineReader;
//! use tlreader_testkit::prelude::*;
//!
//! let fixture = TimelineFixture::new();
//! let connector = fixture.faulty_connector();
//! let plan = connector.plan();
//! let reader = TimelineReader::new(fixture.config(Duration::from_secs(60)), connector).unwrap();
//! reader.start().unwrap();
//!
//! plan.set_offline(true);
//! let monitor = reader.monitor().unwrap();
//! assert!(wait_for_probes(&monitor, 1, Duration::from_secs(5)));
//! monitor.run_probe_cycle();
//! assert!(!reader.get_health_status().is_running());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod factory;
pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod probe;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::factory::*;
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::probe::*;
}

pub use factory::CountingFactory;
pub use fault::{FaultPlan, FaultyConnector};
pub use fixtures::{wait_for_probes, TimelineFixture, TEST_CLUSTER};
pub use probe::ScriptedProbe;
