//! # lumen-domain
//!
//! Pure domain model for the lumen adaptive-lighting orchestrator.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **Zones** (a named group of lights behind one controller) and
//!   their manual/enabled state
//! - Define **Modes** and **Scenes**, the global selections that scale
//!   override durations and offset the adaptive curve
//! - Define **Adjustment components**: the pure composition of manual,
//!   scene, environmental and sunset contributions
//! - Define **Events** exchanged on the bus and the persisted **Snapshot**
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod adjustment;
pub mod event;
pub mod light;
pub mod mode;
pub mod scene;
pub mod snapshot;
pub mod zone;
