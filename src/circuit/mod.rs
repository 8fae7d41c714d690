//! Circuit graph representation and validation.
//!
//! This module provides the editable representation of a circuit. The
//! [`Circuit`] struct holds all nodes, components, wires and probes;
//! [`NodeMap`] lays out the unknown vector the solver works on.

mod graph;
mod nodemap;
mod types;
mod validate;

pub use graph::Circuit;
pub use nodemap::NodeMap;
pub use types::*;
pub use validate::{check_short_circuit, find_short_circuit, validate_circuit};
