//! Error types for the `emotionsim-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

use emotionsim_types::{ItemId, LocationId};

/// Errors that can occur during world-graph and world-state operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A location was not found in the world graph.
    #[error("location not found: {0}")]
    LocationNotFound(LocationId),

    /// A duplicate location was inserted where uniqueness is required.
    #[error("duplicate location id: {0}")]
    DuplicateLocation(LocationId),

    /// The item is not present at the given location.
    #[error("item {item} is not at location {location}")]
    ItemNotAtLocation {
        /// The missing item.
        item: ItemId,
        /// The location searched.
        location: LocationId,
    },

    /// A write to a reserved world-state key violated its declared type
    /// or range.
    #[error("reserved key {key} rejected: {reason}")]
    ReservedKeyViolation {
        /// The reserved key.
        key: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// A dynamic write fell outside the scenario-declared bounds.
    #[error("dynamic {key} value {value} outside bounds {min}..={max}")]
    DynamicOutOfBounds {
        /// The dynamic key.
        key: String,
        /// The rejected value.
        value: f64,
        /// Declared lower bound.
        min: f64,
        /// Declared upper bound.
        max: f64,
    },

    /// A write targeted a key the scenario never declared as a dynamic.
    #[error("key {0} is not a declared scenario dynamic")]
    UndeclaredDynamic(String),
}
