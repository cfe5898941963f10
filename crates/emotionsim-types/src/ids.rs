//! Type-safe identifier wrappers.
//!
//! Run-scoped entities (runs, agents, conversations, tasks, votes, messages,
//! events) use strongly-typed UUID v7 wrappers so identifiers cannot be mixed
//! at compile time and sort by creation time in database indexes.
//!
//! Locations and items are different: scenarios key them by *name* and agents
//! create locations dynamically by naming a destination that does not exist
//! yet. For those two, the name is the identity, so [`LocationId`] and
//! [`ItemId`] are newtypes over [`String`].

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around [`String`] for name-keyed entities.
macro_rules! define_name_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Return the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier and return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a scenario template.
    ScenarioId
}

define_id! {
    /// Unique identifier for a run (one execution instance of a scenario).
    RunId
}

define_id! {
    /// Unique identifier for an agent instance within a run.
    AgentId
}

define_id! {
    /// Unique identifier for a conversation between co-located agents.
    ConversationId
}

define_id! {
    /// Unique identifier for a shared cooperation task.
    TaskId
}

define_id! {
    /// Unique identifier for a vote opened by an agent.
    VoteId
}

define_id! {
    /// Unique identifier for a message routed through the bus.
    MessageId
}

define_name_id! {
    /// Name-keyed identifier for a location (node in the world graph).
    LocationId
}

define_name_id! {
    /// Name-keyed identifier for an item.
    ItemId
}
