//! Movement resolution over the world graph.
//!
//! The resolver turns a `move` action into one of: a trivial no-op (already
//! there), a dynamic location creation, an immediate move (adjacent target),
//! the first hop of a multi-tick journey, or a failure. Failures for the
//! same `(agent, target)` pair are reported once per tick; repeats within
//! the tick are suppressed so observers see at most one `movement_failed`
//! per pair per step.

use std::collections::BTreeSet;

use rand::rngs::SmallRng;

use emotionsim_types::{AgentId, Location, LocationId};

use crate::graph::WorldGraph;

/// The result of resolving one `move` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The target is the agent's current location. Successful no-op;
    /// no event is emitted.
    Unchanged,
    /// The target was adjacent; the agent is now there.
    Moved {
        /// The new location.
        location: LocationId,
    },
    /// The target did not exist; it was created with bidirectional
    /// adjacency to the agent's location, and the agent is now there.
    Created {
        /// The freshly created location.
        location: Location,
    },
    /// The target is more than one hop away; the agent advanced to
    /// `next_hop` and the rest of the journey is queued.
    Travelling {
        /// The hop just taken.
        next_hop: LocationId,
        /// Remaining hops after `next_hop`, in order, ending at the target.
        remaining: Vec<LocationId>,
        /// The full planned path including both endpoints.
        full_path: Vec<LocationId>,
    },
    /// No path within the search depth.
    Failed {
        /// Failure reason (stable string, e.g. `unreachable`).
        reason: String,
        /// Whether this pair already failed this tick. When `true`, no
        /// `movement_failed` event may be emitted.
        suppressed: bool,
    },
}

/// Resolves `move` actions and tracks the per-tick failed-movement cache.
#[derive(Debug, Default)]
pub struct MovementResolver {
    /// Pairs that already produced a `movement_failed` event this tick.
    failed: BTreeSet<(AgentId, LocationId)>,
}

impl MovementResolver {
    /// Create a resolver with an empty cache.
    pub const fn new() -> Self {
        Self {
            failed: BTreeSet::new(),
        }
    }

    /// Clear the failed-movement cache. Called at the start of every tick.
    pub fn begin_step(&mut self) {
        self.failed.clear();
    }

    /// Number of distinct failed pairs recorded this tick.
    pub fn failed_pairs(&self) -> usize {
        self.failed.len()
    }

    /// Resolve a move for `agent`, currently at `current`, toward `target`.
    ///
    /// May mutate the graph (dynamic location creation). The caller applies
    /// the outcome to the agent's dynamic state and emits events.
    pub fn resolve(
        &mut self,
        graph: &mut WorldGraph,
        agent: AgentId,
        current: &LocationId,
        target: &LocationId,
        rng: &mut SmallRng,
    ) -> MoveOutcome {
        if target == current {
            return MoveOutcome::Unchanged;
        }

        if !graph.contains(target) {
            return match graph.create_dynamic(target, current, rng) {
                Ok(location) => MoveOutcome::Created { location },
                Err(error) => {
                    tracing::warn!(%agent, %target, %error, "dynamic location creation failed");
                    self.fail(agent, target, "creation_failed")
                }
            };
        }

        match graph.find_path(current, target) {
            None => self.fail(agent, target, "unreachable"),
            Some(path) if path.len() <= 2 => MoveOutcome::Moved {
                location: target.clone(),
            },
            Some(path) => {
                let Some(next_hop) = path.get(1).cloned() else {
                    return self.fail(agent, target, "unreachable");
                };
                let remaining: Vec<LocationId> = path.iter().skip(2).cloned().collect();
                MoveOutcome::Travelling {
                    next_hop,
                    remaining,
                    full_path: path,
                }
            }
        }
    }

    /// Record a failure, suppressing the event if the pair already failed
    /// this tick.
    fn fail(&mut self, agent: AgentId, target: &LocationId, reason: &str) -> MoveOutcome {
        let first = self.failed.insert((agent, target.clone()));
        MoveOutcome::Failed {
            reason: reason.to_owned(),
            suppressed: !first,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use rand::SeedableRng;

    use emotionsim_types::Location;

    use super::*;

    fn loc(id: &str, nearby: &[&str]) -> Location {
        Location {
            id: LocationId::from(id),
            description: String::new(),
            nearby: nearby.iter().map(|n| LocationId::from(*n)).collect(),
            distance: 1,
            items: Vec::new(),
            hidden_items: Vec::new(),
            hazard_affected: false,
        }
    }

    fn chain_graph() -> WorldGraph {
        let mut graph = WorldGraph::new();
        let _ = graph.add_location(loc("a", &["b"]));
        let _ = graph.add_location(loc("b", &["a", "c"]));
        let _ = graph.add_location(loc("c", &["b", "d"]));
        let _ = graph.add_location(loc("d", &["c"]));
        graph
    }

    #[test]
    fn move_to_current_is_unchanged() {
        let mut graph = chain_graph();
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("a"),
            &mut rng,
        );
        assert_eq!(outcome, MoveOutcome::Unchanged);
    }

    #[test]
    fn adjacent_move_teleports() {
        let mut graph = chain_graph();
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("b"),
            &mut rng,
        );
        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                location: LocationId::from("b")
            }
        );
    }

    #[test]
    fn distant_move_starts_travel() {
        let mut graph = chain_graph();
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("d"),
            &mut rng,
        );
        match outcome {
            MoveOutcome::Travelling {
                next_hop,
                remaining,
                full_path,
            } => {
                assert_eq!(next_hop, LocationId::from("b"));
                assert_eq!(remaining, vec![LocationId::from("c"), LocationId::from("d")]);
                assert_eq!(full_path.len(), 4);
            }
            other => panic!("expected Travelling, got {other:?}"),
        }
    }

    #[test]
    fn unknown_target_is_created() {
        let mut graph = chain_graph();
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("z"),
            &mut rng,
        );
        match outcome {
            MoveOutcome::Created { location } => {
                assert_eq!(location.id, LocationId::from("z"));
                assert!(graph.contains(&LocationId::from("z")));
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn repeated_failure_is_suppressed_within_a_tick() {
        let mut graph = chain_graph();
        let _ = graph.add_location(loc("island", &[]));
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let agent = AgentId::new();

        let first = resolver.resolve(
            &mut graph,
            agent,
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        assert_eq!(
            first,
            MoveOutcome::Failed {
                reason: "unreachable".to_owned(),
                suppressed: false
            }
        );

        let second = resolver.resolve(
            &mut graph,
            agent,
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        assert_eq!(
            second,
            MoveOutcome::Failed {
                reason: "unreachable".to_owned(),
                suppressed: true
            }
        );
    }

    #[test]
    fn failure_cache_clears_at_step_start() {
        let mut graph = chain_graph();
        let _ = graph.add_location(loc("island", &[]));
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let agent = AgentId::new();

        let _ = resolver.resolve(
            &mut graph,
            agent,
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        assert_eq!(resolver.failed_pairs(), 1);

        resolver.begin_step();
        assert_eq!(resolver.failed_pairs(), 0);

        let retry = resolver.resolve(
            &mut graph,
            agent,
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        assert_eq!(
            retry,
            MoveOutcome::Failed {
                reason: "unreachable".to_owned(),
                suppressed: false
            }
        );
    }

    #[test]
    fn different_agents_fail_independently() {
        let mut graph = chain_graph();
        let _ = graph.add_location(loc("island", &[]));
        let mut resolver = MovementResolver::new();
        let mut rng = SmallRng::seed_from_u64(1);

        let first = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        let second = resolver.resolve(
            &mut graph,
            AgentId::new(),
            &LocationId::from("a"),
            &LocationId::from("island"),
            &mut rng,
        );
        for outcome in [first, second] {
            assert_eq!(
                outcome,
                MoveOutcome::Failed {
                    reason: "unreachable".to_owned(),
                    suppressed: false
                }
            );
        }
    }
}
