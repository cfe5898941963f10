//! The world graph: locations as nodes, `nearby` adjacency as edges.
//!
//! Adjacency lists preserve scenario declaration order so breadth-first
//! searches tie-break deterministically. Edges may dangle: a `nearby` entry
//! naming an absent location is legal and stays non-traversable until the
//! location is created (dynamically or otherwise).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use rand::rngs::SmallRng;

use emotionsim_types::{ItemId, Location, LocationId};

use crate::error::WorldError;

/// Maximum breadth-first frontier depth for pathfinding.
///
/// A path of at most `MAX_SEARCH_DEPTH + 1` nodes (including both
/// endpoints) can be found; anything farther is unreachable.
pub const MAX_SEARCH_DEPTH: usize = 5;

/// The world graph holding all locations.
///
/// Provides adjacency queries, depth-capped breadth-first pathfinding,
/// dynamic location creation, and item container operations.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct WorldGraph {
    /// All locations indexed by their identifier.
    locations: BTreeMap<LocationId, Location>,
}

impl WorldGraph {
    /// Create an empty world graph.
    pub const fn new() -> Self {
        Self {
            locations: BTreeMap::new(),
        }
    }

    /// Build a graph from a scenario's location map.
    ///
    /// Adjacency entries naming absent locations are kept as declared;
    /// they become traversable once the location exists.
    pub fn from_locations(locations: &BTreeMap<LocationId, Location>) -> Self {
        Self {
            locations: locations.clone(),
        }
    }

    // -------------------------------------------------------------------
    // Location operations
    // -------------------------------------------------------------------

    /// Add a location to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateLocation`] if a location with the
    /// same id already exists.
    pub fn add_location(&mut self, location: Location) -> Result<(), WorldError> {
        let id = location.id.clone();
        if self.locations.contains_key(&id) {
            return Err(WorldError::DuplicateLocation(id));
        }
        self.locations.insert(id, location);
        Ok(())
    }

    /// Get an immutable reference to a location.
    pub fn get(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Get a mutable reference to a location.
    pub fn get_mut(&mut self, id: &LocationId) -> Option<&mut Location> {
        self.locations.get_mut(id)
    }

    /// Whether the graph contains a location with the given id.
    pub fn contains(&self, id: &LocationId) -> bool {
        self.locations.contains_key(id)
    }

    /// Return the number of locations in the graph.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the graph holds no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Iterate over all locations immutably.
    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &Location)> {
        self.locations.iter()
    }

    /// Return all location ids.
    pub fn location_ids(&self) -> Vec<LocationId> {
        self.locations.keys().cloned().collect()
    }

    /// Create a location dynamically because an agent targeted a name that
    /// does not exist yet.
    ///
    /// The new node gets a semantic distance drawn uniformly from 1..=3,
    /// no items, and bidirectional adjacency with `origin`. Returns a clone
    /// of the created location for event emission.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateLocation`] if the id already exists,
    /// or [`WorldError::LocationNotFound`] if `origin` is absent.
    pub fn create_dynamic(
        &mut self,
        id: &LocationId,
        origin: &LocationId,
        rng: &mut SmallRng,
    ) -> Result<Location, WorldError> {
        if self.locations.contains_key(id) {
            return Err(WorldError::DuplicateLocation(id.clone()));
        }
        if !self.locations.contains_key(origin) {
            return Err(WorldError::LocationNotFound(origin.clone()));
        }

        let location = Location {
            id: id.clone(),
            description: format!("An unmapped place known as {id}."),
            nearby: vec![origin.clone()],
            distance: rng.random_range(1..=3),
            items: Vec::new(),
            hidden_items: Vec::new(),
            hazard_affected: false,
        };
        self.locations.insert(id.clone(), location.clone());

        // Reflexively extend the origin's adjacency to keep dynamically
        // created edges bidirectional.
        if let Some(origin_loc) = self.locations.get_mut(origin)
            && !origin_loc.nearby.contains(id)
        {
            origin_loc.nearby.push(id.clone());
        }

        tracing::debug!(location = %id, origin = %origin, "created dynamic location");
        Ok(location)
    }

    // -------------------------------------------------------------------
    // Pathfinding
    // -------------------------------------------------------------------

    /// Find the shortest path from `start` to `goal` as an ordered list of
    /// location ids including both endpoints.
    ///
    /// Breadth-first search over `nearby`, capped at [`MAX_SEARCH_DEPTH`]
    /// hops. Neighbors are visited in adjacency-list order, so among
    /// equal-length paths the first-declared route wins. Adjacency entries
    /// naming absent locations are skipped.
    ///
    /// Returns `None` when `goal` is unreachable within the depth cap, and
    /// `Some(vec![start])` when `start == goal`.
    pub fn find_path(&self, start: &LocationId, goal: &LocationId) -> Option<Vec<LocationId>> {
        if start == goal {
            return Some(vec![start.clone()]);
        }
        if !self.locations.contains_key(start) || !self.locations.contains_key(goal) {
            return None;
        }

        let mut visited: BTreeSet<LocationId> = BTreeSet::new();
        let mut predecessor: BTreeMap<LocationId, LocationId> = BTreeMap::new();
        let mut frontier: VecDeque<(LocationId, usize)> = VecDeque::new();

        visited.insert(start.clone());
        frontier.push_back((start.clone(), 0));

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= MAX_SEARCH_DEPTH {
                continue;
            }
            let Some(location) = self.locations.get(&current) else {
                continue;
            };
            for neighbor in &location.nearby {
                if !self.locations.contains_key(neighbor) {
                    continue;
                }
                if visited.insert(neighbor.clone()) {
                    predecessor.insert(neighbor.clone(), current.clone());
                    if neighbor == goal {
                        return Some(reconstruct_path(&predecessor, start, goal));
                    }
                    frontier.push_back((neighbor.clone(), depth.saturating_add(1)));
                }
            }
        }

        None
    }

    // -------------------------------------------------------------------
    // Item containers
    // -------------------------------------------------------------------

    /// Remove an item from a location's visible item list.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LocationNotFound`] or
    /// [`WorldError::ItemNotAtLocation`].
    pub fn take_item(&mut self, location: &LocationId, item: &ItemId) -> Result<(), WorldError> {
        let loc = self
            .locations
            .get_mut(location)
            .ok_or_else(|| WorldError::LocationNotFound(location.clone()))?;
        let index = loc.items.iter().position(|candidate| candidate == item);
        match index {
            Some(i) => {
                loc.items.remove(i);
                Ok(())
            }
            None => Err(WorldError::ItemNotAtLocation {
                item: item.clone(),
                location: location.clone(),
            }),
        }
    }

    /// Append an item to a location's visible item list.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LocationNotFound`] if the location is absent.
    pub fn place_item(&mut self, location: &LocationId, item: ItemId) -> Result<(), WorldError> {
        let loc = self
            .locations
            .get_mut(location)
            .ok_or_else(|| WorldError::LocationNotFound(location.clone()))?;
        loc.items.push(item);
        Ok(())
    }

    /// Move every hidden item at the location into its visible item list.
    ///
    /// Returns the revealed item ids (empty when nothing was hidden).
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::LocationNotFound`] if the location is absent.
    pub fn reveal_hidden(&mut self, location: &LocationId) -> Result<Vec<ItemId>, WorldError> {
        let loc = self
            .locations
            .get_mut(location)
            .ok_or_else(|| WorldError::LocationNotFound(location.clone()))?;
        let revealed = std::mem::take(&mut loc.hidden_items);
        loc.items.extend(revealed.iter().cloned());
        Ok(revealed)
    }
}

/// Rebuild the path from the predecessor map (both endpoints included).
fn reconstruct_path(
    predecessor: &BTreeMap<LocationId, LocationId>,
    start: &LocationId,
    goal: &LocationId,
) -> Vec<LocationId> {
    let mut path = VecDeque::new();
    let mut current = goal.clone();
    path.push_front(current.clone());
    while let Some(previous) = predecessor.get(&current) {
        path.push_front(previous.clone());
        current = previous.clone();
        if &current == start {
            break;
        }
    }
    path.into_iter().collect()
}
