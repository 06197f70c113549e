//! # Budgeted A*
//!
//! Weighted best-first search over the 4- or 8-connected tile graph.
//!
//! ## Guarantees
//!
//! - **Optimal**: the heuristic is distance scaled by the cheapest possible
//!   step, so any path returned is a cheapest one.
//! - **Deterministic**: frontier entries with equal priority pop in the order
//!   they were discovered.
//! - **Bounded**: a search never expands more nodes than its budget. Running
//!   out of budget yields `NoPath`, never a worse path.
//! - **Resumable**: `PathSearch::step` advances by a fixed quota and keeps
//!   its frontier between calls, so a search can be spread over many ticks.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use llamaquest_procedural::{TilePos, MIN_TILE_COST};

use crate::profile::AgentProfile;
use crate::terrain::NavTerrain;

/// Which neighbours a tile has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// N, E, S, W.
    #[default]
    Four,
    /// Four plus diagonals. A diagonal step needs both orthogonal tiles it
    /// passes between to be enterable.
    Eight,
}

impl Connectivity {
    // Fixed order for determinism: N, E, S, W, then NE, SE, SW, NW.
    const STEPS: [(i32, i32); 8] = [
        (0, -1),
        (1, 0),
        (0, 1),
        (-1, 0),
        (1, -1),
        (1, 1),
        (-1, 1),
        (-1, -1),
    ];

    fn steps(self) -> &'static [(i32, i32)] {
        match self {
            Self::Four => &Self::STEPS[..4],
            Self::Eight => &Self::STEPS,
        }
    }

    /// Lower bound on the number of unit steps between two tiles, with
    /// diagonals weighted by sqrt(2).
    fn distance(self, a: TilePos, b: TilePos) -> f64 {
        let dx = (i64::from(a.x) - i64::from(b.x)).abs() as f64;
        let dy = (i64::from(a.y) - i64::from(b.y)).abs() as f64;
        match self {
            Self::Four => dx + dy,
            Self::Eight => dx.max(dy) + (std::f64::consts::SQRT_2 - 1.0) * dx.min(dy),
        }
    }
}

/// One path query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    /// Where the agent stands.
    pub start: TilePos,
    /// Where it wants to be.
    pub goal: TilePos,
    /// How the agent experiences terrain.
    pub profile: AgentProfile,
    /// Maximum node expansions before giving up.
    pub budget: usize,
    /// Neighbour rule.
    #[serde(default)]
    pub connectivity: Connectivity,
}

impl PathRequest {
    /// A 4-connected request.
    #[must_use]
    pub fn new(start: TilePos, goal: TilePos, profile: AgentProfile, budget: usize) -> Self {
        Self {
            start,
            goal,
            profile,
            budget,
            connectivity: Connectivity::Four,
        }
    }

    /// Same request with another neighbour rule.
    #[must_use]
    pub const fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }
}

/// A found route, start and goal inclusive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    tiles: Vec<TilePos>,
    cost: f64,
}

impl Path {
    /// Builds a path from its tiles and total cost.
    #[must_use]
    pub fn new(tiles: Vec<TilePos>, cost: f64) -> Self {
        Self { tiles, cost }
    }

    /// Tiles from start to goal.
    #[must_use]
    pub fn tiles(&self) -> &[TilePos] {
        &self.tiles
    }

    /// Sum of the step costs (the start tile is free).
    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.cost
    }

    /// Number of tiles, including both endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Never true for a path produced by a search.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// First tile.
    #[must_use]
    pub fn start(&self) -> Option<TilePos> {
        self.tiles.first().copied()
    }

    /// Last tile.
    #[must_use]
    pub fn goal(&self) -> Option<TilePos> {
        self.tiles.last().copied()
    }
}

/// Why a search produced no path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoPathReason {
    /// The reachable region was exhausted without meeting the goal.
    Unreachable,
    /// The expansion budget ran out first; a path may still exist.
    BudgetExhausted,
    /// Start or goal cannot be entered by this agent.
    BlockedEndpoint,
}

/// Final result of a search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathOutcome {
    /// A cheapest route.
    Found(Path),
    /// No route; an expected outcome, not an error.
    NoPath(NoPathReason),
}

impl PathOutcome {
    /// The path, if one was found.
    #[must_use]
    pub const fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) => Some(path),
            Self::NoPath(_) => None,
        }
    }

    /// Consumes the outcome, keeping the path.
    #[must_use]
    pub fn into_path(self) -> Option<Path> {
        match self {
            Self::Found(path) => Some(path),
            Self::NoPath(_) => None,
        }
    }

    /// Whether a path was found.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Progress report from `PathSearch::step`.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchStatus {
    /// Quota used up; call `step` again.
    InProgress,
    /// Finished.
    Done(PathOutcome),
    /// Abandoned through its `CancelToken`.
    Cancelled,
}

/// Shared flag for abandoning a search from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Acquire)
    }
}

#[derive(Debug)]
struct OpenNode {
    f: f64,
    g: f64,
    pos: TilePos,
    tie: u64,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the lowest f, then the earliest discovery.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.tie.cmp(&self.tie))
    }
}

#[derive(Clone, Copy, Debug)]
struct NodeRecord {
    g: f64,
    parent: Option<TilePos>,
    closed: bool,
}

/// A resumable A* search.
///
/// Owns its frontier and visited set; the terrain is borrowed per `step`
/// call, so abandoning a search leaves nothing behind.
///
/// ```
/// use llamaquest_pathfinding::{AgentProfile, GridTerrain, PathRequest, PathSearch, SearchStatus};
/// use llamaquest_procedural::{Biome, TilePos};
///
/// let grid = GridTerrain::new(8, 8, Biome::Village);
/// let request = PathRequest::new(TilePos::new(0, 0), TilePos::new(7, 7), AgentProfile::default(), 1000);
/// let mut search = PathSearch::new(request);
///
/// let outcome = loop {
///     match search.step(&grid, 4) {
///         SearchStatus::InProgress => continue,
///         SearchStatus::Done(outcome) => break outcome,
///         SearchStatus::Cancelled => unreachable!(),
///     }
/// };
/// assert_eq!(outcome.path().map(|p| p.cost()), Some(14.0));
/// ```
#[derive(Debug)]
pub struct PathSearch {
    request: PathRequest,
    heuristic_scale: f64,
    open: BinaryHeap<OpenNode>,
    nodes: HashMap<TilePos, NodeRecord>,
    next_tie: u64,
    expansions: usize,
    started: bool,
    outcome: Option<PathOutcome>,
    cancel: CancelToken,
}

impl PathSearch {
    /// Prepares a search; nothing is read until the first `step`.
    #[must_use]
    pub fn new(request: PathRequest) -> Self {
        Self::with_cancel(request, CancelToken::new())
    }

    /// Prepares a search that stops once `cancel` fires.
    #[must_use]
    pub fn with_cancel(request: PathRequest, cancel: CancelToken) -> Self {
        let heuristic_scale = f64::from(MIN_TILE_COST) * f64::from(request.profile.min_multiplier());
        Self {
            request,
            heuristic_scale,
            open: BinaryHeap::new(),
            nodes: HashMap::new(),
            next_tie: 0,
            expansions: 0,
            started: false,
            outcome: None,
            cancel,
        }
    }

    /// The request being served.
    #[must_use]
    pub const fn request(&self) -> &PathRequest {
        &self.request
    }

    /// A handle that cancels this search.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Nodes expanded so far.
    #[must_use]
    pub const fn expansions(&self) -> usize {
        self.expansions
    }

    /// Whether an outcome has been reached.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    fn heuristic(&self, pos: TilePos) -> f64 {
        self.request.connectivity.distance(pos, self.request.goal) * self.heuristic_scale
    }

    fn enter_cost<T: NavTerrain + ?Sized>(&self, terrain: &T, pos: TilePos) -> Option<f64> {
        let tile = terrain.nav_tile(pos)?;
        self.request.profile.step_cost(&tile).map(f64::from)
    }

    fn push(&mut self, pos: TilePos, g: f64) {
        let f = g + self.heuristic(pos);
        self.open.push(OpenNode {
            f,
            g,
            pos,
            tie: self.next_tie,
        });
        self.next_tie += 1;
    }

    fn finish(&mut self, outcome: PathOutcome) -> SearchStatus {
        trace!(
            expansions = self.expansions,
            found = outcome.is_found(),
            "path search finished"
        );
        self.outcome = Some(outcome.clone());
        SearchStatus::Done(outcome)
    }

    fn reconstruct(&self, goal: TilePos, cost: f64) -> Path {
        let mut tiles = vec![goal];
        let mut current = goal;
        while let Some(prev) = self.nodes.get(&current).and_then(|r| r.parent) {
            tiles.push(prev);
            current = prev;
        }
        tiles.reverse();
        Path::new(tiles, cost)
    }

    fn begin<T: NavTerrain + ?Sized>(&mut self, terrain: &T) -> Option<SearchStatus> {
        self.started = true;
        let PathRequest { start, goal, .. } = self.request;

        if self.enter_cost(terrain, start).is_none() || self.enter_cost(terrain, goal).is_none() {
            return Some(self.finish(PathOutcome::NoPath(NoPathReason::BlockedEndpoint)));
        }
        if start == goal {
            return Some(self.finish(PathOutcome::Found(Path::new(vec![start], 0.0))));
        }

        self.nodes.insert(
            start,
            NodeRecord {
                g: 0.0,
                parent: None,
                closed: false,
            },
        );
        self.push(start, 0.0);
        None
    }

    /// Advances the search by at most `quota` expansions.
    ///
    /// Once finished, further calls return the same outcome. Once cancelled,
    /// further calls return `Cancelled`.
    pub fn step<T: NavTerrain + ?Sized>(&mut self, terrain: &T, quota: usize) -> SearchStatus {
        if let Some(outcome) = &self.outcome {
            return SearchStatus::Done(outcome.clone());
        }
        if self.cancel.is_cancelled() {
            return SearchStatus::Cancelled;
        }
        if !self.started {
            if let Some(status) = self.begin(terrain) {
                return status;
            }
        }

        let goal = self.request.goal;
        let mut performed = 0usize;

        while performed < quota {
            if self.cancel.is_cancelled() {
                return SearchStatus::Cancelled;
            }
            let Some(node) = self.open.pop() else {
                return self.finish(PathOutcome::NoPath(NoPathReason::Unreachable));
            };

            let Some(record) = self.nodes.get_mut(&node.pos) else { continue };
            if record.closed || node.g > record.g {
                // Stale heap entry.
                continue;
            }
            if self.expansions >= self.request.budget {
                return self.finish(PathOutcome::NoPath(NoPathReason::BudgetExhausted));
            }
            record.closed = true;
            self.expansions += 1;
            performed += 1;

            if node.pos == goal {
                let path = self.reconstruct(goal, node.g);
                return self.finish(PathOutcome::Found(path));
            }

            self.expand(terrain, &node);
        }

        SearchStatus::InProgress
    }

    fn expand<T: NavTerrain + ?Sized>(&mut self, terrain: &T, node: &OpenNode) {
        for &(dx, dy) in self.request.connectivity.steps() {
            let Some(next) = node.pos.offset(dx, dy) else { continue };
            if self.nodes.get(&next).is_some_and(|r| r.closed) {
                continue;
            }
            let Some(step) = self.enter_cost(terrain, next) else { continue };

            let diagonal = dx != 0 && dy != 0;
            let weight = if diagonal {
                // No corner cutting past tiles this agent cannot enter.
                let side_a = node.pos.offset(dx, 0);
                let side_b = node.pos.offset(0, dy);
                let open = [side_a, side_b]
                    .into_iter()
                    .all(|side| side.and_then(|p| self.enter_cost(terrain, p)).is_some());
                if !open {
                    continue;
                }
                std::f64::consts::SQRT_2
            } else {
                1.0
            };

            let tentative = node.g + step * weight;
            match self.nodes.entry(next) {
                Entry::Occupied(mut entry) => {
                    let record = entry.get_mut();
                    if tentative >= record.g {
                        continue;
                    }
                    record.g = tentative;
                    record.parent = Some(node.pos);
                }
                Entry::Vacant(entry) => {
                    entry.insert(NodeRecord {
                        g: tentative,
                        parent: Some(node.pos),
                        closed: false,
                    });
                }
            }
            self.push(next, tentative);
        }
    }

    /// Runs the search to completion (or cancellation).
    pub fn run<T: NavTerrain + ?Sized>(&mut self, terrain: &T) -> SearchStatus {
        self.step(terrain, usize::MAX)
    }
}

/// One-shot search bounded by `request.budget`.
pub fn find_path<T: NavTerrain + ?Sized>(terrain: &T, request: &PathRequest) -> PathOutcome {
    match PathSearch::new(request.clone()).run(terrain) {
        SearchStatus::Done(outcome) => outcome,
        // A private token is never cancelled and an unbounded quota always finishes.
        SearchStatus::InProgress | SearchStatus::Cancelled => PathOutcome::NoPath(NoPathReason::Unreachable),
    }
}
