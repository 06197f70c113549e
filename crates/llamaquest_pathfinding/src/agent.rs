//! # Agents
//!
//! An agent is a position, a movement profile and at most one plan. Plans
//! are followed tile by tile; the moment the next tile cannot be entered the
//! plan is flagged stale and the owner must search again. A stale plan is
//! never patched in place.

use std::fmt;

use serde::{Deserialize, Serialize};

use llamaquest_procedural::TilePos;

use crate::profile::AgentProfile;
use crate::search::Path;
use crate::terrain::NavTerrain;

/// Agent identifier, unique within one world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Result of one `Agent::step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Moved one tile along the plan.
    Moved(TilePos),
    /// Moved onto the plan's goal; the plan is done.
    Arrived(TilePos),
    /// The plan is stale; a fresh search is required.
    Replan,
    /// No plan to follow.
    Idle,
}

/// A non-player agent.
#[derive(Clone, Debug)]
pub struct Agent {
    id: AgentId,
    position: TilePos,
    profile: AgentProfile,
    plan: Option<Path>,
    cursor: usize,
    stale: bool,
}

impl Agent {
    /// Creates an idle agent.
    #[must_use]
    pub const fn new(id: AgentId, position: TilePos, profile: AgentProfile) -> Self {
        Self {
            id,
            position,
            profile,
            plan: None,
            cursor: 0,
            stale: false,
        }
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Current tile.
    #[must_use]
    pub const fn position(&self) -> TilePos {
        self.position
    }

    /// Movement profile.
    #[must_use]
    pub const fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Current plan, stale or not.
    #[must_use]
    pub const fn plan(&self) -> Option<&Path> {
        self.plan.as_ref()
    }

    /// Index of the current tile within the plan.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the plan was invalidated.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    /// Holds a plan that is still being followed.
    #[must_use]
    pub const fn has_active_plan(&self) -> bool {
        self.plan.is_some() && !self.stale
    }

    /// Adopts a plan.
    ///
    /// A plan that does not start on the agent's tile is rejected and the
    /// agent is left idle; returns whether the plan was adopted.
    pub fn set_plan(&mut self, path: Path) -> bool {
        self.cursor = 0;
        self.stale = false;
        if path.start() == Some(self.position) && path.len() > 1 {
            self.plan = Some(path);
            true
        } else {
            self.plan = None;
            false
        }
    }

    /// Drops the plan.
    pub fn clear_plan(&mut self) {
        self.plan = None;
        self.cursor = 0;
        self.stale = false;
    }

    /// Flags the plan stale.
    pub fn invalidate(&mut self) {
        if self.plan.is_some() {
            self.stale = true;
        }
    }

    /// Tiles still ahead of the agent.
    #[must_use]
    pub fn remaining(&self) -> &[TilePos] {
        self.plan
            .as_ref()
            .and_then(|p| p.tiles().get(self.cursor + 1..))
            .unwrap_or(&[])
    }

    /// Next tile of the plan.
    #[must_use]
    pub fn next_tile(&self) -> Option<TilePos> {
        self.remaining().first().copied()
    }

    /// Re-checks every tile ahead; flags the plan stale if any is blocked.
    ///
    /// Returns whether the plan is still usable.
    pub fn validate_plan<T: NavTerrain + ?Sized>(&mut self, terrain: &T) -> bool {
        if !self.has_active_plan() {
            return false;
        }
        let blocked = self.remaining().iter().any(|pos| {
            terrain
                .nav_tile(*pos)
                .and_then(|tile| self.profile.step_cost(&tile))
                .is_none()
        });
        if blocked {
            self.stale = true;
        }
        !blocked
    }

    /// Moves one tile along the plan.
    pub fn step<T: NavTerrain + ?Sized>(&mut self, terrain: &T) -> StepOutcome {
        if self.stale {
            return StepOutcome::Replan;
        }
        let Some(next) = self.next_tile() else {
            self.clear_plan();
            return StepOutcome::Idle;
        };

        let enterable = terrain
            .nav_tile(next)
            .and_then(|tile| self.profile.step_cost(&tile))
            .is_some();
        if !enterable {
            self.stale = true;
            return StepOutcome::Replan;
        }

        self.position = next;
        self.cursor += 1;
        if self.next_tile().is_none() {
            self.clear_plan();
            StepOutcome::Arrived(next)
        } else {
            StepOutcome::Moved(next)
        }
    }
}
