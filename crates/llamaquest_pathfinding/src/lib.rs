//! # LlamaQuest Pathfinding
//!
//! Route planning for non-player agents over the generated tile graph.
//!
//! ## Design Principles
//!
//! 1. **Optimal within budget**: a returned path is always a cheapest one
//! 2. **Bounded**: every search carries a node-expansion budget, never a clock
//! 3. **Resumable**: searches can be advanced a few expansions per tick
//! 4. **Read-only**: terrain is reached through the `NavTerrain` capability
//!
//! ## Example
//!
//! ```rust
//! use llamaquest_pathfinding::{find_path, AgentProfile, GridTerrain, PathRequest};
//! use llamaquest_procedural::{Biome, TilePos};
//!
//! let grid = GridTerrain::new(10, 10, Biome::Village);
//! let request = PathRequest::new(TilePos::new(0, 0), TilePos::new(9, 0), AgentProfile::default(), 500);
//! let path = find_path(&grid, &request).into_path().expect("open grid");
//! assert_eq!(path.cost(), 9.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod agent;
pub mod profile;
pub mod search;
pub mod sight;
pub mod terrain;

pub use agent::{Agent, AgentId, StepOutcome};
pub use profile::AgentProfile;
pub use search::{
    find_path, CancelToken, Connectivity, NoPathReason, Path, PathOutcome, PathRequest, PathSearch,
    SearchStatus,
};
pub use sight::{visible_tiles, MAX_SIGHT_RADIUS};
pub use terrain::{GridTerrain, NavTerrain, NavTile};
