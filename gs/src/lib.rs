//! GameStore - on-disk artifact store for generated games
//!
//! Every successful generation job produces one bundle directory keyed by
//! its job id. Bundles are append-only: a "modify" job writes a new
//! directory and records where it came from in `metadata.json`.
//!
//! # Architecture
//!
//! ```text
//! games/
//! └── {job_id}/
//!     ├── index.html       # page that boots the program
//!     ├── game.js          # composed program
//!     ├── plan.json        # accepted plan document
//!     ├── metadata.json    # job_id, slug, title, lineage flags
//!     └── phaser.min.js | assets/...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gamestore::{GameMetadata, GameStore};
//!
//! let store = GameStore::open("games")?;
//! store.create_game_dir(&job_id)?;
//! store.write_metadata(&job_id, &GameMetadata::new(&job_id, "Arcade Survival"))?;
//! let base = store.latest_lineage_eligible("2dShooter")?;
//! ```

mod metadata;
mod store;

pub use metadata::{GameMetadata, slugify};
pub use store::{GameStore, is_valid_game_id};

/// Page that boots the bundle
pub const INDEX_FILE: &str = "index.html";

/// Composed program
pub const PROGRAM_FILE: &str = "game.js";

/// Accepted plan document
pub const PLAN_FILE: &str = "plan.json";

/// Lineage metadata record
pub const METADATA_FILE: &str = "metadata.json";

/// Game engine runtime copied next to composed programs
pub const RUNTIME_FILE: &str = "phaser.min.js";

/// Asset directory shipped with preset bundles
pub const ASSETS_DIR: &str = "assets";
