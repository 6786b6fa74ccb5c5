//! Core GameStore implementation

use eyre::{Context, Result, eyre};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metadata::GameMetadata;
use crate::{METADATA_FILE, PLAN_FILE, PROGRAM_FILE};

/// Whether `id` is usable as a directory name under the games root
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so that an id can never
/// escape the root.
pub fn is_valid_game_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The main game store
#[derive(Debug, Clone)]
pub struct GameStore {
    /// Games root directory
    root: PathBuf,
}

impl GameStore {
    /// Open or create a game store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create games root directory")?;
        debug!(?root, "Opened game store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a game id (may not exist)
    pub fn game_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Whether a bundle directory exists for `id`
    pub fn exists(&self, id: &str) -> bool {
        is_valid_game_id(id) && self.game_dir(id).is_dir()
    }

    /// Whether `id` names a complete artifact (its plan was written)
    pub fn has_plan(&self, id: &str) -> bool {
        debug!(%id, "has_plan: called");
        is_valid_game_id(id) && self.game_dir(id).join(PLAN_FILE).is_file()
    }

    /// Create the bundle directory for a new artifact
    ///
    /// Artifacts are append-only, so an existing directory is an error.
    pub fn create_game_dir(&self, id: &str) -> Result<PathBuf> {
        debug!(%id, "create_game_dir: called");
        self.check_id(id)?;
        let dir = self.game_dir(id);
        if dir.exists() {
            return Err(eyre!("Game directory already exists: {}", dir.display()));
        }
        fs::create_dir_all(&dir).context(format!("Failed to create game directory: {}", dir.display()))?;
        info!(%id, "Created game directory");
        Ok(dir)
    }

    /// Write a text file inside a game directory
    pub fn write_text(&self, id: &str, file: &str, content: &str) -> Result<()> {
        debug!(%id, %file, len = content.len(), "write_text: called");
        self.check_id(id)?;
        let path = self.game_dir(id).join(file);
        fs::write(&path, content).context(format!("Failed to write {}", path.display()))
    }

    /// Write a value as pretty JSON inside a game directory
    pub fn write_json<T: Serialize>(&self, id: &str, file: &str, value: &T) -> Result<()> {
        debug!(%id, %file, "write_json: called");
        let content = serde_json::to_string_pretty(value)?;
        self.write_text(id, file, &content)
    }

    /// Read a text file from a game directory
    pub fn read_text(&self, id: &str, file: &str) -> Result<String> {
        debug!(%id, %file, "read_text: called");
        self.check_id(id)?;
        let path = self.game_dir(id).join(file);
        fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))
    }

    /// Read and deserialize the plan document of an artifact
    pub fn read_plan<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        debug!(%id, "read_plan: called");
        let content = self.read_text(id, PLAN_FILE)?;
        serde_json::from_str(&content).context(format!("Invalid plan document for game {}", id))
    }

    /// Read the composed program of an artifact
    pub fn read_program(&self, id: &str) -> Result<String> {
        debug!(%id, "read_program: called");
        self.read_text(id, PROGRAM_FILE)
    }

    /// Read the metadata record of an artifact, if it has one
    pub fn read_metadata(&self, id: &str) -> Result<Option<GameMetadata>> {
        debug!(%id, "read_metadata: called");
        self.check_id(id)?;
        let path = self.game_dir(id).join(METADATA_FILE);
        if !path.is_file() {
            debug!(?path, "read_metadata: no metadata file");
            return Ok(None);
        }
        let content = fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
        let meta = serde_json::from_str(&content).context(format!("Invalid metadata for game {}", id))?;
        Ok(Some(meta))
    }

    /// Write the metadata record of an artifact
    pub fn write_metadata(&self, id: &str, meta: &GameMetadata) -> Result<()> {
        debug!(%id, slug = %meta.slug, "write_metadata: called");
        self.write_json(id, METADATA_FILE, meta)
    }

    /// Apply `update` to an existing metadata record and write it back
    ///
    /// Fields the closure leaves alone (the slug in particular) are kept.
    pub fn update_metadata<F>(&self, id: &str, update: F) -> Result<GameMetadata>
    where
        F: FnOnce(&mut GameMetadata),
    {
        debug!(%id, "update_metadata: called");
        let mut meta = self
            .read_metadata(id)?
            .ok_or_else(|| eyre!("No metadata to update for game {}", id))?;
        update(&mut meta);
        self.write_metadata(id, &meta)?;
        Ok(meta)
    }

    /// Whether the artifact may serve as the base of a modify job
    pub fn is_lineage_eligible(&self, id: &str, preset: &str) -> bool {
        debug!(%id, %preset, "is_lineage_eligible: called");
        match self.read_metadata(id) {
            Ok(Some(meta)) => meta.is_lineage_eligible(preset),
            Ok(None) => {
                debug!(%id, "is_lineage_eligible: no metadata");
                false
            }
            Err(e) => {
                warn!(%id, error = %e, "is_lineage_eligible: unreadable metadata");
                false
            }
        }
    }

    /// Most recently written lineage-eligible artifact
    ///
    /// Recency is the modification time of `metadata.json`. Artifacts being
    /// written concurrently may or may not be seen.
    pub fn latest_lineage_eligible(&self, preset: &str) -> Result<Option<String>> {
        debug!(%preset, "latest_lineage_eligible: called");
        let mut best: Option<(SystemTime, String)> = None;

        for id in self.list_games()? {
            if !self.has_plan(&id) || !self.is_lineage_eligible(&id, preset) {
                continue;
            }
            let path = self.game_dir(&id).join(METADATA_FILE);
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%id, error = %e, "latest_lineage_eligible: cannot stat metadata");
                    continue;
                }
            };
            let newer = match &best {
                Some((t, best_id)) => modified > *t || (modified == *t && id > *best_id),
                None => true,
            };
            if newer {
                best = Some((modified, id));
            }
        }

        let latest = best.map(|(_, id)| id);
        debug!(?latest, "latest_lineage_eligible: done");
        Ok(latest)
    }

    /// List all game ids, sorted
    pub fn list_games(&self) -> Result<Vec<String>> {
        let mut games = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().is_dir()
                && let Some(name) = entry.file_name().to_str()
                && is_valid_game_id(name)
            {
                games.push(name.to_string());
            }
        }
        games.sort();
        Ok(games)
    }

    /// Recursively copy `src` into the game directory, returning the file count
    pub fn copy_tree(&self, src: &Path, id: &str) -> Result<usize> {
        debug!(?src, %id, "copy_tree: called");
        self.check_id(id)?;
        let dest_root = self.game_dir(id);
        let mut copied = 0usize;

        for entry in WalkDir::new(src) {
            let entry = entry.context(format!("Failed to walk {}", src.display()))?;
            let rel = entry.path().strip_prefix(src)?;
            let dest = dest_root.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &dest).context(format!("Failed to copy {}", entry.path().display()))?;
                copied += 1;
            }
        }

        info!(%id, copied, "Copied bundle tree");
        Ok(copied)
    }

    fn check_id(&self, id: &str) -> Result<()> {
        if is_valid_game_id(id) {
            Ok(())
        } else {
            Err(eyre!("Invalid game id: {:?}", id))
        }
    }
}
