//! Artifact builder
//!
//! Turns an accepted plan and scene module into a bundle directory in the
//! [`GameStore`]. Two strategies exist:
//!
//! - **compose**: wraps a generated scene module in a runtime scaffold and
//!   ships it with the engine runtime
//! - **passthrough**: copies a preset bundle, swaps in a (possibly
//!   edited) scene source and ships the same engine runtime

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use gamestore::{GameMetadata, GameStore, INDEX_FILE, PLAN_FILE, PROGRAM_FILE, RUNTIME_FILE};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::domain::Plan;
use crate::error::{PipelineError, PipelineResult};
use crate::preset::Preset;
use crate::safety::composed_program_violations;

pub const MODULE_BEGIN: &str = "// BEGIN GENERATED_SCENE_MODULE";
pub const MODULE_END: &str = "// END GENERATED_SCENE_MODULE";

/// File extensions whose references are rewritten in passthrough bundles
const TEXT_EXTENSIONS: &[&str] = &["html", "js", "css", "json"];

static ASSET_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[^./\w-])(?:\./)?(?:src/)?/?assets/").expect("valid asset regex"));
static GAMES_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/games/[^/"'`\s]+/"#).expect("valid games-path regex"));
static SOCKET_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"wss?://[^/"'`\s]+(?:/[^"'`\s]*)?"#).expect("valid socket-url regex"));
static REMOTE_RUNTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(src\s*=\s*["'])(?:https?:)?//[^"'\s]*/phaser(?:\.min)?\.js(["'])"#).expect("valid runtime-src regex")
});

/// How a bundle was assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    Composed,
    Passthrough,
}

/// A bundle written to the store
#[derive(Debug, Clone)]
pub struct Artifact {
    pub job_id: String,
    pub dir: PathBuf,
    /// Location of the entry page relative to the server root
    pub url: String,
    pub strategy: BuildStrategy,
}

impl Artifact {
    fn new(job_id: &str, dir: PathBuf, strategy: BuildStrategy) -> Self {
        Self {
            job_id: job_id.to_string(),
            dir,
            url: format!("/games/{}/{}", job_id, INDEX_FILE),
            strategy,
        }
    }
}

/// Entry page for a composed bundle
pub fn index_html(title: &str) -> String {
    let title = title.replace(['<', '>'], "");
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{title}</title>
  <style>
    html, body {{ width: 100%; height: 100%; margin: 0; padding: 0; }}
    body {{ background: #01030b; color: #d9faff; font-family: system-ui, sans-serif; overflow: hidden; }}
    #game-root, #game-root canvas {{ width: 100%; height: 100%; display: block; }}
  </style>
</head>
<body>
  <div id="game-root"></div>
  <script src="./{runtime}"></script>
  <script src="./{program}"></script>
</body>
</html>
"#,
        title = title,
        runtime = RUNTIME_FILE,
        program = PROGRAM_FILE,
    )
}

/// Scene module wrapped in the module markers
fn wrap_module(scene_module: &str) -> String {
    format!("{}\n{}\n{}\n", MODULE_BEGIN, scene_module.trim(), MODULE_END)
}

/// Full program: inline plan, error overlay, scene module, game bootstrap and disposal hook
pub fn compose_program(plan_json: &str, scene_module: &str) -> String {
    format!(
        r#"(function () {{
  'use strict';
  const PLAN = {plan};
  if (!window.Phaser) throw new Error('Phaser runtime was not loaded.');

  function showRuntimeError(message) {{
    const root = document.getElementById('game-root');
    if (!root) return;
    const box = document.createElement('pre');
    box.textContent = 'Runtime Error\n' + String(message || 'Unknown error');
    box.style.cssText = 'color:#ffb3c1;background:#140812;border:1px solid #ff4d6d;padding:12px;margin:12px;white-space:pre-wrap';
    root.innerHTML = '';
    root.appendChild(box);
  }}
  window.addEventListener('error', function (event) {{
    showRuntimeError(event && event.message ? event.message : event);
  }});

{module}
  if (typeof createGeneratedScene !== 'function') {{
    throw new Error('Generated module must define createGeneratedScene(Phaser, PLAN).');
  }}

  const GeneratedScene = createGeneratedScene(Phaser, PLAN);
  const config = {{
    type: Phaser.CANVAS,
    width: 960,
    height: 600,
    parent: 'game-root',
    backgroundColor: '#030915',
    physics: {{
      default: 'arcade',
      arcade: {{ gravity: {{ y: Number((PLAN.physics_rules && PLAN.physics_rules.gravity) || 0) }}, debug: false }},
    }},
    scale: {{ mode: Phaser.Scale.RESIZE, autoCenter: Phaser.Scale.CENTER_BOTH }},
    fps: {{ target: 60, forceSetTimeOut: false }},
    scene: [GeneratedScene],
  }};

  let phaser = null;
  try {{
    phaser = new Phaser.Game(config);
  }} catch (error) {{
    showRuntimeError(error && error.message ? error.message : error);
  }}
  window.__gamegen_runtime__ = {{
    phaser,
    dispose() {{
      if (this.phaser) {{
        this.phaser.destroy(true);
        this.phaser = null;
      }}
    }},
  }};
}})();
"#,
        plan = plan_json,
        module = wrap_module(scene_module),
    )
}

/// Text between the module markers, if both are present and in order
pub fn extract_scene_module(program: &str) -> Option<String> {
    let start = program.find(MODULE_BEGIN)? + MODULE_BEGIN.len();
    let end = program.find(MODULE_END)?;
    if end < start {
        return None;
    }
    Some(program[start..end].trim().to_string())
}

/// Make a copied bundle self-contained
///
/// Asset paths become bundle-relative, absolute `/games/<id>/` prefixes are
/// dropped and socket endpoints point at the relay path. Remote engine
/// scripts load the runtime shipped next to the program.
pub fn rewrite_references(text: &str, relay_path: &str) -> String {
    let text = REMOTE_RUNTIME.replace_all(text, format!("${{1}}./{}${{2}}", RUNTIME_FILE).as_str());
    let text = GAMES_REF.replace_all(&text, "./");
    let text = ASSET_REF.replace_all(&text, "${1}./assets/");
    SOCKET_URL.replace_all(&text, regex::NoExpand(relay_path)).into_owned()
}

/// Writes bundles into a [`GameStore`]
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    store: GameStore,
    runtime_paths: Vec<PathBuf>,
    relay_path: String,
}

impl ArtifactBuilder {
    pub fn new(store: GameStore, runtime_paths: Vec<PathBuf>, relay_path: impl Into<String>) -> Self {
        Self {
            store,
            runtime_paths,
            relay_path: relay_path.into(),
        }
    }

    pub fn store(&self) -> &GameStore {
        &self.store
    }

    /// First configured runtime file that exists
    fn resolve_runtime(&self) -> PipelineResult<&Path> {
        self.runtime_paths
            .iter()
            .find(|p| p.is_file())
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                let tried: Vec<String> = self.runtime_paths.iter().map(|p| p.display().to_string()).collect();
                PipelineError::MissingDependency(format!(
                    "game engine runtime {} not found (tried: {})",
                    RUNTIME_FILE,
                    tried.join(", ")
                ))
            })
    }

    fn plan_text(plan: &Plan) -> PipelineResult<String> {
        plan.to_json_pretty()
            .map_err(|e| PipelineError::Store(format!("Failed to serialize plan: {}", e)))
    }

    /// Compose a generated scene module into a new bundle
    ///
    /// The program is validated and the runtime located before anything is
    /// written, so a rejected build leaves no directory behind.
    pub fn compose(&self, job_id: &str, plan: &Plan, scene_module: &str) -> PipelineResult<Artifact> {
        debug!(%job_id, module_len = scene_module.len(), "ArtifactBuilder::compose: called");
        let inline_plan = serde_json::to_string(plan)
            .map_err(|e| PipelineError::Store(format!("Failed to serialize plan: {}", e)))?;
        let program = compose_program(&inline_plan, scene_module);

        let violations = composed_program_violations(&program);
        if !violations.is_empty() {
            debug!(count = violations.len(), "ArtifactBuilder::compose: program rejected");
            return Err(PipelineError::ValidationFailed { violations });
        }
        let runtime = self.resolve_runtime()?;

        let dir = self.store.create_game_dir(job_id)?;
        self.store.write_text(job_id, INDEX_FILE, &index_html(&plan.title))?;
        self.store.write_text(job_id, PROGRAM_FILE, &program)?;
        fs::copy(runtime, dir.join(RUNTIME_FILE))?;
        self.store.write_text(job_id, PLAN_FILE, &Self::plan_text(plan)?)?;
        self.store
            .write_metadata(job_id, &GameMetadata::new(job_id, &plan.title))?;

        info!(%job_id, "Composed bundle written");
        Ok(Artifact::new(job_id, dir, BuildStrategy::Composed))
    }

    /// Copy a preset bundle and install `scene_module` as its program
    pub fn passthrough(&self, job_id: &str, plan: &Plan, preset: &Preset, scene_module: &str) -> PipelineResult<Artifact> {
        debug!(%job_id, preset = preset.name(), "ArtifactBuilder::passthrough: called");
        let bundle = preset.bundle_dir();
        if !bundle.is_dir() {
            return Err(PipelineError::MissingDependency(format!(
                "preset {} has no bundle at {}",
                preset.name(),
                bundle.display()
            )));
        }
        let runtime = self.resolve_runtime()?;

        let dir = self.store.create_game_dir(job_id)?;
        let copied = self.store.copy_tree(&bundle, job_id)?;
        let rewritten = self.rewrite_bundle(&dir)?;
        fs::copy(runtime, dir.join(RUNTIME_FILE))?;
        debug!(copied, rewritten, "ArtifactBuilder::passthrough: bundle copied");

        let program = rewrite_references(&wrap_module(scene_module), &self.relay_path);
        self.store.write_text(job_id, PROGRAM_FILE, &program)?;
        self.store.write_text(job_id, PLAN_FILE, &Self::plan_text(plan)?)?;
        self.store.write_metadata(
            job_id,
            &GameMetadata::new(job_id, &plan.title).with_preset(preset.name()),
        )?;

        info!(%job_id, preset = preset.name(), "Preset bundle written");
        Ok(Artifact::new(job_id, dir, BuildStrategy::Passthrough))
    }

    /// Rewrite references in every text file under `dir`, returning the number changed
    fn rewrite_bundle(&self, dir: &Path) -> PipelineResult<usize> {
        let mut changed = 0;
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| PipelineError::Store(e.to_string()))?;
            let is_text = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if !entry.file_type().is_file() || !is_text {
                continue;
            }
            let original = fs::read_to_string(entry.path())?;
            let updated = rewrite_references(&original, &self.relay_path);
            if updated != original {
                fs::write(entry.path(), updated)?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample_plan_value;
    use crate::generator::SCENE_MODULE;
    use crate::safety::scene_module_violations;
    use tempfile::TempDir;

    fn plan() -> Plan {
        Plan::from_value(sample_plan_value()).unwrap()
    }

    fn builder(temp: &TempDir, with_runtime: bool) -> ArtifactBuilder {
        let runtime = temp.path().join("vendor").join(RUNTIME_FILE);
        if with_runtime {
            fs::create_dir_all(runtime.parent().unwrap()).unwrap();
            fs::write(&runtime, "/* runtime */").unwrap();
        }
        let store = GameStore::open(temp.path().join("games")).unwrap();
        ArtifactBuilder::new(store, vec![temp.path().join("missing.js"), runtime], "./relay")
    }

    fn preset(temp: &TempDir) -> Preset {
        let root = temp.path().join("presets").join("2dShooter");
        fs::create_dir_all(root.join("bundle").join("assets")).unwrap();
        fs::write(
            root.join("bundle").join("index.html"),
            concat!(
                r#"<img src="src/assets/ship.png">"#,
                r#"<script src="https://cdn.jsdelivr.net/npm/phaser@3.80.1/dist/phaser.min.js"></script>"#,
                r#"<script src="/games/old123/game.js"></script>"#,
            ),
        )
        .unwrap();
        fs::write(root.join("bundle").join("assets").join("ship.png"), [0u8, 1, 2]).unwrap();
        Preset::new("2dShooter", "shooter", root)
    }

    #[test]
    fn test_index_html_strips_angle_brackets() {
        let html = index_html("<b>Rocks</b>");
        assert!(html.contains("<title>bRocks/b</title>"));
        assert!(html.contains("./phaser.min.js"));
    }

    #[test]
    fn test_compose_program_round_trips_module() {
        let program = compose_program("{}", SCENE_MODULE);
        assert!(composed_program_violations(&program).is_empty());
        assert_eq!(extract_scene_module(&program).unwrap(), SCENE_MODULE.trim());
    }

    #[test]
    fn test_extract_scene_module_needs_both_markers() {
        assert_eq!(extract_scene_module("no markers"), None);
        assert_eq!(extract_scene_module(&format!("{}\nx\n", MODULE_BEGIN)), None);
        assert_eq!(extract_scene_module(&format!("{}\n{}", MODULE_END, MODULE_BEGIN)), None);
    }

    #[test]
    fn test_rewrite_references() {
        assert_eq!(rewrite_references("'src/assets/a.png'", "./relay"), "'./assets/a.png'");
        assert_eq!(rewrite_references("url(/assets/a.png)", "./relay"), "url(./assets/a.png)");
        assert_eq!(rewrite_references("\"./assets/a.png\"", "./relay"), "\"./assets/a.png\"");
        assert_eq!(rewrite_references("lib/assets/a.png", "./relay"), "lib/assets/a.png");
        assert_eq!(rewrite_references("\"/games/abc/index.html\"", "./relay"), "\"./index.html\"");
        assert_eq!(
            rewrite_references("connect('ws://localhost:8000/ws/shooter')", "./relay"),
            "connect('./relay')"
        );
        assert_eq!(rewrite_references("wss://example.com", "./relay"), "./relay");
        assert_eq!(
            rewrite_references(r#"<script src="https://cdn.example.org/npm/phaser@3/dist/phaser.js"></script>"#, "./relay"),
            r#"<script src="./phaser.min.js"></script>"#
        );
        assert_eq!(
            rewrite_references("<script src='//cdn.example.org/phaser.min.js'>", "./relay"),
            "<script src='./phaser.min.js'>"
        );
    }

    #[test]
    fn test_compose_writes_bundle() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, true);
        let artifact = builder.compose("job1", &plan(), SCENE_MODULE).unwrap();

        assert_eq!(artifact.url, "/games/job1/index.html");
        assert_eq!(artifact.strategy, BuildStrategy::Composed);
        for file in [INDEX_FILE, PROGRAM_FILE, RUNTIME_FILE, PLAN_FILE, "metadata.json"] {
            assert!(artifact.dir.join(file).is_file(), "missing {}", file);
        }

        let meta = builder.store().read_metadata("job1").unwrap().unwrap();
        assert_eq!(meta.slug, "arcade-survival");
        assert_eq!(meta.preset, None);
        let stored: Plan = builder.store().read_plan("job1").unwrap();
        assert_eq!(stored, plan());
    }

    #[test]
    fn test_compose_rejects_forbidden_module_without_writing() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, true);
        let module = format!("{}\nnew WebSocket('x');", SCENE_MODULE);
        let err = builder.compose("job2", &plan(), &module).unwrap_err();
        match err {
            PipelineError::ValidationFailed { violations } => {
                assert_eq!(violations, vec!["forbidden: WebSocket".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!builder.store().exists("job2"));
    }

    #[test]
    fn test_compose_missing_runtime() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, false);
        let err = builder.compose("job3", &plan(), SCENE_MODULE).unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency(_)));
        assert!(!builder.store().exists("job3"));
    }

    #[test]
    fn test_compose_same_id_twice_fails() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, true);
        builder.compose("job4", &plan(), SCENE_MODULE).unwrap();
        assert!(matches!(
            builder.compose("job4", &plan(), SCENE_MODULE),
            Err(PipelineError::Store(_))
        ));
    }

    #[test]
    fn test_passthrough_copies_and_rewrites() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, true);
        let preset = preset(&temp);
        let module = "class GameScene { connect() { return 'ws://localhost:8000/ws'; } }";

        let artifact = builder.passthrough("job5", &plan(), &preset, module).unwrap();
        assert_eq!(artifact.strategy, BuildStrategy::Passthrough);
        assert!(artifact.dir.join("assets").join("ship.png").is_file());

        let html = fs::read_to_string(artifact.dir.join(INDEX_FILE)).unwrap();
        assert!(html.contains(r#"src="./assets/ship.png""#));
        assert!(html.contains(r#"src="./game.js""#));
        assert!(html.contains(r#"src="./phaser.min.js""#));
        assert!(!html.contains("https://"));
        assert!(artifact.dir.join(RUNTIME_FILE).is_file());

        let program = builder.store().read_program("job5").unwrap();
        assert!(program.contains("'./relay'"));
        assert_eq!(
            extract_scene_module(&program).unwrap(),
            "class GameScene { connect() { return './relay'; } }"
        );

        let meta = builder.store().read_metadata("job5").unwrap().unwrap();
        assert_eq!(meta.preset.as_deref(), Some("2dShooter"));
        assert!(meta.is_lineage_eligible("2dShooter"));

        // The preset itself is untouched
        let original = fs::read_to_string(preset.bundle_dir().join(INDEX_FILE)).unwrap();
        assert!(original.contains("src/assets/ship.png"));
    }

    #[test]
    fn test_passthrough_missing_bundle() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, false);
        let preset = Preset::new("ghost", "ghost", temp.path().join("nope"));
        let err = builder.passthrough("job6", &plan(), &preset, "x").unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency(_)));
    }

    #[test]
    fn test_passthrough_missing_runtime_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let builder = builder(&temp, false);
        let preset = preset(&temp);
        let err = builder.passthrough("job7", &plan(), &preset, "class GameScene {}").unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency(_)));
        assert!(!builder.store().exists("job7"));
    }

    #[test]
    fn test_deterministic_module_composes_cleanly() {
        assert!(scene_module_violations(SCENE_MODULE).is_empty());
        let program = compose_program("{}", SCENE_MODULE);
        assert!(program.contains("window.__gamegen_runtime__"));
    }
}
