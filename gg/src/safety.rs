//! Static safety checks for generated programs
//!
//! Generated code is never executed here. Checks are textual: a forbidden
//! primitive list, required structural markers, and an optional
//! `node --check` syntax pass.

use std::io::Write;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::GenerationConfig;

/// Network, dynamic-evaluation and legacy engine primitives a bundle must not use
static FORBIDDEN: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("fetch(", r"\bfetch\s*\("),
        ("XMLHttpRequest", r"\bXMLHttpRequest\b"),
        ("WebSocket", r"\bWebSocket\b"),
        ("EventSource", r"\bEventSource\b"),
        ("importScripts", r"\bimportScripts\b"),
        ("eval(", r"\beval\s*\("),
        ("new Function", r"\bnew\s+Function\b"),
        ("Phaser.State", r"\bPhaser\.State\b"),
        ("bitmapData", r"\bbitmapData\b"),
        ("addBitmapData", r"\baddBitmapData\b"),
        ("Phaser.Timer.SECOND", r"\bPhaser\.Timer\.SECOND\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("valid forbidden-primitive regex")))
    .collect()
});

/// Markers every scene module must contain
const SCENE_MARKERS: &[&str] = &["function createGeneratedScene", "extends Phaser.Scene", "create(", "update("];

/// Markers every composed program must contain on top of the forbidden check
const PROGRAM_MARKERS: &[&str] = &["new Phaser.Game", "game-root", "window.__gamegen_runtime__", "dispose("];

/// Forbidden primitives found in `code`, as `forbidden: <label>` descriptors
pub fn forbidden_violations(code: &str) -> Vec<String> {
    FORBIDDEN
        .iter()
        .filter(|(_, re)| re.is_match(code))
        .map(|(label, _)| format!("forbidden: {}", label))
        .collect()
}

/// Violations of the scene module contract
///
/// Covers forbidden primitives and required markers. Syntax is checked
/// separately through [`SyntaxChecker`].
pub fn scene_module_violations(code: &str) -> Vec<String> {
    debug!(len = code.len(), "scene_module_violations: called");
    let mut violations = forbidden_violations(code);
    for marker in SCENE_MARKERS {
        if !code.contains(marker) {
            violations.push(format!("missing: {}", marker));
        }
    }
    if !code.contains("class ") {
        violations.push("missing: scene class".to_string());
    }
    violations
}

/// Violations of the composed program contract
pub fn composed_program_violations(program: &str) -> Vec<String> {
    debug!(len = program.len(), "composed_program_violations: called");
    let mut violations = forbidden_violations(program);
    for marker in PROGRAM_MARKERS {
        if !program.contains(marker) {
            violations.push(format!("missing: {}", marker));
        }
    }
    violations
}

/// Outcome of a syntax check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxReport {
    Passed,
    /// Checker output describing the error
    Failed(String),
    /// No checker installed, or checking disabled
    Skipped,
}

impl SyntaxReport {
    /// Violation descriptor for repair loops, if the check failed
    pub fn violation(&self) -> Option<String> {
        match self {
            Self::Failed(detail) => Some(format!("syntax: {}", detail)),
            _ => None,
        }
    }
}

const CHECK_TIMEOUT: Duration = Duration::from_millis(15_000);
const DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `node --check` against generated JavaScript when node is installed
#[derive(Debug, Clone)]
pub struct SyntaxChecker {
    node: Option<String>,
    timeout: Duration,
}

impl SyntaxChecker {
    /// Look for `node` on PATH
    pub async fn detect() -> Self {
        debug!("SyntaxChecker::detect: called");
        let version = tokio::process::Command::new("node")
            .arg("--version")
            .kill_on_drop(true)
            .output();
        let available = matches!(
            tokio::time::timeout(DETECT_TIMEOUT, version).await,
            Ok(Ok(output)) if output.status.success()
        );
        if available {
            debug!("SyntaxChecker::detect: node available");
        } else {
            debug!("SyntaxChecker::detect: node not available, syntax checks will be skipped");
        }
        Self {
            node: available.then(|| "node".to_string()),
            timeout: CHECK_TIMEOUT,
        }
    }

    /// Checker for the configured generation settings
    pub async fn from_config(config: &GenerationConfig) -> Self {
        if !config.syntax_check {
            return Self::disabled();
        }
        Self::detect()
            .await
            .with_timeout(Duration::from_millis(config.syntax_check_timeout_ms))
    }

    /// A checker that always reports `Skipped`
    pub fn disabled() -> Self {
        Self {
            node: None,
            timeout: CHECK_TIMEOUT,
        }
    }

    /// Same checker with a different per-check time limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.node.is_some()
    }

    /// Check a scene module, wrapped so the factory must be defined
    pub async fn check_scene_module(&self, code: &str) -> SyntaxReport {
        let wrapped = format!(
            "(function () {{\n{}\nif (typeof createGeneratedScene !== 'function') {{\n  throw new Error('createGeneratedScene missing');\n}}\n}})();\n",
            code
        );
        self.check(&wrapped).await
    }

    /// Check a complete program as-is
    pub async fn check(&self, source: &str) -> SyntaxReport {
        let Some(node) = self.node.as_deref() else {
            return SyntaxReport::Skipped;
        };
        debug!(len = source.len(), "SyntaxChecker::check: called");

        let file = match tempfile::Builder::new().prefix("gamegen-").suffix(".js").tempfile() {
            Ok(mut file) => match file.write_all(source.as_bytes()) {
                Ok(()) => file,
                Err(e) => {
                    warn!(error = %e, "Failed to write syntax check file, skipping");
                    return SyntaxReport::Skipped;
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to create syntax check file, skipping");
                return SyntaxReport::Skipped;
            }
        };

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(node)
                .arg("--check")
                .arg(file.path())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                debug!("SyntaxChecker::check: passed");
                SyntaxReport::Passed
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let detail = if stderr.trim().is_empty() { stdout } else { stderr };
                debug!("SyntaxChecker::check: failed");
                SyntaxReport::Failed(detail.trim().to_string())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Syntax checker failed to run, skipping");
                SyntaxReport::Skipped
            }
            Err(_) => {
                warn!("Syntax checker timed out, skipping");
                SyntaxReport::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_MODULE: &str = r#"
function createGeneratedScene(Phaser, PLAN) {
  return class GeneratedScene extends Phaser.Scene {
    constructor() { super("generated"); }
    create() { this.score = 0; }
    update() { this.score += 1; }
  };
}
"#;

    #[test]
    fn test_clean_module_has_no_violations() {
        assert!(scene_module_violations(CLEAN_MODULE).is_empty());
    }

    #[test]
    fn test_fetch_is_always_reported() {
        let code = format!("{}\nfetch('https://example.com');", CLEAN_MODULE);
        let violations = scene_module_violations(&code);
        assert_eq!(violations, vec!["forbidden: fetch(".to_string()]);

        // Spacing before the paren does not hide it
        assert!(!forbidden_violations("fetch   ('x')").is_empty());
    }

    #[test]
    fn test_word_boundaries() {
        // Identifiers that merely contain a forbidden word are fine
        assert!(forbidden_violations("const prefetch = 1; myeval(2);").is_empty());
        assert_eq!(forbidden_violations("new   Function('x')"), vec!["forbidden: new Function"]);
    }

    #[test]
    fn test_legacy_engine_apis_reported() {
        let violations = forbidden_violations("game.add.bitmapData(1, 1); Phaser.Timer.SECOND; Phaser.State");
        assert!(violations.contains(&"forbidden: bitmapData".to_string()));
        assert!(violations.contains(&"forbidden: Phaser.Timer.SECOND".to_string()));
        assert!(violations.contains(&"forbidden: Phaser.State".to_string()));
    }

    #[test]
    fn test_missing_markers() {
        let violations = scene_module_violations("const x = 1;");
        assert!(violations.contains(&"missing: function createGeneratedScene".to_string()));
        assert!(violations.contains(&"missing: extends Phaser.Scene".to_string()));
        assert!(violations.contains(&"missing: update(".to_string()));
        assert!(violations.contains(&"missing: scene class".to_string()));
    }

    #[test]
    fn test_composed_program_markers() {
        let violations = composed_program_violations("const game = 1;");
        assert_eq!(violations.len(), PROGRAM_MARKERS.len());

        let program = "const g = new Phaser.Game({parent: 'game-root'}); window.__gamegen_runtime__ = { dispose() {} };";
        assert!(composed_program_violations(program).is_empty());
    }

    #[test]
    fn test_syntax_report_violation() {
        assert_eq!(SyntaxReport::Passed.violation(), None);
        assert_eq!(SyntaxReport::Skipped.violation(), None);
        assert_eq!(
            SyntaxReport::Failed("Unexpected token".to_string()).violation(),
            Some("syntax: Unexpected token".to_string())
        );
    }

    #[tokio::test]
    async fn test_disabled_checker_skips() {
        let checker = SyntaxChecker::disabled();
        assert!(!checker.is_available());
        assert_eq!(checker.check("this is not javascript {{{").await, SyntaxReport::Skipped);

        let config = GenerationConfig {
            syntax_check: false,
            ..GenerationConfig::default()
        };
        assert!(!SyntaxChecker::from_config(&config).await.is_available());
    }

    #[tokio::test]
    async fn test_detected_checker_when_node_installed() {
        let checker = SyntaxChecker::detect().await;
        if !checker.is_available() {
            return;
        }
        assert_eq!(checker.check_scene_module(CLEAN_MODULE).await, SyntaxReport::Passed);
        assert!(matches!(
            checker.check("function broken( {").await,
            SyntaxReport::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_timed_out_check_is_skipped() {
        if !SyntaxChecker::detect().await.is_available() {
            return;
        }
        let config = GenerationConfig {
            syntax_check_timeout_ms: 0,
            ..GenerationConfig::default()
        };
        let checker = SyntaxChecker::from_config(&config).await;
        assert_eq!(checker.check(CLEAN_MODULE).await, SyntaxReport::Skipped);
    }
}
