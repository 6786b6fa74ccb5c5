//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// New or modified plan generation
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Plan repair after validation failures
pub const PLAN_REPAIR: &str = include_str!("../../prompts/plan-repair.pmt");

/// Scene module generation
pub const CODE: &str = include_str!("../../prompts/code.pmt");

/// Scene module repair after safety/syntax failures
pub const CODE_REPAIR: &str = include_str!("../../prompts/code-repair.pmt");

/// Edit of an existing scene source
pub const EDIT: &str = include_str!("../../prompts/edit.pmt");

/// Repair of a rejected source edit
pub const EDIT_REPAIR: &str = include_str!("../../prompts/edit-repair.pmt");

/// Shared system prompt
pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "plan" => Some(PLAN),
        "plan-repair" => Some(PLAN_REPAIR),
        "code" => Some(CODE),
        "code-repair" => Some(CODE_REPAIR),
        "edit" => Some(EDIT),
        "edit-repair" => Some(EDIT_REPAIR),
        "system" => Some(SYSTEM),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_templates_embedded() {
        for name in ["plan", "plan-repair", "code", "code-repair", "edit", "edit-repair", "system"] {
            let template = get_embedded(name).unwrap();
            assert!(!template.trim().is_empty(), "{} is empty", name);
        }
    }

    #[test]
    fn test_code_prompt_mentions_contract() {
        assert!(CODE.contains("createGeneratedScene"));
        assert!(CODE.contains("Phaser.Scene"));
    }

    #[test]
    fn test_plan_repair_mentions_violations() {
        assert!(PLAN_REPAIR.contains("{{#each violations}}"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
