/// Resolves a `task(model: ...)` hint against `TASK_SUBAGENT_MODEL_<UPPER>`
/// environment variables. Returns `(resolved_model, model_applied)`: when no
/// mapping exists the hint is dropped rather than passed through verbatim,
/// so an unconfigured alias never silently becomes a literal model name.
pub fn resolve_model_hint(hint: Option<&str>) -> (Option<String>, bool) {
    let Some(hint) = hint else { return (None, false) };
    let var = format!("TASK_SUBAGENT_MODEL_{}", hint.to_uppercase());
    match std::env::var(&var) {
        Ok(resolved) => (Some(resolved), true),
        Err(_) => (None, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hint_is_not_applied() {
        assert_eq!(resolve_model_hint(None), (None, false));
    }

    #[test]
    fn unmapped_hint_is_dropped() {
        assert_eq!(resolve_model_hint(Some("nonexistent-alias-xyz")), (None, false));
    }

    #[test]
    fn mapped_hint_resolves_via_env() {
        std::env::set_var("TASK_SUBAGENT_MODEL_SONNET", "claude-sonnet-test");
        assert_eq!(resolve_model_hint(Some("sonnet")), (Some("claude-sonnet-test".to_string()), true));
        std::env::remove_var("TASK_SUBAGENT_MODEL_SONNET");
    }
}
