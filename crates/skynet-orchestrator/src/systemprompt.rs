//! Phase 3: build the system prompt for a turn.
//!
//! Three modes, in priority order: a workspace/session-supplied full
//! custom prompt wins outright; otherwise an agent definition's own
//! prompt is used verbatim; otherwise a fragment is appended to the
//! vault's `CLAUDE.md` — cwd framing, any context files, and a
//! `<prior_conversation>` block reconstructed from a non-SDK-resumable
//! session's history. Token counts are estimated at 4 characters per
//! token, matching the rough ratio the SDK's own context-window warnings
//! use — good enough to size a truncation budget, not meant to match a
//! real tokenizer exactly.

const CHARS_PER_TOKEN: usize = 4;

/// How a turn's system prompt is assembled.
pub enum SystemPromptSource<'a> {
    /// A full override that replaces the fragment-building path entirely.
    FullCustom(&'a str),
    /// An agent definition's own prompt, also used verbatim.
    AgentOwn(&'a str),
    /// Build the standard fragment around `CLAUDE.md`.
    Fragment,
}

/// A named context file to splice into the fragment (e.g. a workspace's
/// `AGENTS.md`, `USER.md`).
pub struct ContextFile<'a> {
    pub name: &'a str,
    pub content: &'a str,
}

pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Build the complete system prompt text for a turn.
pub fn build_system_prompt(
    source: SystemPromptSource<'_>,
    cwd: &str,
    claude_md: Option<&str>,
    context_files: &[ContextFile<'_>],
    prior_conversation: Option<&str>,
) -> String {
    match source {
        SystemPromptSource::FullCustom(prompt) => prompt.to_string(),
        SystemPromptSource::AgentOwn(prompt) => prompt.to_string(),
        SystemPromptSource::Fragment => {
            let mut out = String::new();
            if let Some(md) = claude_md {
                out.push_str(md);
                out.push_str("\n\n");
            }
            out.push_str(&format!("Your current working directory is `{cwd}`.\n"));
            for file in context_files {
                out.push_str(&format!("\n---\n\n## {}\n\n{}\n", file.name, file.content));
            }
            if let Some(prior) = prior_conversation {
                if !prior.is_empty() {
                    out.push_str("\n\n<prior_conversation>\n");
                    out.push_str(prior);
                    out.push_str("\n</prior_conversation>\n");
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_custom_ignores_everything_else() {
        let out = build_system_prompt(
            SystemPromptSource::FullCustom("be terse"),
            "/vault",
            Some("ignored CLAUDE.md"),
            &[],
            Some("ignored history"),
        );
        assert_eq!(out, "be terse");
    }

    #[test]
    fn fragment_includes_cwd_framing() {
        let out = build_system_prompt(SystemPromptSource::Fragment, "/vault/project", None, &[], None);
        assert!(out.contains("/vault/project"));
    }

    #[test]
    fn fragment_splices_context_files_and_history() {
        let files = vec![ContextFile {
            name: "AGENTS.md",
            content: "be helpful",
        }];
        let out = build_system_prompt(
            SystemPromptSource::Fragment,
            "/vault",
            Some("# CLAUDE"),
            &files,
            Some("user: hi\nassistant: hello"),
        );
        assert!(out.starts_with("# CLAUDE"));
        assert!(out.contains("## AGENTS.md"));
        assert!(out.contains("<prior_conversation>"));
        assert!(out.contains("user: hi"));
    }

    #[test]
    fn empty_prior_conversation_omits_block() {
        let out = build_system_prompt(SystemPromptSource::Fragment, "/vault", None, &[], Some(""));
        assert!(!out.contains("<prior_conversation>"));
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
