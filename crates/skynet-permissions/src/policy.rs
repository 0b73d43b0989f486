//! Per-tool trust gating, evaluated once per turn before the agent
//! runtime starts streaming.
//!
//! This is independent of the interactive `AskUserQuestion` flow in
//! `broker.rs` — it's the same kind of trust-floor check
//! `skynet-capabilities` applies to MCPs, applied instead to individual
//! tool names a workspace wants restricted to `direct` sessions only
//! (e.g. a tool that writes outside the sandboxed working directory).

use skynet_capabilities::{trust_rank, TrustLevel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    Allow,
    Deny { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ToolTrustPolicy {
    /// Tool names only permitted at `direct` trust.
    pub direct_only_tools: Vec<String>,
}

impl ToolTrustPolicy {
    pub fn evaluate(&self, trust: TrustLevel, tool_name: &str) -> ToolDecision {
        if self.direct_only_tools.iter().any(|t| t == tool_name) && trust_rank(trust) > trust_rank(TrustLevel::Direct) {
            return ToolDecision::Deny {
                reason: format!("{tool_name} requires direct trust, session is {trust}"),
            };
        }
        ToolDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_only_tool_denied_for_sandboxed() {
        let policy = ToolTrustPolicy {
            direct_only_tools: vec!["host_exec".to_string()],
        };
        assert_eq!(
            policy.evaluate(TrustLevel::Sandboxed, "host_exec"),
            ToolDecision::Deny {
                reason: "host_exec requires direct trust, session is sandboxed".to_string()
            }
        );
        assert_eq!(policy.evaluate(TrustLevel::Direct, "host_exec"), ToolDecision::Allow);
    }

    #[test]
    fn unrestricted_tool_always_allowed() {
        let policy = ToolTrustPolicy::default();
        assert_eq!(policy.evaluate(TrustLevel::Sandboxed, "read_file"), ToolDecision::Allow);
    }
}
