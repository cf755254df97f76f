//! Expected-failure resolution
//!
//! Rules are tried in declaration order and the first rule whose present
//! match fields are all satisfied by the run context wins.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::index::XFailRule;

/// Actual values of the xfail match dimensions for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    /// Compatibility version of the task
    pub compatibility: String,
    /// Toolchain branch under test
    pub branch: String,
    pub platform: String,
    /// Build configuration, lower-cased; `None` when the task has none
    pub configuration: Option<String>,
    pub job: String,
}

impl MatchContext {
    pub fn new(
        compatibility: impl Into<String>,
        branch: impl Into<String>,
        platform: impl Into<String>,
        configuration: Option<&str>,
        job: impl Into<String>,
    ) -> Self {
        Self {
            compatibility: compatibility.into(),
            branch: branch.into(),
            platform: platform.into(),
            configuration: configuration.map(str::to_lowercase),
            job: job.into(),
        }
    }
}

/// Whether a single rule matches a context
pub fn rule_matches(rule: &XFailRule, ctx: &MatchContext) -> bool {
    if !rule.compatibility.matches(&ctx.compatibility)
        || !rule.branch.matches(&ctx.branch)
        || !rule.platform.matches(&ctx.platform)
        || !rule.job.matches(&ctx.job)
    {
        return false;
    }

    match &ctx.configuration {
        Some(configuration) => rule.configuration.matches(configuration),
        None if rule.configuration.is_wildcard() => true,
        None => {
            warn!(
                issue = rule.issue.as_deref().unwrap_or("<none>"),
                "xfail rule names a configuration but the task has none; treating as no match"
            );
            false
        }
    }
}

/// First rule in list order matching the context
pub fn resolve<'a>(rules: &'a [XFailRule], ctx: &MatchContext) -> Option<&'a XFailRule> {
    rules.iter().find(|rule| rule_matches(rule, ctx))
}

/// Classified outcome of an executed task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    ExpectedFail { issue: Option<String> },
    UnexpectedFail,
    UnexpectedPass { issue: Option<String> },
}

impl Outcome {
    /// Label used in log names and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::ExpectedFail { .. } => "XFAIL",
            Self::UnexpectedFail => "FAIL",
            Self::UnexpectedPass { .. } => "UPASS",
        }
    }

    /// Whether this outcome makes the run fail
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::UnexpectedFail | Self::UnexpectedPass { .. })
    }

    /// Tracking issue attached by the matching rule
    pub fn issue(&self) -> Option<&str> {
        match self {
            Self::ExpectedFail { issue } | Self::UnexpectedPass { issue } => issue.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a finished task.
///
/// Success without a matching rule is a pass even when the action has
/// rules for other contexts.
pub fn classify(success: bool, rules: &[XFailRule], ctx: &MatchContext) -> Outcome {
    let matched = resolve(rules, ctx);
    match (success, matched) {
        (true, None) => Outcome::Pass,
        (true, Some(rule)) => Outcome::UnexpectedPass {
            issue: rule.issue.clone(),
        },
        (false, Some(rule)) => Outcome::ExpectedFail {
            issue: rule.issue.clone(),
        },
        (false, None) => Outcome::UnexpectedFail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TagSet;

    fn ctx(branch: &str, platform: &str) -> MatchContext {
        MatchContext::new("5.0", branch, platform, Some("Debug"), "source-compat")
    }

    fn rule(issue: &str) -> XFailRule {
        XFailRule {
            issue: Some(issue.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            XFailRule {
                platform: TagSet::of(["Darwin"]),
                ..rule("FIRST")
            },
            rule("SECOND"),
        ];
        let matched = resolve(&rules, &ctx("main", "Darwin")).unwrap();
        assert_eq!(matched.issue.as_deref(), Some("FIRST"));

        let matched = resolve(&rules, &ctx("main", "Linux")).unwrap();
        assert_eq!(matched.issue.as_deref(), Some("SECOND"));
    }

    #[test]
    fn test_full_wildcard_matches_every_context() {
        let wildcard = rule("ANY");
        for (branch, platform) in [("main", "Darwin"), ("release/5.9", "Linux")] {
            assert!(rule_matches(&wildcard, &ctx(branch, platform)));
        }
        let no_config = MatchContext::new("4.2", "main", "Windows", None, "other");
        assert!(rule_matches(&wildcard, &no_config));
    }

    #[test]
    fn test_branch_set_membership() {
        let r = XFailRule {
            branch: TagSet::of(["main", "release/6.0"]),
            ..rule("B")
        };
        assert!(rule_matches(&r, &ctx("main", "Darwin")));
        assert!(rule_matches(&r, &ctx("release/6.0", "Darwin")));
        assert!(!rule_matches(&r, &ctx("release/5.9", "Darwin")));
    }

    #[test]
    fn test_all_present_fields_must_match() {
        let r = XFailRule {
            branch: TagSet::of(["main"]),
            platform: TagSet::of(["Linux"]),
            ..rule("AND")
        };
        assert!(rule_matches(&r, &ctx("main", "Linux")));
        assert!(!rule_matches(&r, &ctx("main", "Darwin")));
    }

    #[test]
    fn test_configuration_match_is_case_insensitive() {
        let r = XFailRule {
            configuration: TagSet::of(["debug"]),
            ..rule("CFG")
        };
        assert!(rule_matches(&r, &ctx("main", "Darwin")));
    }

    #[test]
    fn test_configuration_rule_without_task_configuration() {
        let r = XFailRule {
            configuration: TagSet::of(["release"]),
            ..rule("CFG")
        };
        let none = MatchContext::new("5.0", "main", "Darwin", None, "source-compat");
        assert!(!rule_matches(&r, &none));
    }

    #[test]
    fn test_classify_matching_success_is_unexpected_pass() {
        let rules = vec![rule("STALE")];
        assert_eq!(
            classify(true, &rules, &ctx("main", "Darwin")),
            Outcome::UnexpectedPass {
                issue: Some("STALE".to_string())
            }
        );
    }

    #[test]
    fn test_classify_failure_without_rules_is_unexpected_fail() {
        assert_eq!(
            classify(false, &[], &ctx("main", "Darwin")),
            Outcome::UnexpectedFail
        );
    }

    #[test]
    fn test_classify_success_with_non_matching_rule_is_pass() {
        let rules = vec![XFailRule {
            platform: TagSet::of(["Linux"]),
            ..rule("X")
        }];
        assert_eq!(classify(true, &rules, &ctx("main", "Darwin")), Outcome::Pass);
    }

    #[test]
    fn test_alamofire_linux_rule_on_darwin_is_unexpected_fail() {
        let rules = vec![XFailRule {
            platform: TagSet::of(["Linux"]),
            ..rule("X")
        }];
        assert_eq!(
            classify(false, &rules, &ctx("main", "Darwin")),
            Outcome::UnexpectedFail
        );
    }

    #[test]
    fn test_classify_matching_failure_is_expected() {
        let rules = vec![rule("KNOWN")];
        let outcome = classify(false, &rules, &ctx("main", "Darwin"));
        assert_eq!(outcome.label(), "XFAIL");
        assert_eq!(outcome.issue(), Some("KNOWN"));
        assert!(!outcome.is_unexpected());
    }
}
