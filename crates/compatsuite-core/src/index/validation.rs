//! Index validation and normalisation

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::LoadError;

use super::loader::{OneOrMany, RawAction, RawCompatibility, RawProject, RawXFail};
use super::types::{
    Action, ActionKind, CompatibilityEntry, Index, Platform, Project, TagSet, XFailRule,
    XcodeContainer, XcodeSelector,
};

static COMMIT_SHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("Invalid regex"));

/// Repository kinds the checkout step knows how to handle
const SUPPORTED_REPOSITORIES: &[&str] = &["Git"];

/// Validate raw projects and convert them into the typed model
pub fn build_index(raw: Vec<RawProject>) -> Result<Index, LoadError> {
    debug!(count = raw.len(), "validating project index");
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut projects = Vec::with_capacity(raw.len());

    for (i, raw_project) in raw.into_iter().enumerate() {
        let project = build_project(i, raw_project)?;
        if let Some(first) = seen.insert(project.path.clone(), i) {
            return Err(LoadError::DuplicatePath {
                path: project.path,
                first,
                second: i,
            });
        }
        projects.push(project);
    }

    debug!("project index validation passed");
    Ok(Index::new(projects))
}

fn required(project: &str, field: &str, value: Option<String>) -> Result<String, LoadError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LoadError::MissingField {
            project: project.to_string(),
            field: field.to_string(),
        }),
    }
}

fn build_project(i: usize, raw: RawProject) -> Result<Project, LoadError> {
    let path = required(&format!("#{}", i), "path", raw.path)?;
    check_path(&path)?;

    let repository = raw.repository.unwrap_or_else(|| "Git".to_string());
    if !SUPPORTED_REPOSITORIES.contains(&repository.as_str()) {
        return Err(LoadError::InvalidField {
            project: path,
            field: "repository".to_string(),
            message: format!(
                "unsupported repository '{}', must be one of: {}",
                repository,
                SUPPORTED_REPOSITORIES.join(", ")
            ),
        });
    }

    let url = required(&path, "url", raw.url)?;
    let branch = raw.branch.unwrap_or_default();
    let maintainer = raw.maintainer.unwrap_or_default();

    let compatibility = match raw.compatibility {
        Some(entries) if !entries.is_empty() => entries
            .into_iter()
            .enumerate()
            .map(|(j, entry)| build_compatibility(&path, j, entry))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(LoadError::EmptyCompatibility { project: path }),
    };
    for (j, entry) in compatibility.iter().enumerate() {
        if compatibility[..j].iter().any(|e| e.version == entry.version) {
            return Err(LoadError::DuplicateVersion {
                project: path,
                version: entry.version.clone(),
            });
        }
    }

    let platforms = match raw.platforms {
        None => Platform::ALL.to_vec(),
        Some(names) => {
            let mut platforms: Vec<Platform> = Vec::with_capacity(names.len());
            for (j, name) in names.iter().enumerate() {
                let platform = parse_platform(&path, &format!("platforms[{}]", j), name)?;
                if !platforms.contains(&platform) {
                    platforms.push(platform);
                }
            }
            platforms
        }
    };

    let actions = raw
        .actions
        .into_iter()
        .enumerate()
        .map(|(j, action)| build_action(&path, j, action))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Project {
        path,
        repository,
        url,
        branch,
        maintainer,
        compatibility,
        platforms,
        actions,
    })
}

/// A project path names one directory inside the checkout cache
fn check_path(path: &str) -> Result<(), LoadError> {
    let problem = if path == "." || path == ".." {
        Some("must not be '.' or '..'")
    } else if path.contains(['/', '\\']) {
        Some("must be a single directory name without separators")
    } else if path.contains(':') || path != path.trim() {
        Some("must not contain ':' or surrounding whitespace")
    } else {
        None
    };
    match problem {
        Some(message) => Err(LoadError::InvalidField {
            project: path.to_string(),
            field: "path".to_string(),
            message: message.to_string(),
        }),
        None => Ok(()),
    }
}

fn build_compatibility(
    project: &str,
    j: usize,
    raw: RawCompatibility,
) -> Result<CompatibilityEntry, LoadError> {
    let version = required(project, &format!("compatibility[{}].version", j), raw.version)?;
    let field = format!("compatibility[{}].commit", j);
    let commit = required(project, &field, raw.commit)?;
    if !COMMIT_SHA.is_match(&commit) {
        return Err(LoadError::InvalidCommit {
            project: project.to_string(),
            field,
            commit,
        });
    }
    Ok(CompatibilityEntry { version, commit })
}

fn parse_platform(project: &str, field: &str, name: &str) -> Result<Platform, LoadError> {
    name.parse().map_err(|_| LoadError::UnknownPlatform {
        project: project.to_string(),
        field: field.to_string(),
        platform: name.to_string(),
    })
}

fn build_action(project: &str, j: usize, raw: RawAction) -> Result<Action, LoadError> {
    let prefix = format!("actions[{}]", j);
    let tag = required(project, &format!("{}.action", prefix), raw.action)?;
    let kind = ActionKind::parse(&tag).ok_or_else(|| LoadError::UnknownAction {
        project: project.to_string(),
        field: format!("{}.action", prefix),
        action: tag.clone(),
    })?;

    let mut action = Action::new(kind);
    action.configuration = raw.configuration;
    action.workspace = raw.workspace;
    action.project = raw.project;
    action.scheme = raw.scheme;
    action.target = raw.target;
    action.destination = raw.destination;
    action.build_tests = raw.build_tests.unwrap_or(false);
    action.clean_build = raw.clean_build.unwrap_or(true);
    action.pretargets = raw.pretargets.unwrap_or_default();
    action.environment = raw.environment.unwrap_or_default();

    check_kind_parameters(project, &prefix, &action)?;

    action.xfail = match raw.xfail {
        None => Vec::new(),
        Some(rules) => rules
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(k, rule)| build_xfail(project, &format!("{}.xfail[{}]", prefix, k), rule))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(action)
}

fn check_kind_parameters(project: &str, prefix: &str, action: &Action) -> Result<(), LoadError> {
    let missing = |field: &str| LoadError::MissingField {
        project: project.to_string(),
        field: format!("{}.{}", prefix, field),
    };

    match action.kind {
        ActionKind::SwiftPackage(_) => {}
        ActionKind::Xcode {
            container,
            selector,
            ..
        } => {
            match container {
                XcodeContainer::Workspace if action.workspace.is_none() => {
                    return Err(missing("workspace"))
                }
                XcodeContainer::Project if action.project.is_none() => {
                    return Err(missing("project"))
                }
                _ => {}
            }
            match selector {
                XcodeSelector::Scheme if action.scheme.is_none() => {
                    return Err(missing("scheme"))
                }
                XcodeSelector::Target if action.target.is_none() => {
                    return Err(missing("target"))
                }
                _ => {}
            }
            if action.destination.is_none() {
                return Err(missing("destination"));
            }
        }
    }
    Ok(())
}

fn tag_set(values: Option<OneOrMany<String>>) -> TagSet {
    match values {
        None => TagSet::any(),
        Some(values) => TagSet::of(values.into_vec()),
    }
}

fn build_xfail(project: &str, field: &str, raw: RawXFail) -> Result<XFailRule, LoadError> {
    let issue = raw
        .issue
        .as_deref()
        .and_then(|issue| issue.split_whitespace().next())
        .map(str::to_string);

    let platform = tag_set(raw.platform);
    for name in platform.tokens() {
        parse_platform(project, &format!("{}.platform", field), name)?;
    }

    let configuration = match raw.configuration {
        None => TagSet::any(),
        Some(values) => TagSet::of(values.into_vec().into_iter().map(|c| c.to_lowercase())),
    };

    Ok(XFailRule {
        issue,
        compatibility: tag_set(raw.compatibility),
        branch: tag_set(raw.branch),
        platform,
        configuration,
        job: tag_set(raw.job),
    })
}
