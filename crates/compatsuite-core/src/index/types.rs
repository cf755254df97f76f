//! Typed project index model

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Host platform a task can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
}

impl Platform {
    /// Every known platform, in canonical order
    pub const ALL: [Platform; 3] = [Platform::Darwin, Platform::Linux, Platform::Windows];

    /// Name as written in the index
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Darwin => "Darwin",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
        }
    }

    /// Platform of the running process, if it is one we know about
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "macos" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform '{}'", s))
    }
}

/// Set of alternative tokens for one xfail match dimension.
///
/// `None` is the wildcard: the field was absent and matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Option<BTreeSet<String>>);

impl TagSet {
    /// Wildcard set matching everything
    pub fn any() -> Self {
        Self(None)
    }

    /// Set of explicit alternatives
    pub fn of<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(tokens.into_iter().map(Into::into).collect()))
    }

    /// Whether the field was absent
    pub fn is_wildcard(&self) -> bool {
        self.0.is_none()
    }

    /// Whether an actual run-context value satisfies this field
    pub fn matches(&self, value: &str) -> bool {
        match &self.0 {
            None => true,
            Some(tokens) => tokens.contains(value),
        }
    }

    /// Explicit tokens (empty for the wildcard)
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flatten().map(String::as_str)
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            None => serializer.serialize_none(),
            Some(tokens) => tokens.serialize(serializer),
        }
    }
}

/// Build or test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verb {
    Build,
    Test,
}

/// Kind of Xcode container an action points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum XcodeContainer {
    Workspace,
    Project,
}

/// Whether an Xcode action selects a scheme or a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum XcodeSelector {
    Scheme,
    Target,
}

/// Discriminated action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    /// `BuildSwiftPackage` / `TestSwiftPackage`
    SwiftPackage(Verb),
    /// `(Build|Test)Xcode(Workspace|Project)(Scheme|Target)`
    Xcode {
        verb: Verb,
        container: XcodeContainer,
        selector: XcodeSelector,
    },
}

impl ActionKind {
    /// Parse an action tag as written in the index
    pub fn parse(tag: &str) -> Option<Self> {
        let (verb, rest) = if let Some(rest) = tag.strip_prefix("Build") {
            (Verb::Build, rest)
        } else if let Some(rest) = tag.strip_prefix("Test") {
            (Verb::Test, rest)
        } else {
            return None;
        };

        if rest == "SwiftPackage" {
            return Some(Self::SwiftPackage(verb));
        }

        let rest = rest.strip_prefix("Xcode")?;
        let (container, rest) = if let Some(r) = rest.strip_prefix("Workspace") {
            (XcodeContainer::Workspace, r)
        } else if let Some(r) = rest.strip_prefix("Project") {
            (XcodeContainer::Project, r)
        } else {
            return None;
        };
        let selector = match rest {
            "Scheme" => XcodeSelector::Scheme,
            "Target" => XcodeSelector::Target,
            _ => return None,
        };

        Some(Self::Xcode {
            verb,
            container,
            selector,
        })
    }

    /// Build or test
    pub fn verb(&self) -> Verb {
        match self {
            Self::SwiftPackage(verb) => *verb,
            Self::Xcode { verb, .. } => *verb,
        }
    }

    /// Platforms this kind can run on at all
    pub fn applicable_platforms(&self) -> &'static [Platform] {
        match self {
            Self::SwiftPackage(_) => &Platform::ALL,
            Self::Xcode { .. } => &[Platform::Darwin],
        }
    }

    /// Action tag as written in the index
    pub fn name(&self) -> String {
        let verb = match self.verb() {
            Verb::Build => "Build",
            Verb::Test => "Test",
        };
        match self {
            Self::SwiftPackage(_) => format!("{}SwiftPackage", verb),
            Self::Xcode {
                container,
                selector,
                ..
            } => {
                let container = match container {
                    XcodeContainer::Workspace => "Workspace",
                    XcodeContainer::Project => "Project",
                };
                let selector = match selector {
                    XcodeSelector::Scheme => "Scheme",
                    XcodeSelector::Target => "Target",
                };
                format!("{}Xcode{}{}", verb, container, selector)
            }
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A known, tracked failure expectation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XFailRule {
    /// Tracking identifier (first token of the index value)
    pub issue: Option<String>,
    pub compatibility: TagSet,
    pub branch: TagSet,
    pub platform: TagSet,
    pub configuration: TagSet,
    pub job: TagSet,
}

/// A (version, commit) pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityEntry {
    /// Earliest toolchain version known to build the project at `commit`
    pub version: String,
    /// Full 40 character SHA
    pub commit: String,
}

impl CompatibilityEntry {
    /// Abbreviated commit used in reports
    pub fn short_commit(&self) -> &str {
        &self.commit[..self.commit.len().min(6)]
    }
}

/// One build or test action of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    pub configuration: Option<String>,
    pub workspace: Option<String>,
    pub project: Option<String>,
    pub scheme: Option<String>,
    pub target: Option<String>,
    pub destination: Option<String>,
    /// Also build test targets (package builds)
    pub build_tests: bool,
    /// Run `clean` before an Xcode build
    pub clean_build: bool,
    /// Xcode targets built before the main one
    pub pretargets: Vec<String>,
    /// Extra build settings for Xcode actions
    pub environment: BTreeMap<String, String>,
    /// Ordered expected-failure rules; empty when none are declared
    pub xfail: Vec<XFailRule>,
}

impl Action {
    /// New action of the given kind with every optional field unset
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            configuration: None,
            workspace: None,
            project: None,
            scheme: None,
            target: None,
            destination: None,
            build_tests: false,
            clean_build: true,
            pretargets: Vec::new(),
            environment: BTreeMap::new(),
            xfail: Vec::new(),
        }
    }

    /// Scheme or target name, whichever the action uses
    pub fn scheme_or_target(&self) -> Option<&str> {
        self.scheme.as_deref().or(self.target.as_deref())
    }

    /// String fields exposed to filters and flag substitution
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("action", self.kind.name())];
        let optional = [
            ("configuration", &self.configuration),
            ("workspace", &self.workspace),
            ("project", &self.project),
            ("scheme", &self.scheme),
            ("target", &self.target),
            ("destination", &self.destination),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                fields.push((name, value.clone()));
            }
        }
        fields
    }
}

/// An external source project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Unique key across the index
    pub path: String,
    /// Repository kind (only `Git` is supported)
    pub repository: String,
    pub url: String,
    pub branch: String,
    pub maintainer: String,
    /// Never empty
    pub compatibility: Vec<CompatibilityEntry>,
    /// Declared platforms, deduplicated, in declaration order
    pub platforms: Vec<Platform>,
    pub actions: Vec<Action>,
}

impl Project {
    /// Whether the project declares support for a platform
    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }

    /// String fields exposed to filters and flag substitution
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("repository", self.repository.clone()),
            ("path", self.path.clone()),
            ("url", self.url.clone()),
            ("branch", self.branch.clone()),
            ("maintainer", self.maintainer.clone()),
        ]
    }
}

/// Immutable, validated project index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Index {
    projects: Vec<Project>,
}

impl Index {
    pub(crate) fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    /// Projects in index order
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Look up a project by path
    pub fn get(&self, path: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.path == path)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
