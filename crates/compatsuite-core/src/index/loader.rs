//! Project index loading

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::LoadError;

use super::types::Index;
use super::validation::build_index;

/// A field that may be written either as one value or as a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Collapse into a list
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Project entry as written in the index document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProject {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub compatibility: Option<Vec<RawCompatibility>>,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

/// Compatibility entry as written in the index document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCompatibility {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

/// Action entry as written in the index document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default, rename = "buildTests", alias = "build_tests")]
    pub build_tests: Option<bool>,
    #[serde(default)]
    pub clean_build: Option<bool>,
    #[serde(default)]
    pub pretargets: Option<Vec<String>>,
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub xfail: Option<OneOrMany<RawXFail>>,
}

/// Expected-failure rule as written in the index document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawXFail {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub compatibility: Option<OneOrMany<String>>,
    #[serde(default)]
    pub branch: Option<OneOrMany<String>>,
    #[serde(default)]
    pub platform: Option<OneOrMany<String>>,
    #[serde(default)]
    pub configuration: Option<OneOrMany<String>>,
    #[serde(default)]
    pub job: Option<OneOrMany<String>>,
}

/// Parse the index document without validating it
pub fn parse_raw_index(content: &str) -> Result<Vec<RawProject>, LoadError> {
    serde_json::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))
}

/// Parse and validate an index document
pub fn parse_index(content: &str) -> Result<Index, LoadError> {
    let raw = parse_raw_index(content)?;
    build_index(raw)
}

/// Load and validate the project index from a file.
///
/// Any problem aborts the whole load; there is no partial index.
pub fn load_index(path: &Path) -> Result<Index, LoadError> {
    info!(path = %path.display(), "loading project index");

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let index = parse_index(&content)?;
    debug!(
        path = %path.display(),
        projects = index.len(),
        "project index loaded and validated"
    );
    Ok(index)
}

/// Rewrite an index document in canonical form.
///
/// Projects are sorted by `path`; every object keeps the key order it was
/// written with. Output uses two-space indentation, escapes non-ASCII
/// characters as `\uXXXX`, and carries no trailing whitespace or final
/// newline.
pub fn format_index(content: &str) -> Result<String, LoadError> {
    let mut projects: Vec<serde_json::Value> =
        serde_json::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))?;
    projects.sort_by(|a, b| project_path(a).cmp(&project_path(b)));

    let json =
        serde_json::to_string_pretty(&projects).map_err(|e| LoadError::Parse(e.to_string()))?;
    let formatted = json
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(escape_non_ascii(&formatted))
}

fn project_path(project: &serde_json::Value) -> Option<&str> {
    project.get("path").and_then(serde_json::Value::as_str)
}

/// `\uXXXX` escapes for everything outside ASCII, surrogate pairs above
/// the BMP. Non-ASCII only ever occurs inside JSON strings.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{:04x}", unit));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn sample() -> String {
        format!(
            r#"[
  {{
    "repository": "Git",
    "url": "https://github.com/Alamofire/Alamofire.git",
    "path": "Alamofire",
    "branch": "master",
    "maintainer": "dev@example.com",
    "compatibility": [{{ "version": "5.0", "commit": "{sha}" }}],
    "platforms": ["Darwin"],
    "actions": [
      {{ "action": "BuildSwiftPackage", "configuration": "release" }},
      {{ "action": "TestSwiftPackage", "xfail": {{ "issue": "X", "platform": "Linux" }} }}
    ]
  }}
]"#,
            sha = SHA
        )
    }

    #[test]
    fn test_load_index_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("projects.json");
        std::fs::write(&path, sample()).unwrap();

        let index = load_index(&path).unwrap();
        assert_eq!(index.len(), 1);
        let project = index.get("Alamofire").unwrap();
        assert_eq!(project.actions.len(), 2);
        assert_eq!(project.actions[1].xfail.len(), 1);
    }

    #[test]
    fn test_load_index_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_index(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_parse_index_malformed_json() {
        let err = parse_index("[{").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_one_or_many_accepts_both_shapes() {
        let one: OneOrMany<String> = serde_json::from_str(r#""main""#).unwrap();
        let many: OneOrMany<String> = serde_json::from_str(r#"["main", "release/6.0"]"#).unwrap();
        assert_eq!(one.into_vec(), vec!["main"]);
        assert_eq!(many.into_vec(), vec!["main", "release/6.0"]);
    }

    #[test]
    fn test_format_sorts_by_path_and_keeps_unknown_fields() {
        let content = r#"[
            {"path": "b", "url": "u", "notes": "keep me"},
            {"path": "a", "url": "u"}
        ]"#;
        let formatted = format_index(content).unwrap();

        let a = formatted.find("\"a\"").unwrap();
        let b = formatted.find("\"b\"").unwrap();
        assert!(a < b);
        assert!(formatted.contains("\"notes\": \"keep me\""));
        assert!(formatted.lines().all(|l| l == l.trim_end()));
        assert!(formatted.contains("\n  {"));
        assert!(formatted.ends_with(']'));
    }

    #[test]
    fn test_format_keeps_document_key_order() {
        let content = format!(
            r#"[{{"path": "Kit", "url": "u", "repository": "Git",
                 "compatibility": [{{"version": "5.0", "commit": "{SHA}"}}],
                 "platforms": ["Darwin"], "maintainer": "m",
                 "actions": [{{"configuration": "release", "action": "BuildSwiftPackage"}}]}}]"#
        );
        let formatted = format_index(&content).unwrap();

        let keys = [
            "\"path\"",
            "\"url\"",
            "\"repository\"",
            "\"compatibility\"",
            "\"platforms\"",
            "\"maintainer\"",
            "\"actions\"",
        ];
        let order: Vec<usize> = keys
            .iter()
            .map(|key| formatted.find(key).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{}", formatted);
        assert!(formatted.find("\"configuration\"").unwrap() < formatted.find("\"action\"").unwrap());
    }

    #[test]
    fn test_canonical_input_is_unchanged() {
        let canonical = format!(
            r#"[
  {{
    "path": "Alamofire",
    "url": "https://github.com/Alamofire/Alamofire.git",
    "repository": "Git",
    "maintainer": "dev@example.com",
    "compatibility": [
      {{
        "version": "5.0",
        "commit": "{SHA}"
      }}
    ],
    "platforms": [
      "Darwin"
    ],
    "actions": [
      {{
        "action": "BuildSwiftPackage",
        "configuration": "release"
      }}
    ]
  }},
  {{
    "path": "Kingfisher",
    "url": "https://github.com/onevcat/Kingfisher.git",
    "repository": "Git",
    "maintainer": "Wei Wang",
    "compatibility": [],
    "actions": []
  }}
]"#
        );
        assert_eq!(format_index(&canonical).unwrap(), canonical);

        let formatted = format_index(&sample()).unwrap();
        assert_eq!(format_index(&formatted).unwrap(), formatted);
    }

    #[test]
    fn test_format_escapes_non_ascii() {
        let formatted = format_index(r#"[{"path": "a", "maintainer": "Jos\u00e9 \ud83d\ude80"}]"#).unwrap();
        assert!(formatted.contains(r#""maintainer": "Jos\u00e9 \ud83d\ude80""#), "{}", formatted);
        assert!(formatted.is_ascii());
    }
}
