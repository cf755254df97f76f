//! Invocation planning: the processes a task runs
//!
//! A task is a checkout followed by one or more toolchain steps. Planning
//! is pure; nothing here spawns a process.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

use compatsuite_core::index::{ActionKind, Platform, Verb, XcodeContainer, XcodeSelector};
use compatsuite_core::predicate::Attributes;

use crate::task::ExecutionTask;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("Invalid regex"));

/// Build settings that keep Xcode from signing or failing on warnings
const XCODE_COMMON_SETTINGS: &[&str] = &[
    "CODE_SIGN_IDENTITY=",
    "CODE_SIGNING_REQUIRED=NO",
    "ENTITLEMENTS_REQUIRED=NO",
    "ENABLE_BITCODE=NO",
    "INDEX_ENABLE_DATA_STORE=NO",
    "GCC_TREAT_WARNINGS_AS_ERRORS=NO",
    "SWIFT_TREAT_WARNINGS_AS_ERRORS=NO",
];

/// Errors that prevent a task's processes from being planned
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("action {action} is missing '{field}'")]
    MissingParameter { action: String, field: &'static str },

    #[error("sandboxing is not supported on {0}")]
    SandboxUnsupported(Platform),
}

/// One external process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Run this invocation under a wrapper command
    pub fn wrapped(self, prefix: &[String]) -> Self {
        let Some((program, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args = rest.to_vec();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: program.clone(),
            args,
            env: self.env,
            cwd: self.cwd,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, shell_quote(value))?;
        }
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Processes for one task, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPlan {
    /// Bring the checkout to the pinned commit
    pub checkout: Vec<Invocation>,
    /// Toolchain steps
    pub steps: Vec<Invocation>,
}

impl TaskPlan {
    pub fn all(&self) -> impl Iterator<Item = &Invocation> {
        self.checkout.iter().chain(self.steps.iter())
    }

    /// Last toolchain step, shown when a task starts
    pub fn headline(&self) -> String {
        self.steps
            .last()
            .or(self.checkout.last())
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Turns tasks into processes
pub trait InvocationPlanner: Send + Sync {
    /// Plan a task whose checkout lives in `checkout_dir`.
    ///
    /// Called with the checkout lock held, so `checkout_exists` is stable.
    fn plan(
        &self,
        task: &ExecutionTask,
        checkout_dir: &Path,
        checkout_exists: bool,
    ) -> Result<TaskPlan, PlanError>;
}

/// Toolchain settings shared by every task of a run
#[derive(Debug, Clone, Default)]
pub struct ToolchainOptions {
    /// Compiler under test
    pub swiftc: PathBuf,
    /// Language mode forced on every task
    pub swift_version: Option<String>,
    /// Compiler used for `SWIFT_EXEC` instead of `swiftc`
    pub override_swift_exec: Option<PathBuf>,
    /// Extra compiler flags; `{field}` placeholders are substituted
    pub added_swift_flags: Option<String>,
    /// Extra xcodebuild arguments; `{field}` placeholders are substituted
    pub added_xcodebuild_flags: Option<String>,
    /// Skip clean steps
    pub skip_clean: bool,
    pub sandbox_profile_package: Option<PathBuf>,
    pub sandbox_profile_xcodebuild: Option<PathBuf>,
    /// Platform the processes run on
    pub host: Option<Platform>,
}

/// Planner for SwiftPM and Xcode actions
#[derive(Debug, Clone)]
pub struct SwiftPlanner {
    options: ToolchainOptions,
}

impl SwiftPlanner {
    pub fn new(options: ToolchainOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ToolchainOptions {
        &self.options
    }

    fn swift_exec(&self) -> String {
        self.options
            .override_swift_exec
            .as_ref()
            .unwrap_or(&self.options.swiftc)
            .display()
            .to_string()
    }

    fn sandbox(&self, profile: Option<&PathBuf>) -> Result<Vec<String>, PlanError> {
        match profile {
            None => Ok(Vec::new()),
            Some(profile) => {
                let host = self.options.host.or_else(Platform::host);
                sandbox_prefix(profile, host.unwrap_or(Platform::Windows))
            }
        }
    }

    fn package_steps(
        &self,
        task: &ExecutionTask,
        verb: Verb,
        dir: &Path,
        attrs: &Attributes,
    ) -> Result<Vec<Invocation>, PlanError> {
        let swift = swift_driver(&self.options.swiftc);
        let dir = dir.display().to_string();
        let sandbox = self.sandbox(self.options.sandbox_profile_package.as_ref())?;
        let mode = swift_version_mode(
            self.options.swift_version.as_deref(),
            &task.compatibility.version,
        );
        let mut steps = Vec::new();

        if !self.options.skip_clean {
            steps.push(
                Invocation::new(&swift)
                    .args(["package", "--disable-sandbox", "--package-path", dir.as_str(), "clean"])
                    .wrapped(&sandbox),
            );
        }

        let mut main = Invocation::new(&swift).env("SWIFT_EXEC", self.swift_exec());
        main = match verb {
            Verb::Build => {
                let configuration = task.configuration().unwrap_or("debug").to_lowercase();
                let mut build = main.args([
                    "build",
                    "--disable-sandbox",
                    "--package-path",
                    dir.as_str(),
                    "--verbose",
                    "--configuration",
                    configuration.as_str(),
                ]);
                if task.action().build_tests {
                    build = build.arg("--build-tests");
                }
                build
            }
            Verb::Test => main.args([
                "test",
                "--disable-sandbox",
                "--package-path",
                dir.as_str(),
                "--verbose",
            ]),
        };
        main = main.args(["-Xswiftc", "-swift-version", "-Xswiftc", mode.as_str()]);
        for flag in added_words(self.options.added_swift_flags.as_deref(), attrs) {
            main = main.args(["-Xswiftc".to_string(), flag]);
        }
        steps.push(main.wrapped(&sandbox));

        Ok(steps)
    }

    fn xcode_steps(
        &self,
        task: &ExecutionTask,
        verb: Verb,
        container: XcodeContainer,
        selector: XcodeSelector,
        dir: &Path,
        attrs: &Attributes,
    ) -> Result<Vec<Invocation>, PlanError> {
        let action = task.action();
        let missing = |field: &'static str| PlanError::MissingParameter {
            action: action.kind.name(),
            field,
        };

        let (container_flag, container_path) = match container {
            XcodeContainer::Workspace => (
                "-workspace",
                action.workspace.as_ref().ok_or_else(|| missing("workspace"))?,
            ),
            XcodeContainer::Project => (
                "-project",
                action.project.as_ref().ok_or_else(|| missing("project"))?,
            ),
        };
        let (selector_flag, selector_name) = match selector {
            XcodeSelector::Scheme => (
                "-scheme",
                action.scheme.as_ref().ok_or_else(|| missing("scheme"))?,
            ),
            XcodeSelector::Target => (
                "-target",
                action.target.as_ref().ok_or_else(|| missing("target"))?,
            ),
        };
        let destination = action.destination.as_ref().ok_or_else(|| missing("destination"))?;
        let container_path = dir.join(container_path).display().to_string();
        let build_dir = dir.join("build").display().to_string();
        let sandbox = self.sandbox(self.options.sandbox_profile_xcodebuild.as_ref())?;

        let mode = swift_version_mode(
            self.options.swift_version.as_deref(),
            &task.compatibility.version,
        );
        let mut other_swift_flags = vec![
            "$(OTHER_SWIFT_FLAGS)".to_string(),
            "-swift-version".to_string(),
            mode.clone(),
        ];
        other_swift_flags.extend(added_words(self.options.added_swift_flags.as_deref(), attrs));

        let mut settings = Vec::new();
        match selector {
            XcodeSelector::Scheme => {}
            XcodeSelector::Target if action.environment.contains_key("SYMROOT") => {}
            XcodeSelector::Target => settings.push(format!("SYMROOT={}", build_dir)),
        }
        settings.extend(action.environment.iter().map(|(k, v)| format!("{}={}", k, v)));
        settings.extend(XCODE_COMMON_SETTINGS.iter().map(|s| s.to_string()));
        settings.push(format!("SWIFT_EXEC={}", self.swift_exec()));
        settings.push(format!("SWIFT_VERSION={}", mode));
        settings.push(format!("OTHER_SWIFT_FLAGS={}", other_swift_flags.join(" ")));
        if let Some(dir) = stdlib_platform_dir(destination).filter(|_| verb == Verb::Test) {
            settings.push(format!(
                "SWIFT_LIBRARY_PATH={}",
                stdlib_path(&self.options.swiftc, dir)
            ));
        }

        let mut tail = Vec::new();
        if let Some(configuration) = task.configuration() {
            tail.push("-configuration".to_string());
            tail.push(capitalize(configuration));
        }
        tail.extend(settings);
        tail.extend(added_words(self.options.added_xcodebuild_flags.as_deref(), attrs));
        if destination == "generic/platform=watchOS" {
            tail.push("ARCHS=armv7k".to_string());
        }

        let derived_data = match selector {
            XcodeSelector::Scheme => vec!["-derivedDataPath".to_string(), build_dir.clone()],
            XcodeSelector::Target => Vec::new(),
        };
        let clean = action.clean_build && !self.options.skip_clean;
        let mut steps = Vec::new();

        if verb == Verb::Build && !action.pretargets.is_empty() {
            let mut prebuild = Invocation::new("xcodebuild");
            if clean {
                prebuild = prebuild.arg("clean");
            }
            prebuild = prebuild
                .arg("build")
                .args([
                    container_flag,
                    container_path.as_str(),
                    "-destination",
                    destination.as_str(),
                ]);
            for pretarget in &action.pretargets {
                prebuild = prebuild.args([selector_flag, pretarget.as_str()]);
            }
            steps.push(
                prebuild
                    .args(derived_data.iter().cloned())
                    .args(tail.iter().cloned())
                    .wrapped(&sandbox),
            );
        }

        let mut main = Invocation::new("xcodebuild");
        match verb {
            Verb::Build => {
                if clean && action.pretargets.is_empty() {
                    main = main.arg("clean");
                }
                main = main.arg("build");
            }
            Verb::Test => {
                if !self.options.skip_clean {
                    main = main.arg("clean");
                }
                main = main.arg("test");
            }
        }
        main = main
            .args([
                container_flag,
                container_path.as_str(),
                selector_flag,
                selector_name.as_str(),
            ])
            .args(["-destination", destination.as_str()])
            .args(derived_data)
            .args(tail);
        steps.push(main.wrapped(&sandbox));

        Ok(steps)
    }
}

impl InvocationPlanner for SwiftPlanner {
    fn plan(
        &self,
        task: &ExecutionTask,
        checkout_dir: &Path,
        checkout_exists: bool,
    ) -> Result<TaskPlan, PlanError> {
        let attrs = task.attributes();
        let checkout = checkout_steps(
            &task.project.url,
            &task.compatibility.commit,
            checkout_dir,
            checkout_exists,
            self.options.skip_clean,
        );
        let steps = match task.action().kind {
            ActionKind::SwiftPackage(verb) => {
                self.package_steps(task, verb, checkout_dir, &attrs)?
            }
            ActionKind::Xcode {
                verb,
                container,
                selector,
            } => self.xcode_steps(task, verb, container, selector, checkout_dir, &attrs)?,
        };
        Ok(TaskPlan { checkout, steps })
    }
}

/// Git steps bringing `dir` to `commit`
pub fn checkout_steps(
    url: &str,
    commit: &str,
    dir: &Path,
    exists: bool,
    skip_clean: bool,
) -> Vec<Invocation> {
    let path = dir.display().to_string();
    let git = |args: &[&str]| {
        Invocation::new("git")
            .args(["-C", path.as_str()])
            .args(args.iter().copied())
    };
    let mut steps = Vec::new();

    if exists {
        if !skip_clean {
            steps.push(git(&["clean", "-ffdx"]));
        }
        steps.push(git(&["fetch"]));
    } else {
        steps.push(Invocation::new("git").args(["clone", url, path.as_str()]));
    }
    steps.push(git(&["checkout", "-f", commit]));
    steps.push(git(&["submodule", "update", "--init", "--recursive"]));
    steps
}

/// Language mode passed to the compiler.
///
/// `4.2` is a mode of its own; every other version maps to its major
/// component.
pub fn swift_version_mode(explicit: Option<&str>, compatibility_version: &str) -> String {
    let version = explicit.unwrap_or(compatibility_version);
    if version == "4.2" {
        return version.to_string();
    }
    version.split('.').next().unwrap_or(version).to_string()
}

/// Replace `{field}` placeholders with task attributes; unknown names stay
pub fn substitute(template: &str, attrs: &Attributes) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match attrs.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn added_words(flags: Option<&str>, attrs: &Attributes) -> Vec<String> {
    flags
        .map(|f| substitute(f, attrs))
        .map(|f| f.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Wrapper command applying a sandbox profile on the given host
pub fn sandbox_prefix(profile: &Path, host: Platform) -> Result<Vec<String>, PlanError> {
    let profile = profile.display().to_string();
    match host {
        Platform::Darwin => Ok(vec!["sandbox-exec".to_string(), "-f".to_string(), profile]),
        Platform::Linux => Ok(vec![
            "firejail".to_string(),
            "--quiet".to_string(),
            format!("--profile={}", profile),
            "--private=.".to_string(),
            "--overlay-tmpfs".to_string(),
        ]),
        Platform::Windows => Err(PlanError::SandboxUnsupported(host)),
    }
}

/// `swift` next to `swiftc`
fn swift_driver(swiftc: &Path) -> String {
    let path = swiftc.display().to_string();
    match path.strip_suffix("swiftc") {
        Some(prefix) => format!("{}swift", prefix),
        None => swiftc.with_file_name("swift").display().to_string(),
    }
}

fn stdlib_platform_dir(destination: &str) -> Option<&'static str> {
    [
        ("macOS", "macosx"),
        ("iOS", "iphonesimulator"),
        ("tvOS", "appletvsimulator"),
        ("watchOS", "watchsimulator"),
    ]
    .into_iter()
    .find(|(key, _)| destination.contains(key))
    .map(|(_, dir)| dir)
}

fn stdlib_path(swiftc: &Path, platform_dir: &str) -> String {
    let root = swiftc
        .parent()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    root.join("lib").join("swift").join(platform_dir).display().to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures::{alamofire_index, task, SHA};
    use crate::task::RunContext;
    use compatsuite_core::index::parse_index;
    use std::sync::Arc;

    fn planner() -> SwiftPlanner {
        SwiftPlanner::new(ToolchainOptions {
            swiftc: PathBuf::from("/toolchain/usr/bin/swiftc"),
            host: Some(Platform::Darwin),
            ..Default::default()
        })
    }

    fn xcode_task(action_json: &str) -> ExecutionTask {
        let index = parse_index(&format!(
            r#"[{{ "path": "Kit", "url": "https://example.com/Kit.git",
                  "compatibility": [{{ "version": "5.0", "commit": "{SHA}" }}],
                  "actions": [{action_json}] }}]"#
        ))
        .unwrap();
        task(&index, 0)
    }

    #[test]
    fn test_checkout_fresh_clone() {
        let steps = checkout_steps("https://x/y.git", SHA, Path::new("c/5.0/y"), false, false);
        let rendered: Vec<_> = steps.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "git clone https://x/y.git c/5.0/y".to_string(),
                format!("git -C c/5.0/y checkout -f {}", SHA),
                "git -C c/5.0/y submodule update --init --recursive".to_string(),
            ]
        );
    }

    #[test]
    fn test_checkout_update_existing() {
        let steps = checkout_steps("u", SHA, Path::new("d"), true, false);
        assert_eq!(steps[0].args, vec!["-C", "d", "clean", "-ffdx"]);
        assert_eq!(steps[1].args, vec!["-C", "d", "fetch"]);

        let skip = checkout_steps("u", SHA, Path::new("d"), true, true);
        assert_eq!(skip.len(), 3);
        assert_eq!(skip[0].args, vec!["-C", "d", "fetch"]);
    }

    #[test]
    fn test_swift_version_mode() {
        assert_eq!(swift_version_mode(None, "4.2"), "4.2");
        assert_eq!(swift_version_mode(None, "5.10"), "5");
        assert_eq!(swift_version_mode(Some("6.0"), "5.0"), "6");
        assert_eq!(swift_version_mode(Some("4.2"), "5.0"), "4.2");
    }

    #[test]
    fn test_package_build_plan() {
        let index = alamofire_index();
        let task = task(&index, 0);
        let plan = planner().plan(&task, Path::new("cache/5.0/Alamofire"), true).unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].program, "/toolchain/usr/bin/swift");
        assert_eq!(
            plan.steps[0].args,
            vec!["package", "--disable-sandbox", "--package-path", "cache/5.0/Alamofire", "clean"]
        );
        let build = &plan.steps[1];
        assert_eq!(
            build.args,
            vec![
                "build",
                "--disable-sandbox",
                "--package-path",
                "cache/5.0/Alamofire",
                "--verbose",
                "--configuration",
                "release",
                "-Xswiftc",
                "-swift-version",
                "-Xswiftc",
                "5",
            ]
        );
        assert_eq!(
            build.env.get("SWIFT_EXEC").map(String::as_str),
            Some("/toolchain/usr/bin/swiftc")
        );
    }

    #[test]
    fn test_package_test_plan_with_flags_and_skip_clean() {
        let index = alamofire_index();
        let task = task(&index, 1);
        let planner = SwiftPlanner::new(ToolchainOptions {
            swiftc: PathBuf::from("swiftc"),
            skip_clean: true,
            added_swift_flags: Some("-D {path}_CI -warnings-as-errors".to_string()),
            override_swift_exec: Some(PathBuf::from("/other/swiftc")),
            host: Some(Platform::Linux),
            ..Default::default()
        });
        let plan = planner.plan(&task, Path::new("d"), true).unwrap();

        assert_eq!(plan.steps.len(), 1);
        let test = &plan.steps[0];
        assert_eq!(test.program, "swift");
        assert_eq!(&test.args[..5], &["test", "--disable-sandbox", "--package-path", "d", "--verbose"]);
        assert_eq!(
            &test.args[9..],
            &["-Xswiftc", "-D", "-Xswiftc", "Alamofire_CI", "-Xswiftc", "-warnings-as-errors"]
        );
        assert_eq!(test.env.get("SWIFT_EXEC").map(String::as_str), Some("/other/swiftc"));
    }

    #[test]
    fn test_build_config_override_reaches_package_build() {
        let index = alamofire_index();
        let mut task = task(&index, 0);
        task.context = Arc::new(
            RunContext::new("main", Platform::Darwin, "source-compat")
                .with_build_config(Some("debug".to_string())),
        );
        let plan = planner().plan(&task, Path::new("d"), true).unwrap();
        assert!(plan.steps[1].args.windows(2).any(|w| w == ["--configuration", "debug"]));
    }

    #[test]
    fn test_package_sandbox_on_linux() {
        let index = alamofire_index();
        let task = task(&index, 0);
        let planner = SwiftPlanner::new(ToolchainOptions {
            swiftc: PathBuf::from("/t/swiftc"),
            sandbox_profile_package: Some(PathBuf::from("pkg.profile")),
            host: Some(Platform::Linux),
            ..Default::default()
        });
        let plan = planner.plan(&task, Path::new("d"), true).unwrap();
        let build = &plan.steps[1];
        assert_eq!(build.program, "firejail");
        assert_eq!(
            &build.args[..5],
            &["--quiet", "--profile=pkg.profile", "--private=.", "--overlay-tmpfs", "/t/swift"]
        );
    }

    #[test]
    fn test_sandbox_prefix_darwin() {
        assert_eq!(
            sandbox_prefix(Path::new("p.sb"), Platform::Darwin).unwrap(),
            vec!["sandbox-exec", "-f", "p.sb"]
        );
        assert!(sandbox_prefix(Path::new("p"), Platform::Windows).is_err());
    }

    #[test]
    fn test_xcode_workspace_scheme_build() {
        let task = xcode_task(
            r#"{ "action": "BuildXcodeWorkspaceScheme", "workspace": "Kit.xcworkspace",
                 "scheme": "Kit iOS", "destination": "generic/platform=iOS",
                 "configuration": "Release" }"#,
        );
        let plan = planner().plan(&task, Path::new("d"), true).unwrap();
        assert_eq!(plan.steps.len(), 1);
        let build = &plan.steps[0];
        assert_eq!(build.program, "xcodebuild");
        assert_eq!(
            &build.args[..12],
            &[
                "clean",
                "build",
                "-workspace",
                "d/Kit.xcworkspace",
                "-scheme",
                "Kit iOS",
                "-destination",
                "generic/platform=iOS",
                "-derivedDataPath",
                "d/build",
                "-configuration",
                "Release",
            ]
        );
        assert!(build.args.contains(&"CODE_SIGNING_REQUIRED=NO".to_string()));
        assert!(build.args.contains(&"SWIFT_EXEC=/toolchain/usr/bin/swiftc".to_string()));
        assert!(build.args.contains(&"SWIFT_VERSION=5".to_string()));
        assert!(build
            .args
            .contains(&"OTHER_SWIFT_FLAGS=$(OTHER_SWIFT_FLAGS) -swift-version 5".to_string()));
    }

    #[test]
    fn test_xcode_project_target_with_pretargets() {
        let task = xcode_task(
            r#"{ "action": "BuildXcodeProjectTarget", "project": "Kit.xcodeproj",
                 "target": "Kit", "destination": "generic/platform=watchOS",
                 "pretargets": ["Dep"], "environment": { "FOO": "bar" } }"#,
        );
        let plan = planner().plan(&task, Path::new("d"), true).unwrap();
        assert_eq!(plan.steps.len(), 2);

        let prebuild = &plan.steps[0];
        assert_eq!(
            &prebuild.args[..8],
            &["clean", "build", "-project", "d/Kit.xcodeproj", "-destination",
              "generic/platform=watchOS", "-target", "Dep"]
        );

        let build = &plan.steps[1];
        assert_eq!(build.args[0], "build");
        assert!(build.args.contains(&"SYMROOT=d/build".to_string()));
        assert!(build.args.contains(&"FOO=bar".to_string()));
        assert_eq!(build.args.last().map(String::as_str), Some("ARCHS=armv7k"));
    }

    #[test]
    fn test_xcode_test_sets_library_path() {
        let task = xcode_task(
            r#"{ "action": "TestXcodeWorkspaceScheme", "workspace": "Kit.xcworkspace",
                 "scheme": "Kit", "destination": "platform=iOS Simulator,name=iPhone 15" }"#,
        );
        let plan = planner().plan(&task, Path::new("d"), false).unwrap();
        let test = &plan.steps[0];
        assert_eq!(&test.args[..2], &["clean", "test"]);
        assert!(test
            .args
            .contains(&"SWIFT_LIBRARY_PATH=/toolchain/usr/lib/swift/iphonesimulator".to_string()));
        assert_eq!(plan.checkout[0].args[0], "clone");
    }

    #[test]
    fn test_substitute_placeholders() {
        let attrs: Attributes = [("path", "Kit"), ("scheme", "App")].into_iter().collect();
        assert_eq!(substitute("-D{path} {scheme} {nope}", &attrs), "-DKit App {nope}");
    }

    #[test]
    fn test_invocation_display_quotes() {
        let inv = Invocation::new("xcodebuild")
            .args(["-scheme", "Kit iOS", "CODE_SIGN_IDENTITY="])
            .env("SWIFT_EXEC", "/t/swiftc");
        assert_eq!(
            inv.to_string(),
            "SWIFT_EXEC=/t/swiftc xcodebuild -scheme 'Kit iOS' CODE_SIGN_IDENTITY="
        );
    }

    #[test]
    fn test_swift_driver() {
        assert_eq!(swift_driver(Path::new("/a/bin/swiftc")), "/a/bin/swift");
        assert_eq!(swift_driver(Path::new("/a/bin/compiler")), "/a/bin/swift");
    }
}
