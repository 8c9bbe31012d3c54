// ABOUTME: Build labels, targets, packages, and the thread-safe graph the
// interpreter registers targets into

use crate::error::{EvalError, EvalResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A fully qualified target identifier: `//package:name`, optionally
/// subrepo-qualified as `@subrepo//package:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildLabel {
    pub subrepo: String,
    pub package: String,
    pub name: String,
}

impl BuildLabel {
    pub fn new(package: &str, name: &str) -> Self {
        BuildLabel {
            subrepo: String::new(),
            package: package.to_owned(),
            name: name.to_owned(),
        }
    }

    /// Parses a label in the context of a package. Pseudo-labels (`:all`,
    /// `/...`) are rejected; only the visibility parser accepts them.
    pub fn parse(s: &str, current_pkg: &str, current_subrepo: &str) -> EvalResult<Self> {
        let label = Self::parse_raw(s, current_pkg, current_subrepo)?;
        if label.name == "all" || label.name == "..." || label.package.ends_with("...") {
            return Err(EvalError::invariant(format!(
                "pseudo-label '{s}' is not allowed here"
            )));
        }
        Ok(label)
    }

    /// Parses a visibility specification: `PUBLIC` (or its Bazel-flavoured
    /// alias) expands to the whole graph; `:all` and `/...` pseudo-labels
    /// are normalized rather than rejected.
    pub fn parse_visibility(s: &str, current_pkg: &str) -> EvalResult<Self> {
        if s == "PUBLIC" || s == "//visibility:public" {
            return Ok(BuildLabel {
                subrepo: String::new(),
                package: "...".to_owned(),
                name: "all".to_owned(),
            });
        }
        let mut label = Self::parse_raw(s, current_pkg, "")?;
        if label.package.ends_with("...") {
            label.name = "all".to_owned();
        }
        Ok(label)
    }

    fn parse_raw(s: &str, current_pkg: &str, current_subrepo: &str) -> EvalResult<Self> {
        if s.is_empty() {
            return Err(EvalError::value_error("empty build label"));
        }
        let (subrepo, rest) = if let Some(stripped) = s.strip_prefix('@') {
            match stripped.find("//") {
                Some(i) => (stripped[..i].to_owned(), &stripped[i..]),
                None => {
                    return Err(EvalError::value_error(format!("invalid build label: {s}")));
                }
            }
        } else {
            (current_subrepo.to_owned(), s)
        };
        if let Some(rest) = rest.strip_prefix("//") {
            let (package, name) = match rest.find(':') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                // //foo/bar is shorthand for //foo/bar:bar.
                None => (rest, rest.rsplit('/').next().unwrap_or(rest)),
            };
            if name.is_empty() {
                return Err(EvalError::value_error(format!("invalid build label: {s}")));
            }
            return Ok(BuildLabel {
                subrepo,
                package: package.to_owned(),
                name: name.to_owned(),
            });
        }
        if let Some(name) = rest.strip_prefix(':') {
            if name.is_empty() {
                return Err(EvalError::value_error(format!("invalid build label: {s}")));
            }
            return Ok(BuildLabel {
                subrepo,
                package: current_pkg.to_owned(),
                name: name.to_owned(),
            });
        }
        Err(EvalError::value_error(format!("invalid build label: {s}")))
    }

    /// Whether this label covers the entire graph (from `PUBLIC`).
    pub fn is_whole_graph(&self) -> bool {
        self.package == "..." && self.name == "all"
    }
}

impl fmt::Display for BuildLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subrepo.is_empty() {
            write!(f, "//{}:{}", self.package, self.name)
        } else {
            write!(f, "@{}//{}:{}", self.subrepo, self.package, self.name)
        }
    }
}

/// Whether a string should be parsed as a build label rather than a path.
pub fn looks_like_label(s: &str) -> bool {
    s.starts_with("//") || s.starts_with(':') || s.starts_with('@')
}

/// A build or test command: either one string or a map keyed by config name.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Command {
    #[default]
    Unset,
    Plain(String),
    PerConfig(BTreeMap<String, String>),
}

impl Command {
    pub fn is_set(&self) -> bool {
        !matches!(self, Command::Unset)
    }
}

/// One source/data/tool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A file within the package.
    File(String),
    /// An absolute path, allowed only for system sources.
    SystemFile(String),
    /// The outputs of another target.
    Label(BuildLabel),
    /// A binary found on the host PATH (tools only).
    SystemPath(String),
}

/// Inputs in anonymous or named-group form; exactly one form is populated.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    pub anonymous: Vec<Input>,
    pub named: BTreeMap<String, Vec<Input>>,
}

impl InputSet {
    pub fn is_empty(&self) -> bool {
        self.anonymous.is_empty() && self.named.is_empty()
    }

    /// All inputs regardless of grouping.
    pub fn iter_all(&self) -> impl Iterator<Item = &Input> {
        self.anonymous
            .iter()
            .chain(self.named.values().flatten())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    pub anonymous: Vec<String>,
    pub named: BTreeMap<String, Vec<String>>,
}

impl OutputSet {
    pub fn iter_all(&self) -> impl Iterator<Item = &String> {
        self.anonymous
            .iter()
            .chain(self.named.values().flatten())
    }
}

pub type PreBuildCallback = Box<dyn Fn(&str) -> EvalResult<()> + Send + Sync>;
pub type PostBuildCallback = Box<dyn Fn(&str, &[String]) -> EvalResult<()> + Send + Sync>;

/// A build target. Scalar attributes are fixed at construction; outputs,
/// dependencies and labels stay behind locks because pre/post-build
/// callbacks may extend them after registration.
pub struct Target {
    pub label: BuildLabel,
    pub binary: bool,
    pub test: bool,
    pub sandbox: bool,
    pub test_sandbox: bool,
    pub build_timeout: Duration,
    pub test_timeout: Duration,
    /// Total number of times a test may run; 1 means not flaky.
    pub flakiness: i32,
    pub size: Option<String>,
    pub command: Command,
    pub test_command: Command,
    pub srcs: InputSet,
    pub data: InputSet,
    pub tools: InputSet,
    pub secrets: Vec<String>,
    pub entry_points: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub visibility: Vec<BuildLabel>,
    outs: RwLock<OutputSet>,
    deps: RwLock<Vec<BuildLabel>>,
    labels: RwLock<BTreeSet<String>>,
    pre_build: RwLock<Option<PreBuildCallback>>,
    post_build: RwLock<Option<PostBuildCallback>>,
}

impl Target {
    pub fn new(label: BuildLabel) -> Self {
        Target {
            label,
            binary: false,
            test: false,
            sandbox: false,
            test_sandbox: false,
            build_timeout: Duration::ZERO,
            test_timeout: Duration::ZERO,
            flakiness: 1,
            size: None,
            command: Command::Unset,
            test_command: Command::Unset,
            srcs: InputSet::default(),
            data: InputSet::default(),
            tools: InputSet::default(),
            secrets: Vec::new(),
            entry_points: BTreeMap::new(),
            env: BTreeMap::new(),
            visibility: Vec::new(),
            outs: RwLock::new(OutputSet::default()),
            deps: RwLock::new(Vec::new()),
            labels: RwLock::new(BTreeSet::new()),
            pre_build: RwLock::new(None),
            post_build: RwLock::new(None),
        }
    }

    pub fn add_dep(&self, dep: BuildLabel) {
        let mut deps = self.deps.write();
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    pub fn deps(&self) -> Vec<BuildLabel> {
        self.deps.read().clone()
    }

    pub fn add_label(&self, label: impl Into<String>) {
        self.labels.write().insert(label.into());
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.read().contains(label)
    }

    /// Labels in sorted order.
    pub fn labels(&self) -> Vec<String> {
        self.labels.read().iter().cloned().collect()
    }

    pub fn add_out(&self, out: impl Into<String>) {
        self.outs.write().anonymous.push(out.into());
    }

    pub fn add_named_out(&self, group: &str, out: impl Into<String>) {
        self.outs
            .write()
            .named
            .entry(group.to_owned())
            .or_default()
            .push(out.into());
    }

    pub fn set_outs(&self, outs: OutputSet) {
        *self.outs.write() = outs;
    }

    pub fn outs(&self) -> OutputSet {
        self.outs.read().clone()
    }

    pub fn set_deps(&self, deps: Vec<BuildLabel>) {
        *self.deps.write() = deps;
    }

    pub fn set_pre_build(&self, cb: PreBuildCallback) {
        *self.pre_build.write() = Some(cb);
    }

    pub fn set_post_build(&self, cb: PostBuildCallback) {
        *self.post_build.write() = Some(cb);
    }

    pub fn has_pre_build(&self) -> bool {
        self.pre_build.read().is_some()
    }

    pub fn has_post_build(&self) -> bool {
        self.post_build.read().is_some()
    }

    /// Invoked by the graph just before building this target.
    pub fn run_pre_build(&self) -> EvalResult<()> {
        let guard = self.pre_build.read();
        match guard.as_ref() {
            Some(cb) => cb(&self.label.to_string()),
            None => Ok(()),
        }
    }

    /// Invoked by the graph after the build step, with captured stdout
    /// lines.
    pub fn run_post_build(&self, output: &[String]) -> EvalResult<()> {
        let guard = self.post_build.read();
        match guard.as_ref() {
            Some(cb) => cb(&self.label.to_string(), output),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("label", &self.label)
            .field("binary", &self.binary)
            .field("test", &self.test)
            .finish()
    }
}

/// A collection of targets rooted at one directory.
pub struct Package {
    pub name: String,
    pub subrepo: String,
    targets: RwLock<HashMap<String, Arc<Target>>>,
    /// Output path -> owning target name.
    outputs: RwLock<HashMap<String, String>>,
}

impl Package {
    pub fn new(name: &str) -> Arc<Package> {
        Arc::new(Package {
            name: name.to_owned(),
            subrepo: String::new(),
            targets: RwLock::new(HashMap::new()),
            outputs: RwLock::new(HashMap::new()),
        })
    }

    pub fn add_target(&self, target: Target) -> EvalResult<Arc<Target>> {
        let mut targets = self.targets.write();
        let name = target.label.name.clone();
        if targets.contains_key(&name) {
            return Err(EvalError::value_error(format!(
                "duplicate target name '{}' in package //{}",
                name, self.name
            )));
        }
        let target = Arc::new(target);
        targets.insert(name, target.clone());
        Ok(target)
    }

    pub fn target(&self, name: &str) -> Option<Arc<Target>> {
        self.targets.read().get(name).cloned()
    }

    pub fn target_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.targets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Records an output file as owned by a target; two targets cannot own
    /// the same path.
    pub fn register_output(&self, path: &str, target_name: &str) -> EvalResult<()> {
        let mut outputs = self.outputs.write();
        if let Some(owner) = outputs.get(path) {
            if owner != target_name {
                return Err(EvalError::value_error(format!(
                    "output file {path} is owned by both :{owner} and :{target_name}"
                )));
            }
            return Ok(());
        }
        outputs.insert(path.to_owned(), target_name.to_owned());
        Ok(())
    }

    pub fn output_owner(&self, path: &str) -> Option<String> {
        self.outputs.read().get(path).cloned()
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package").field("name", &self.name).finish()
    }
}

/// The shared build graph. Registration is thread-safe; multiple package
/// evaluations add targets concurrently.
#[derive(Default)]
pub struct Graph {
    packages: RwLock<HashMap<String, Arc<Package>>>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    fn key(subrepo: &str, name: &str) -> String {
        if subrepo.is_empty() {
            name.to_owned()
        } else {
            format!("{subrepo}//{name}")
        }
    }

    /// Registers a package, failing on duplicates.
    pub fn add_package(&self, pkg: Arc<Package>) -> EvalResult<()> {
        let key = Self::key(&pkg.subrepo, &pkg.name);
        let mut packages = self.packages.write();
        if packages.contains_key(&key) {
            return Err(EvalError::value_error(format!(
                "duplicate package //{}",
                pkg.name
            )));
        }
        packages.insert(key, pkg);
        Ok(())
    }

    /// Registers a package if absent, returning the registered instance.
    pub fn ensure_package(&self, pkg: Arc<Package>) -> Arc<Package> {
        let key = Self::key(&pkg.subrepo, &pkg.name);
        let mut packages = self.packages.write();
        packages.entry(key).or_insert(pkg).clone()
    }

    pub fn package(&self, subrepo: &str, name: &str) -> Option<Arc<Package>> {
        self.packages.read().get(&Self::key(subrepo, name)).cloned()
    }

    /// Looks a target up by label.
    pub fn target(&self, label: &BuildLabel) -> Option<Arc<Target>> {
        self.package(&label.subrepo, &label.package)
            .and_then(|p| p.target(&label.name))
    }
}
