//! Resolver backed by command templates from configuration.
//!
//! ```toml
//! [commands.build]
//! program = "{engine}/Engine/Build/BatchFiles/Linux/Build.sh"
//! args = ["{target}", "{platform}", "{configuration}", "-Project={project}"]
//!
//! [commands.generate.fallback]
//! program = "dotnet"
//! args = ["{engine}/Engine/Binaries/DotNET/UnrealBuildTool/UnrealBuildTool.dll", "-projectfiles"]
//! cwd = "{engine}"
//! ```
//!
//! Placeholders are lowercase names in braces. Anything else in braces,
//! such as a shell `${VAR}`, is passed through untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::job::{Invocation, JobKind, JobRequest};

use super::{CommandResolver, ResolveError, ResolvedCommands};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// One templated command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// A `[commands.<kind>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    #[serde(flatten)]
    pub primary: InvocationTemplate,
    #[serde(default)]
    pub fallback: Option<InvocationTemplate>,
}

/// Values substituted into templates.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: BTreeMap<&'static str, Option<String>>,
}

impl Placeholders {
    /// Placeholder values for a request.
    pub fn for_request(request: &JobRequest, engine_root: Option<&Path>) -> Self {
        let project = request.project.as_deref();
        let mut values = BTreeMap::new();
        values.insert("project", project.map(|p| p.display().to_string()));
        values.insert(
            "project_dir",
            project
                .and_then(Path::parent)
                .map(|p| p.display().to_string()),
        );
        values.insert("engine", engine_root.map(|p| p.display().to_string()));
        values.insert("target", Some(request.key().target));
        values.insert("platform", Some(request.platform.clone()));
        values.insert("configuration", Some(request.configuration.clone()));
        Placeholders { values }
    }

    /// Substitute every placeholder in `template`.
    pub fn expand(&self, kind: JobKind, template: &str) -> Result<String, ResolveError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            out.push_str(&self.lookup(kind, name.as_str())?);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn lookup(&self, kind: JobKind, name: &str) -> Result<String, ResolveError> {
        match self.values.get(name) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) if name == "engine" => Err(ResolveError::MissingEngine),
            Some(None) => Err(ResolveError::MissingProject { kind }),
            None => Err(ResolveError::UnknownPlaceholder {
                kind,
                name: name.to_string(),
            }),
        }
    }

    fn invocation(&self, kind: JobKind, t: &InvocationTemplate) -> Result<Invocation, ResolveError> {
        let mut invocation = Invocation::new(self.expand(kind, &t.program)?);
        for arg in &t.args {
            invocation.args.push(self.expand(kind, arg)?);
        }
        if let Some(cwd) = &t.cwd {
            invocation.cwd = Some(PathBuf::from(self.expand(kind, cwd)?));
        }
        Ok(invocation)
    }
}

/// Resolves from templates, deferring to a base resolver for other kinds.
pub struct ConfiguredResolver {
    templates: BTreeMap<JobKind, CommandTemplate>,
    engine_root: Option<PathBuf>,
    base: Option<Box<dyn CommandResolver>>,
}

impl ConfiguredResolver {
    pub fn new(templates: BTreeMap<JobKind, CommandTemplate>) -> Self {
        ConfiguredResolver {
            templates,
            engine_root: None,
            base: None,
        }
    }

    /// Engine root used for the `{engine}` placeholder.
    pub fn with_engine_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.engine_root = Some(root.into());
        self
    }

    /// Resolver used for kinds without a template.
    pub fn with_base(mut self, base: Box<dyn CommandResolver>) -> Self {
        self.base = Some(base);
        self
    }

    /// Whether a template exists for `kind`.
    pub fn has_template(&self, kind: JobKind) -> bool {
        self.templates.contains_key(&kind)
    }
}

impl CommandResolver for ConfiguredResolver {
    fn resolve(&self, request: &JobRequest) -> Result<ResolvedCommands, ResolveError> {
        let Some(template) = self.templates.get(&request.kind) else {
            return match &self.base {
                Some(base) => base.resolve(request),
                None => Err(ResolveError::Unsupported { kind: request.kind }),
            };
        };

        let vars = Placeholders::for_request(request, self.engine_root.as_deref());
        let kind = request.kind;
        let mut primary = vars.invocation(kind, &template.primary)?;
        let mut resolved = match primary.cwd.take() {
            Some(cwd) => ResolvedCommands::new(primary).with_cwd(cwd),
            None => ResolvedCommands::new(primary),
        };
        if let Some(fallback) = &template.fallback {
            resolved.fallback = Some(vars.invocation(kind, fallback)?);
        }
        if resolved.cwd.is_none() {
            resolved.cwd = request
                .project
                .as_deref()
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf);
        }
        Ok(resolved)
    }

    fn name(&self) -> &'static str {
        "configured"
    }
}
