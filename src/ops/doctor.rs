//! Environment health checks.
//!
//! The `doctor` command performs fast checks to verify that the engine
//! install and project are where the configuration says they are.
//!
//! ## Usage
//!
//! ```bash
//! stagehand doctor           # Quick check
//! stagehand doctor --verbose # Detailed output
//! ```
//!
//! ## Checks Performed
//!
//! - Engine root configured and present
//! - Project descriptor found
//! - Engine scripts present and executable
//! - `dotnet` availability (project-file generation fallback)
//! - Programs named by `[commands.<kind>]` templates

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::toolchain::{HostPlatform, UnrealResolver};
use crate::util::fs::is_executable;
use crate::util::process::find_executable;
use crate::util::GlobalContext;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// How long the check took
    #[serde(skip)]
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..Self::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,

    /// Total time taken
    #[serde(skip)]
    pub total_duration: Duration,

    /// Environment information
    pub environment: BTreeMap<String, String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Run all checks against the context's configuration.
pub fn doctor(ctx: &GlobalContext) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();
    let config = ctx.config();
    let host = HostPlatform::current();

    report.environment.insert("os".to_string(), std::env::consts::OS.to_string());
    report.environment.insert("arch".to_string(), std::env::consts::ARCH.to_string());
    report.environment.insert("platform".to_string(), host.engine_name().to_string());
    if let Some(root) = ctx.project_root() {
        report
            .environment
            .insert("project_root".to_string(), root.display().to_string());
    }

    // Templates can stand in for the engine entirely.
    let templated = !config.commands.is_empty();
    let engine = check_engine_root(config.engine.root.as_deref());
    report.add(if templated { engine.optional() } else { engine });

    report.add(check_project(ctx.find_project_file()));

    if let Some(root) = config.engine.root.as_deref().filter(|r| r.is_dir()) {
        let resolver = UnrealResolver::new(root).with_host(host);
        for (index, (name, path)) in resolver.scripts().into_iter().enumerate() {
            let check = check_script(name, &path);
            // Only the build script is needed for the common case.
            report.add(if index == 0 && !templated {
                check
            } else {
                check.optional()
            });
        }
    }

    report.add(check_dotnet());

    for (kind, template) in config.command_templates() {
        report.add(check_program(
            &format!("command `{}`", kind),
            &template.primary.program,
        ));
        if let Some(fallback) = &template.fallback {
            report.add(
                check_program(&format!("command `{}` fallback", kind), &fallback.program)
                    .optional(),
            );
        }
    }

    report.total_duration = start.elapsed();
    report
}

fn check_engine_root(root: Option<&Path>) -> CheckResult {
    match root {
        None => CheckResult::fail("Engine root", "not configured; set [engine] root"),
        Some(root) if root.is_dir() => {
            CheckResult::pass("Engine root", "found").with_path(root.to_path_buf())
        }
        Some(root) => CheckResult::fail("Engine root", "directory does not exist")
            .with_path(root.to_path_buf()),
    }
}

fn check_project(project: Option<PathBuf>) -> CheckResult {
    match project {
        Some(path) if path.is_file() => CheckResult::pass("Project", "found").with_path(path),
        Some(path) => CheckResult::fail("Project", "project file does not exist").with_path(path),
        None => CheckResult::fail("Project", "no project file found"),
    }
}

fn check_script(name: &str, path: &Path) -> CheckResult {
    let start = Instant::now();
    let result = if !path.exists() {
        CheckResult::fail(name, "missing")
    } else if !is_executable(path) {
        CheckResult::fail(name, "not executable")
    } else {
        CheckResult::pass(name, "found")
    };
    result
        .with_path(path.to_path_buf())
        .with_duration(start.elapsed())
}

fn check_dotnet() -> CheckResult {
    let start = Instant::now();
    let result = match find_executable("dotnet") {
        Some(path) => {
            let version = tool_version("dotnet", "--version")
                .unwrap_or_else(|| "unknown version".to_string());
            CheckResult::pass("dotnet", "found")
                .with_path(path)
                .with_version(version)
        }
        None => CheckResult::fail("dotnet", "not found in PATH (needed to regenerate project files)"),
    };
    result.optional().with_duration(start.elapsed())
}

/// Check a template program: a path that exists, or a name found in PATH.
fn check_program(name: &str, program: &str) -> CheckResult {
    // Programs that still contain placeholders are only known at run time.
    if program.contains('{') {
        return CheckResult::pass(name, format!("`{}` resolved at run time", program));
    }

    let path = Path::new(program);
    let found = if path.components().count() > 1 {
        path.exists().then(|| path.to_path_buf())
    } else {
        find_executable(program)
    };
    match found {
        Some(path) => CheckResult::pass(name, format!("found `{}`", program)).with_path(path),
        None => CheckResult::fail(name, format!("`{}` not found", program)),
    }
}

fn tool_version(program: &str, flag: &str) -> Option<String> {
    let output = Command::new(program).arg(flag).output().ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Format the doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Stagehand Doctor");
    let _ = writeln!(output, "================\n");

    if verbose {
        let _ = writeln!(output, "Environment:");
        for (key, value) in &report.environment {
            let _ = writeln!(output, "  {}: {}", key, value);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };
        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }

    let _ = writeln!(output);

    let failed = report.failed_count();
    let required_failed = report.required_failed_count();
    let _ = writeln!(
        output,
        "Summary: {} passed, {} failed",
        report.passed_count(),
        failed
    );

    if required_failed > 0 {
        let _ = writeln!(
            output,
            "\nWarning: {} required check(s) failed. Jobs may not start.",
            required_failed
        );
    } else if failed > 0 {
        let _ = writeln!(
            output,
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        );
    } else {
        let _ = writeln!(output, "\nAll checks passed. Stagehand is ready to use.");
    }

    output
}
