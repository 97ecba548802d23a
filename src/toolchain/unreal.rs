//! Resolver for an Unreal Engine install.
//!
//! Layout relied upon, relative to the engine root:
//!
//! - `Engine/Build/BatchFiles/<Host>/Build.sh` (`Build.bat` on Windows)
//! - `Engine/Build/BatchFiles/RunUAT.sh|bat`
//! - `GenerateProjectFiles.sh|bat`
//! - `Engine/Binaries/DotNET/UnrealBuildTool/UnrealBuildTool.dll`
//! - `Engine/Binaries/<Platform>/UnrealEditor[.exe]`

use std::path::{Path, PathBuf};

use crate::core::job::{Invocation, JobKind, JobRequest};

use super::{CommandResolver, HostPlatform, ResolveError, ResolvedCommands};

/// Resolves jobs to the engine's own scripts.
#[derive(Debug, Clone)]
pub struct UnrealResolver {
    engine_root: PathBuf,
    host: HostPlatform,
}

impl UnrealResolver {
    pub fn new(engine_root: impl Into<PathBuf>) -> Self {
        UnrealResolver {
            engine_root: engine_root.into(),
            host: HostPlatform::current(),
        }
    }

    /// Resolve for a different host (script flavour and binary layout).
    pub fn with_host(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    pub fn engine_root(&self) -> &Path {
        &self.engine_root
    }

    fn batch_files(&self) -> PathBuf {
        self.engine_root.join("Engine").join("Build").join("BatchFiles")
    }

    /// Path to the build script.
    pub fn build_script(&self) -> PathBuf {
        match self.host {
            HostPlatform::Windows => self.batch_files().join("Build.bat"),
            host => self
                .batch_files()
                .join(host.engine_name())
                .join("Build.sh"),
        }
    }

    /// Path to the automation tool launcher.
    pub fn run_uat(&self) -> PathBuf {
        self.batch_files()
            .join(format!("RunUAT.{}", self.host.script_ext()))
    }

    /// Path to the project-file generation script.
    pub fn generate_script(&self) -> PathBuf {
        self.engine_root
            .join(format!("GenerateProjectFiles.{}", self.host.script_ext()))
    }

    /// Path to the build tool assembly used by the generation fallback.
    pub fn build_tool_dll(&self) -> PathBuf {
        self.engine_root
            .join("Engine")
            .join("Binaries")
            .join("DotNET")
            .join("UnrealBuildTool")
            .join("UnrealBuildTool.dll")
    }

    /// Path to the editor executable.
    pub fn editor_binary(&self) -> PathBuf {
        let binaries = self
            .engine_root
            .join("Engine")
            .join("Binaries")
            .join(self.host.engine_name());
        match self.host {
            HostPlatform::Windows => binaries.join("UnrealEditor.exe"),
            HostPlatform::Linux => binaries.join("UnrealEditor"),
            HostPlatform::Mac => binaries
                .join("UnrealEditor.app")
                .join("Contents")
                .join("MacOS")
                .join("UnrealEditor"),
        }
    }

    /// All scripts this resolver may invoke, for environment checks.
    pub fn scripts(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("build script", self.build_script()),
            ("automation tool", self.run_uat()),
            ("project file generator", self.generate_script()),
            ("editor", self.editor_binary()),
        ]
    }

    fn build_args(&self, request: &JobRequest, project: &Path) -> Vec<String> {
        let key = request.key();
        vec![
            key.target,
            request.platform.clone(),
            request.configuration.clone(),
            format!("-Project={}", project.display()),
            "-WaitMutex".to_string(),
        ]
    }

    fn build_cook_run(&self, request: &JobRequest, project: &Path, package: bool) -> Vec<String> {
        let mut args = vec![
            "BuildCookRun".to_string(),
            format!("-project={}", project.display()),
            "-noP4".to_string(),
            format!("-platform={}", request.platform),
            format!("-clientconfig={}", request.configuration),
            "-utf8output".to_string(),
        ];
        if package {
            let archive = project
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("Packaged");
            args.extend([
                "-build".to_string(),
                "-cook".to_string(),
                "-stage".to_string(),
                "-pak".to_string(),
                "-archive".to_string(),
                format!("-archivedirectory={}", archive.display()),
            ]);
        } else {
            args.extend([
                "-cook".to_string(),
                "-skipstage".to_string(),
                "-nocompileeditor".to_string(),
            ]);
        }
        args
    }
}

impl CommandResolver for UnrealResolver {
    fn resolve(&self, request: &JobRequest) -> Result<ResolvedCommands, ResolveError> {
        let project = request
            .project
            .as_deref()
            .ok_or(ResolveError::MissingProject { kind: request.kind })?;

        let resolved = match request.kind {
            JobKind::Build => ResolvedCommands::new(
                Invocation::new(self.build_script()).args(self.build_args(request, project)),
            ),
            JobKind::Clean => {
                let mut args = self.build_args(request, project);
                args.push("-clean".to_string());
                ResolvedCommands::new(Invocation::new(self.build_script()).args(args))
            }
            JobKind::Cook => ResolvedCommands::new(
                Invocation::new(self.run_uat()).args(self.build_cook_run(request, project, false)),
            ),
            JobKind::Package => ResolvedCommands::new(
                Invocation::new(self.run_uat()).args(self.build_cook_run(request, project, true)),
            ),
            JobKind::Generate => {
                let project_arg = format!("-project={}", project.display());
                let primary = Invocation::new(self.generate_script())
                    .args([project_arg.clone(), "-game".to_string()]);
                let fallback = Invocation::new("dotnet")
                    .args([
                        self.build_tool_dll().display().to_string(),
                        "-projectfiles".to_string(),
                        project_arg,
                        "-game".to_string(),
                    ])
                    .cwd(&self.engine_root);
                ResolvedCommands::new(primary).with_fallback(fallback)
            }
            JobKind::Editor => ResolvedCommands::new(
                Invocation::new(self.editor_binary()).args([project.display().to_string()]),
            ),
        };

        Ok(match project.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => resolved.with_cwd(dir),
            _ => resolved,
        })
    }

    fn name(&self) -> &'static str {
        "unreal"
    }
}
