use crate::concurrency::FamilyLock;
use crate::config::BuildConfig;
use crate::lifecycle::{BuildState, BuildTracker};
use crate::{BuildError, CoreError, Stage};
use layersmith_artifact::{normalize, package, ArchiveInfo, Workspace};
use layersmith_registry::{PublishOutcome, PublishRequest, Publisher};
use layersmith_runtime::exec::log_tail;
use layersmith_runtime::{
    check_family_prereqs, check_tool, select_installer, Cancellation, ExecOptions,
    InstallContext, MissingPrereq, RuntimeInstaller,
};
use layersmith_schema::{LayerSpec, RuntimeFamily, RuntimeTag};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FAILURE_LOG_LINES: usize = 20;

/// Central orchestration engine for layersmith builds.
///
/// Each call to [`build`](Self::build) runs one layer through validation,
/// workspace acquisition, installation, normalization, and packaging, and
/// always releases the workspace before returning.
pub struct Engine {
    config: BuildConfig,
    output_dir: PathBuf,
    cancellation: Cancellation,
}

/// Result of a successful layer build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub layer: String,
    pub runtime: String,
    pub archive: PathBuf,
    pub size_bytes: u64,
    /// blake3 of the archive file.
    pub digest: String,
    pub entries: usize,
    pub stripped_libraries: usize,
    /// RFC 3339.
    pub built_at: String,
}

/// Outcome of building several layers.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub built: Vec<BuildReport>,
    pub failed: Vec<BuildError>,
    /// Layers never attempted because an earlier one failed.
    pub skipped: Vec<String>,
}

/// Progress of one layer within a batch.
#[derive(Debug)]
pub enum BuildEvent<'a> {
    Started(&'a LayerSpec),
    Built(&'a BuildReport),
    Failed(&'a BuildError),
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

impl Engine {
    /// Archives go to `config.output_dir`, or the current directory.
    pub fn new(config: BuildConfig) -> Result<Self, CoreError> {
        let output_dir = match &config.output_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Self {
            config,
            output_dir,
            cancellation: Cancellation::new(),
        })
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn archive_path(&self, spec: &LayerSpec) -> PathBuf {
        self.output_dir.join(spec.archive_file_name())
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            timeout: self.config.command_timeout(),
            cancellation: self.cancellation.clone(),
            log_path: None,
        }
    }

    /// Build one layer with the installer for its runtime family.
    pub fn build(&self, spec: &LayerSpec) -> Result<BuildReport, BuildError> {
        let mut tracker = BuildTracker::new(&spec.name);
        let tag = spec
            .validate()
            .map_err(|e| tracker.fail(Stage::Validate, e))?;
        let installer = select_installer(tag.family(), &self.config.tools.toolchain());
        self.run(spec, &tag, installer.as_ref(), tracker)
    }

    /// Build one layer with a caller-supplied installer.
    pub fn build_with_installer(
        &self,
        spec: &LayerSpec,
        installer: &dyn RuntimeInstaller,
    ) -> Result<BuildReport, BuildError> {
        let mut tracker = BuildTracker::new(&spec.name);
        let tag = spec
            .validate()
            .map_err(|e| tracker.fail(Stage::Validate, e))?;
        self.run(spec, &tag, installer, tracker)
    }

    /// Build `specs` in order. Unless `keep_going` is set, the first failure
    /// stops the batch and the remaining layers are reported as skipped.
    /// Cancellation always stops the batch.
    pub fn build_all(&self, specs: &[LayerSpec], keep_going: bool) -> BatchReport {
        self.build_all_observed(specs, keep_going, |_| {})
    }

    /// Like [`build_all`](Self::build_all), reporting each layer's progress
    /// to `observe`.
    pub fn build_all_observed(
        &self,
        specs: &[LayerSpec],
        keep_going: bool,
        mut observe: impl FnMut(BuildEvent<'_>),
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, spec) in specs.iter().enumerate() {
            observe(BuildEvent::Started(spec));
            match self.build(spec) {
                Ok(built) => {
                    observe(BuildEvent::Built(&built));
                    report.built.push(built);
                }
                Err(e) => {
                    debug!("{e}");
                    observe(BuildEvent::Failed(&e));
                    report.failed.push(e);
                    if !keep_going || self.cancellation.is_cancelled() {
                        report
                            .skipped
                            .extend(specs[i + 1..].iter().map(|s| s.name.clone()));
                        break;
                    }
                }
            }
        }
        report
    }

    fn run(
        &self,
        spec: &LayerSpec,
        tag: &RuntimeTag,
        installer: &dyn RuntimeInstaller,
        mut tracker: BuildTracker,
    ) -> Result<BuildReport, BuildError> {
        let family = tag.family();
        info!("building layer '{}' for {tag}", spec.name);

        let exec = self.exec_options();
        installer
            .validate(tag, &exec)
            .map_err(|e| tracker.fail(Stage::Validate, e))?;
        self.check_cancelled(&mut tracker, Stage::Acquire)?;

        let _lock = if self.config.lock_caches {
            Some(
                FamilyLock::acquire(&self.config.temp_root, family)
                    .map_err(|e| tracker.fail(Stage::Acquire, e))?,
            )
        } else {
            None
        };

        let workspace = Workspace::acquire(
            &self.config.temp_root,
            &self.output_dir,
            family.payload_dir(),
        )
        .map_err(|e| tracker.fail(Stage::Acquire, e))?;
        tracker.advance(BuildState::WorkspaceAcquired)?;

        let exec = exec.with_log(workspace.log_path());
        let result = self.run_stages(spec, installer, &workspace, &exec, &mut tracker);
        if let Err(e) = &result {
            let tail = log_tail(&workspace.log_path(), FAILURE_LOG_LINES);
            if !tail.is_empty() {
                warn!(
                    "last lines of build log for '{}' ({}):\n{}",
                    e.layer,
                    e.stage,
                    tail.join("\n")
                );
            }
        }

        if let Err(e) = workspace.release() {
            warn!("{e}");
        }

        let (archive, stripped) = result?;
        tracker.advance(BuildState::Done)?;
        info!(
            "layer '{}' built: {} ({} bytes)",
            spec.name,
            archive.path.display(),
            archive.size_bytes
        );
        Ok(BuildReport {
            layer: spec.name.clone(),
            runtime: tag.to_string(),
            archive: archive.path,
            size_bytes: archive.size_bytes,
            digest: archive.digest,
            entries: archive.entries,
            stripped_libraries: stripped,
            built_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn run_stages(
        &self,
        spec: &LayerSpec,
        installer: &dyn RuntimeInstaller,
        workspace: &Workspace,
        exec: &ExecOptions,
        tracker: &mut BuildTracker,
    ) -> Result<(ArchiveInfo, usize), BuildError> {
        let ctx = InstallContext::new(workspace.root(), workspace.payload_root())
            .with_exec(exec.clone())
            .with_isolated_caches(self.config.isolate_caches);
        installer
            .install(&ctx, spec)
            .map_err(|e| tracker.fail(Stage::Install, e))?;
        tracker.advance(BuildState::Installed)?;
        self.check_cancelled(tracker, Stage::Normalize)?;

        let normalized = normalize(workspace.payload_root(), spec, &self.config.tools.strip, exec)
            .map_err(|e| tracker.fail(Stage::Normalize, e))?;
        tracker.advance(BuildState::Normalized)?;
        self.check_cancelled(tracker, Stage::Package)?;

        let dest = workspace.origin().join(spec.archive_file_name());
        let archive = package(
            workspace.root(),
            workspace.payload_dir_name(),
            &spec.excludes,
            &dest,
        )
        .map_err(|e| tracker.fail(Stage::Package, e))?;
        tracker.advance(BuildState::Packaged)?;
        Ok((archive, normalized.stripped.len()))
    }

    fn check_cancelled(&self, tracker: &mut BuildTracker, next: Stage) -> Result<(), BuildError> {
        if self.cancellation.is_cancelled() {
            return Err(tracker.fail(next, CoreError::Cancelled));
        }
        Ok(())
    }

    /// Register the already built archive of `spec` with the registry.
    pub fn publish(&self, spec: &LayerSpec) -> Result<PublishOutcome, CoreError> {
        let archive = self.archive_path(spec);
        let publisher = Publisher::new(self.config.registry.clone()).with_exec(self.exec_options());
        Ok(publisher.publish(&PublishRequest::from_spec(spec, &archive))?)
    }

    /// Host tools missing for building `families`.
    pub fn missing_prerequisites(&self, families: &[RuntimeFamily]) -> Vec<MissingPrereq> {
        let toolchain = self.config.tools.toolchain();
        let mut missing: Vec<MissingPrereq> = Vec::new();
        for family in families {
            for m in check_family_prereqs(*family, &toolchain) {
                if !missing.iter().any(|seen| seen.name == m.name) {
                    missing.push(m);
                }
            }
        }
        if let Some(m) = check_tool(
            &self.config.tools.strip,
            "stripping native libraries",
            "apt install binutils | dnf install binutils",
        ) {
            missing.push(m);
        }
        missing
    }
}
