use crate::exec::ExecOptions;
use crate::installer::{move_dir, InstallContext, RuntimeInstaller};
use crate::RuntimeError;
use layersmith_schema::{RuntimeFamily, RuntimeTag};
use std::path::PathBuf;
use std::sync::Mutex;

const ENV_DIR: &str = "mock-env";

/// In-process installer that fabricates a plausible dependency tree without
/// touching the network or any package manager. Records every stage call.
pub struct MockInstaller {
    family: RuntimeFamily,
    local: RuntimeTag,
    shell: String,
    failing_requirement: Option<String>,
    native_libs: bool,
    calls: Mutex<Vec<String>>,
}

impl MockInstaller {
    pub fn new(family: RuntimeFamily) -> Self {
        let local = match family {
            RuntimeFamily::Python => RuntimeTag::python(3, 12),
            RuntimeFamily::Node => RuntimeTag::node(20),
        };
        Self {
            family,
            local,
            shell: "/bin/sh".to_owned(),
            failing_requirement: None,
            native_libs: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pretend the host toolchain is `tag`.
    #[must_use]
    pub fn with_local(mut self, tag: RuntimeTag) -> Self {
        self.local = tag;
        self
    }

    /// Make installing `requirement` fail like a non-zero installer exit.
    #[must_use]
    pub fn failing_on(mut self, requirement: &str) -> Self {
        self.failing_requirement = Some(requirement.to_owned());
        self
    }

    /// Also drop a native shared library into every installed package.
    #[must_use]
    pub fn with_native_libs(mut self) -> Self {
        self.native_libs = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn output_dir_name(&self) -> &'static str {
        match self.family {
            RuntimeFamily::Python => "lib",
            RuntimeFamily::Node => "node_modules",
        }
    }

    fn env_output(&self, ctx: &InstallContext) -> PathBuf {
        ctx.workspace.join(ENV_DIR).join(self.output_dir_name())
    }
}

impl RuntimeInstaller for MockInstaller {
    fn family(&self) -> RuntimeFamily {
        self.family
    }

    fn shell(&self) -> &str {
        &self.shell
    }

    fn detect(&self, _exec: &ExecOptions) -> Result<RuntimeTag, RuntimeError> {
        Ok(self.local.clone())
    }

    fn prepare_environment(&self, ctx: &InstallContext) -> Result<(), RuntimeError> {
        self.record("prepare".to_owned());
        std::fs::create_dir_all(self.env_output(ctx))?;
        Ok(())
    }

    fn install_all(&self, ctx: &InstallContext, requirements: &[String]) -> Result<(), RuntimeError> {
        let out = self.env_output(ctx);
        for requirement in requirements {
            self.record(format!("install:{requirement}"));
            if self.failing_requirement.as_deref() == Some(requirement.as_str()) {
                return Err(RuntimeError::ToolFailed {
                    command: format!("mock install {requirement}"),
                    code: Some(1),
                });
            }
            let pkg = out.join(requirement);
            std::fs::create_dir_all(pkg.join("tests"))?;
            std::fs::create_dir_all(pkg.join("__pycache__"))?;
            std::fs::write(pkg.join("__init__.py"), format!("# {requirement}\n"))?;
            std::fs::write(pkg.join("tests").join("test_basic.py"), "def test(): pass\n")?;
            std::fs::write(
                pkg.join("__pycache__").join("__init__.cpython-312.pyc"),
                [0u8; 16],
            )?;
            if self.native_libs {
                std::fs::write(pkg.join("_speedups.so"), b"\x7fELF mock")?;
            }
        }
        Ok(())
    }

    fn snapshot(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        self.record("snapshot".to_owned());
        let path = self.snapshot_path(ctx);
        let mut listing = String::new();
        for entry in std::fs::read_dir(self.env_output(ctx))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            listing.push_str(&format!("{name}==0.0.0-mock\n"));
        }
        std::fs::write(&path, listing)?;
        Ok(path)
    }

    fn relocate(&self, ctx: &InstallContext) -> Result<PathBuf, RuntimeError> {
        self.record("relocate".to_owned());
        move_dir(
            &self.env_output(ctx),
            &ctx.payload_root.join(self.output_dir_name()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersmith_schema::LayerSpec;

    fn ctx(dir: &std::path::Path) -> InstallContext {
        InstallContext::new(dir, dir.join("python"))
    }

    #[test]
    fn mock_install_produces_payload() {
        let dir = tempfile::tempdir().unwrap();
        let installer = MockInstaller::new(RuntimeFamily::Python);
        let spec = LayerSpec::new("utils", "python3.12").with_requirements(["requests", "six"]);

        installer.install(&ctx(dir.path()), &spec).unwrap();

        let payload = dir.path().join("python");
        assert!(payload.join("lib/requests/__init__.py").is_file());
        assert!(payload.join("lib/six/__init__.py").is_file());
        let snapshot = std::fs::read_to_string(payload.join("requirements.txt")).unwrap();
        assert!(snapshot.contains("requests==0.0.0-mock"));
        assert!(!dir.path().join("mock-env/lib").exists());
    }

    #[test]
    fn mock_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let installer = MockInstaller::new(RuntimeFamily::Python);
        let spec = LayerSpec::new("utils", "python3.12").with_requirements(["a", "b"]);
        installer.install(&ctx(dir.path()), &spec).unwrap();
        assert_eq!(
            installer.calls(),
            vec!["prepare", "install:a", "install:b", "snapshot", "relocate"]
        );
    }

    #[test]
    fn mock_failure_is_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let installer = MockInstaller::new(RuntimeFamily::Python).failing_on("b");
        let spec = LayerSpec::new("utils", "python3.12").with_requirements(["a", "b", "c"]);
        assert!(installer.install(&ctx(dir.path()), &spec).is_err());
        assert_eq!(installer.calls(), vec!["prepare", "install:a", "install:b"]);
    }

    #[test]
    fn node_mock_relocates_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let installer = MockInstaller::new(RuntimeFamily::Node);
        let spec = LayerSpec::new("web", "nodejs20.x").with_requirements(["express"]);
        let ctx = InstallContext::new(dir.path(), dir.path().join("nodejs"));
        installer.install(&ctx, &spec).unwrap();
        assert!(dir.path().join("nodejs/node_modules/express").is_dir());
        assert!(dir.path().join("nodejs/dependencies.txt").is_file());
    }
}
