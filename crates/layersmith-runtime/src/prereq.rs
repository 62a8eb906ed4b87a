use crate::installer::Toolchain;
use layersmith_schema::RuntimeFamily;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    if name.contains('/') {
        return Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn python_venv_works(python: &str) -> bool {
    Command::new(python)
        .args(["-m", "venv", "--help"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check a single tool, returning a prerequisite entry if it is missing.
pub fn check_tool(
    program: &str,
    purpose: &'static str,
    install_hint: &'static str,
) -> Option<MissingPrereq> {
    (!command_exists(program)).then(|| MissingPrereq {
        name: program.to_owned(),
        purpose,
        install_hint,
    })
}

/// Check everything needed to build layers of `family`.
/// An empty list means all prerequisites are met.
pub fn check_family_prereqs(family: RuntimeFamily, tools: &Toolchain) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if let Some(m) = check_tool(&tools.shell, "pre-install hooks", "a POSIX shell") {
        missing.push(m);
    }

    match family {
        RuntimeFamily::Python => {
            if !command_exists(&tools.python) {
                missing.push(MissingPrereq {
                    name: tools.python.clone(),
                    purpose: "python layer builds",
                    install_hint: "apt install python3 | dnf install python3 | pyenv install",
                });
            } else if !python_venv_works(&tools.python) {
                missing.push(MissingPrereq {
                    name: format!("{} -m venv", tools.python),
                    purpose: "isolated pip installs",
                    install_hint: "apt install python3-venv",
                });
            }
        }
        RuntimeFamily::Node => {
            if let Some(m) = check_tool(
                &tools.node,
                "node runtime version check",
                "apt install nodejs | nvm install",
            ) {
                missing.push(m);
            }
            if let Some(m) = check_tool(&tools.npm, "node layer builds", "apt install npm") {
                missing.push(m);
            }
        }
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nlayersmith needs these tools to build layers.");
    msg
}
