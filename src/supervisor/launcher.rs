//! Launch command selection.
//!
//! A start script in the server root wins; otherwise the first known
//! server jar is launched with the configured heap flags.

use std::path::Path;

use crate::config::LaunchConfig;
use crate::{AppError, Result};

/// Start scripts, in preference order. Run through `sh`.
pub const START_SCRIPTS: &[&str] = &["start.sh", "run.sh"];

/// Server jars, in preference order.
pub const KNOWN_EXECUTABLES: &[&str] = &[
    "server.jar",
    "paper.jar",
    "purpur.jar",
    "spigot.jar",
    "fabric-server-launch.jar",
    "minecraft_server.jar",
];

/// Resolved launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    /// `sh <script>` from the server root.
    Script {
        /// Script file name, relative to the root.
        script: String,
    },
    /// `java <flags> -jar <jar> nogui` from the server root.
    Jar {
        /// Java binary.
        java: String,
        /// JVM flags placed before `-jar`.
        jvm_args: Vec<String>,
        /// Jar file name, relative to the root.
        jar: String,
    },
}

impl LaunchPlan {
    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Script { .. } => "sh",
            Self::Jar { java, .. } => java,
        }
    }

    /// Arguments passed to [`LaunchPlan::program`].
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Script { script } => vec![script.clone()],
            Self::Jar { jvm_args, jar, .. } => {
                let mut args = jvm_args.clone();
                args.push("-jar".into());
                args.push(jar.clone());
                args.push("nogui".into());
                args
            }
        }
    }

    /// Full command line for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program().to_owned()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// Pick the launch command for the server in `root`.
///
/// # Errors
///
/// Returns `AppError::Process` if neither a start script nor a known
/// server jar exists in `root`.
pub fn select_launch(root: &Path, launch: &LaunchConfig) -> Result<LaunchPlan> {
    if let Some(script) = first_existing(root, START_SCRIPTS) {
        return Ok(LaunchPlan::Script { script });
    }

    if let Some(jar) = first_existing(root, KNOWN_EXECUTABLES) {
        let mut jvm_args = launch.memory_flags();
        jvm_args.extend(launch.extra_args.iter().cloned());
        return Ok(LaunchPlan::Jar {
            java: launch.java.clone(),
            jvm_args,
            jar,
        });
    }

    Err(AppError::Process(format!(
        "no start script ({}) or server jar ({}) found in {}",
        START_SCRIPTS.join(", "),
        KNOWN_EXECUTABLES.join(", "),
        root.display()
    )))
}

fn first_existing(root: &Path, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find(|name| root.join(name).is_file())
        .map(|name| (*name).to_owned())
}
