//! Spawns tool binaries from the app corpus.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tooldesk_application::{LaunchError, ToolLauncher};
use tooldesk_domain::validate_app_name;
use tracing::{debug, info};

/// Launches `<apps_dir>/<App>/<App> <App> <router_port>`.
///
/// The child inherits stdout/stderr so tool output lands in the router's
/// log. It is not awaited: the tool announces itself with `register`.
pub struct ProcessLauncher {
    apps_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(apps_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
        }
    }

    pub fn binary_path(&self, app: &str) -> PathBuf {
        binary_path(&self.apps_dir, app)
    }
}

pub(crate) fn binary_path(apps_dir: &Path, app: &str) -> PathBuf {
    apps_dir.join(app).join(app)
}

impl ToolLauncher for ProcessLauncher {
    fn launch(&self, app: &str, router_port: u16) -> Result<bool, LaunchError> {
        if validate_app_name(app).is_err() {
            return Ok(false);
        }
        let binary = self.binary_path(app);
        if !binary.is_file() {
            debug!(tool = app, path = %binary.display(), "No binary in corpus");
            return Ok(false);
        }

        let mut cmd = Command::new(&binary);
        cmd.arg(app)
            .arg(router_port.to_string())
            .current_dir(self.apps_dir.join(app))
            .stdin(Stdio::null());

        // Linux: the kernel sends SIGTERM to the tool when the router dies.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            app: app.to_string(),
            source,
        })?;
        info!(tool = app, pid = child.id(), router_port, "Spawned tool");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new(dir.path());
        assert!(!launcher.launch("Calendar", 8100).unwrap());
        assert!(!launcher.launch("../etc", 8100).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawns_binary_with_app_and_port() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("Echo");
        std::fs::create_dir_all(&app_dir).unwrap();
        let script = app_dir.join("Echo");
        std::fs::write(&script, "#!/bin/sh\necho \"$1 $2\" > args.txt\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = ProcessLauncher::new(dir.path());
        assert!(launcher.launch("Echo", 8123).unwrap());

        let out = app_dir.join("args.txt");
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(&out)
                && !text.is_empty()
            {
                assert_eq!(text.trim(), "Echo 8123");
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("tool script never ran");
    }
}
