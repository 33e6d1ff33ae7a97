//! Container lifecycle queries against the container runtime CLI.
//!
//! The runtime binary (podman or docker, both share the `ps --format`
//! surface) is asked for the names of running containers. A failing or
//! absent runtime degrades to "nothing is running": for the monitors
//! that is the natural idle state, not an error.

use tracing::debug;

use crate::command::CommandSpec;

/// Handle to the container runtime CLI.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
}

impl ContainerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Names of all currently running containers. Empty on any failure.
    pub async fn running_containers(&self) -> Vec<String> {
        let output = match CommandSpec::new(&self.binary)
            .args(["ps", "--format", "{{.Names}}"])
            .run()
            .await
        {
            Ok(output) if output.success() => output,
            Ok(output) => {
                debug!(runtime = %self.binary, status = %output.status, "container query failed");
                return Vec::new();
            }
            Err(e) => {
                debug!(runtime = %self.binary, error = %e, "container runtime unavailable");
                return Vec::new();
            }
        };

        parse_container_names(&output.stdout)
    }

    /// Whether the named container is currently running.
    pub async fn is_running(&self, name: &str) -> bool {
        self.running_containers().await.iter().any(|c| c == name)
    }

    /// Running containers whose name starts with `prefix`.
    pub async fn running_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.running_containers()
            .await
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect()
    }
}

fn parse_container_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_name_per_line() {
        let names = parse_container_names("whisper-tiny\nwhisper-base\npostgres\n");
        assert_eq!(names, vec!["whisper-tiny", "whisper-base", "postgres"]);
    }

    #[test]
    fn ignores_blank_lines() {
        assert!(parse_container_names("\n  \n").is_empty());
        assert!(parse_container_names("").is_empty());
    }

    #[tokio::test]
    async fn missing_runtime_means_nothing_running() {
        let runtime = ContainerRuntime::new("definitely-not-a-container-runtime");
        assert!(runtime.running_containers().await.is_empty());
        assert!(!runtime.is_running("whisper-tiny").await);
    }
}
