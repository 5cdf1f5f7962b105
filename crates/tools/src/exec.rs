//! Exec tool — run a shell command to completion and capture its output.
//!
//! Foreground only: the agent runtime's tool contract is a single request
//! in, a single result out (§3.5/§4.E); there is no mechanism for a tool to
//! hand back a handle for later polling, so unlike the teacher's gateway
//! this does not auto-background long-running commands. A command that
//! outlives `timeout_sec` is killed and reported as timed out.

use std::collections::HashMap;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use ea_domain::config::ExecConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    /// Working directory. Defaults to the current process's.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecResponse {
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
}

/// Environment variable names that are never allowed to be overridden by a
/// tool call, regardless of what the model requests.
fn is_dangerous_env_var(name: &str) -> bool {
    const BLOCKED: &[&str] = &[
        "LD_PRELOAD",
        "LD_LIBRARY_PATH",
        "LD_AUDIT",
        "DYLD_INSERT_LIBRARIES",
        "DYLD_LIBRARY_PATH",
        "PATH",
        "HOME",
        "SSH_AUTH_SOCK",
        "BASH_ENV",
        "ENV",
        "IFS",
    ];
    BLOCKED.contains(&name.to_ascii_uppercase().as_str())
}

/// Run `req.command` under `sh -c`, waiting up to `config.timeout_sec`.
/// Combined stdout+stderr is truncated to `config.max_output_chars`.
pub async fn exec(config: &ExecConfig, req: ExecRequest) -> Result<ExecResponse, String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&req.command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());

    if let Some(ref workdir) = req.workdir {
        cmd.current_dir(workdir);
    }
    if let Some(ref env) = req.env {
        for (key, value) in env {
            if is_dangerous_env_var(key) {
                return Err(format!(
                    "environment variable '{key}' is blocked by security policy"
                ));
            }
            cmd.env(key, value);
        }
    }

    let mut child = cmd.spawn().map_err(|e| format!("failed to spawn: {e}"))?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let timeout = std::time::Duration::from_secs(config.timeout_sec);
    let wait = async {
        let mut out = String::new();
        let mut err = String::new();
        if let Some(stdout) = stdout.as_mut() {
            let _ = stdout.read_to_string(&mut out).await;
        }
        if let Some(stderr) = stderr.as_mut() {
            let _ = stderr.read_to_string(&mut err).await;
        }
        let status = child.wait().await;
        (status, out, err)
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok((status, out, err)) => {
            let mut combined = out;
            combined.push_str(&err);
            let cut = config.max_output_chars.min(combined.len());
            combined.truncate(cut);
            let exit_code = status.ok().and_then(|s| s.code());
            Ok(ExecResponse {
                exit_code,
                output: combined,
                timed_out: false,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            Ok(ExecResponse {
                exit_code: None,
                output: String::new(),
                timed_out: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_captures_stdout_and_exit_code() {
        let config = ExecConfig::default();
        let resp = exec(
            &config,
            ExecRequest {
                command: "echo hello".to_string(),
                workdir: None,
                env: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.exit_code, Some(0));
        assert!(resp.output.contains("hello"));
        assert!(!resp.timed_out);
    }

    #[tokio::test]
    async fn exec_rejects_dangerous_env_override() {
        let config = ExecConfig::default();
        let mut env = HashMap::new();
        env.insert("LD_PRELOAD".to_string(), "/tmp/evil.so".to_string());
        let result = exec(
            &config,
            ExecRequest {
                command: "true".to_string(),
                workdir: None,
                env: Some(env),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn exec_reports_nonzero_exit_code() {
        let config = ExecConfig::default();
        let resp = exec(
            &config,
            ExecRequest {
                command: "exit 7".to_string(),
                workdir: None,
                env: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.exit_code, Some(7));
    }
}
