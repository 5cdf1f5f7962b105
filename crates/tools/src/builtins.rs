//! Built-in reference tools, registered through the same [`Tool`] contract
//! a real agent embedder would use. These exist to exercise the registry
//! and executor end-to-end (§4.E) and to give tests something real to call;
//! an embedder is free to register none of them, or to add its own.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use ea_domain::config::ExecConfig;

use crate::exec::{exec, ExecRequest};
use crate::file_ops::{file_read, file_write, FileReadRequest, FileWriteRequest};
use crate::registry::{Tool, ToolError};

/// `exec` — run a shell command to completion under `sh -c`.
pub fn exec_tool(config: ExecConfig) -> Tool {
    let config = Arc::new(config);
    Tool::new(
        "exec",
        "Run a shell command and return its combined stdout/stderr and exit code.",
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to run."},
                "workdir": {"type": "string", "description": "Working directory."},
                "env": {"type": "object", "description": "Extra environment variables."},
            },
            "required": ["command"],
        }),
        move |args| {
            let config = config.clone();
            async move {
                let req: ExecRequest = serde_json::from_value(args)
                    .map_err(|e| ToolError::new("InvalidArguments", e.to_string()))?;
                let resp = exec(&config, req)
                    .await
                    .map_err(|e| ToolError::new("ExecError", e))?;
                serde_json::to_value(resp).map_err(|e| ToolError::new("SerializationError", e.to_string()))
            }
        },
    )
    .expect("exec tool description is non-empty")
}

/// `read_file` — read a UTF-8 text file within `workspace_root`.
pub fn read_file_tool(workspace_root: PathBuf) -> Tool {
    let workspace_root = Arc::new(workspace_root);
    Tool::new(
        "read_file",
        "Read a text file's contents, optionally a line range, from within the workspace.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer", "description": "0-indexed starting line."},
                "limit": {"type": "integer", "description": "Maximum lines to return."},
            },
            "required": ["path"],
        }),
        move |args| {
            let workspace_root = workspace_root.clone();
            async move {
                let req: FileReadRequest = serde_json::from_value(args)
                    .map_err(|e| ToolError::new("InvalidArguments", e.to_string()))?;
                file_read(&workspace_root, req)
                    .await
                    .map_err(|e| ToolError::new("FileReadError", e))
            }
        },
    )
    .expect("read_file tool description is non-empty")
}

/// `write_file` — write a UTF-8 text file within `workspace_root`.
pub fn write_file_tool(workspace_root: PathBuf) -> Tool {
    let workspace_root = Arc::new(workspace_root);
    Tool::new(
        "write_file",
        "Write (creating or overwriting) a text file within the workspace.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"},
            },
            "required": ["path", "content"],
        }),
        move |args| {
            let workspace_root = workspace_root.clone();
            async move {
                let req: FileWriteRequest = serde_json::from_value(args)
                    .map_err(|e| ToolError::new("InvalidArguments", e.to_string()))?;
                file_write(&workspace_root, req)
                    .await
                    .map_err(|e| ToolError::new("FileWriteError", e))
            }
        },
    )
    .expect("write_file tool description is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ToolExecutor, ToolRegistry};

    #[tokio::test]
    async fn exec_tool_round_trips_through_the_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(exec_tool(ExecConfig::default())).unwrap();
        let executor = ToolExecutor::new(&registry);
        let result = executor
            .execute("exec", json!({"command": "echo hi"}))
            .await;
        assert!(result.success);
        assert!(result.result.unwrap()["output"].as_str().unwrap().contains("hi"));
    }

    #[tokio::test]
    async fn write_then_read_file_round_trips_through_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry
            .register(write_file_tool(dir.path().to_path_buf()))
            .unwrap();
        registry
            .register(read_file_tool(dir.path().to_path_buf()))
            .unwrap();
        let executor = ToolExecutor::new(&registry);

        let write_result = executor
            .execute("write_file", json!({"path": "note.txt", "content": "hello"}))
            .await;
        assert!(write_result.success);

        let read_result = executor.execute("read_file", json!({"path": "note.txt"})).await;
        assert!(read_result.success);
        assert_eq!(read_result.result.unwrap()["content"], json!("hello"));
    }
}
