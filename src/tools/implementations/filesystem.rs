//! Filesystem tool implementations
//!
//! Reference handlers for the three basic filesystem capabilities:
//! - read_file: Read file contents with a size limit
//! - write_file: Create or replace a file, creating parent directories
//! - list_dir: List directory contents, optionally recursive
//!
//! # Security
//! Every path argument goes through the path guard against the call's
//! `project_root`. A call without a project root is refused outright.

use crate::tools::handler::{HandlerError, HandlerOutput, ToolHandler};
use crate::tools::schema::{Param, Tool};
use crate::tools::security::{atomic_read, atomic_write, validate_path, validate_path_arg, GuardOptions};
use crate::tools::types::ExecutionContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Largest file `read_file` will return (2MB)
pub const MAX_READ_BYTES: u64 = 2 * 1024 * 1024;

/// Entries returned by one `list_dir` call
const MAX_LIST_ENTRIES: usize = 1000;

/// The built-in filesystem tools, sharing one set of guard options
pub fn builtin_tools(options: &GuardOptions) -> Vec<Tool> {
    vec![
        Tool::new(
            "read_file",
            "Read a text file inside the project",
            ReadFileHandler::new(options.clone()),
        )
        .with_param(Param::string("path", "File path, relative to the project root").required()),
        Tool::new(
            "write_file",
            "Create or overwrite a file inside the project",
            WriteFileHandler::new(options.clone()),
        )
        .with_param(Param::string("path", "File path, relative to the project root").required())
        .with_param(Param::string("content", "Full file contents").required()),
        Tool::new(
            "list_dir",
            "List a directory inside the project",
            ListDirHandler::new(options.clone()),
        )
        .with_param(Param::string("path", "Directory path, relative to the project root").with_default("."))
        .with_param(Param::boolean("recursive", "Descend into subdirectories").with_default(false)),
    ]
}

fn project_root(ctx: &ExecutionContext) -> Result<&Path, HandlerError> {
    ctx.project_root
        .as_deref()
        .ok_or_else(|| HandlerError::new("no project root for this call"))
}

/// Read file contents
pub struct ReadFileHandler {
    options: GuardOptions,
}

impl ReadFileHandler {
    pub fn new(options: GuardOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let root = project_root(ctx)?;
        let resolved = validate_path_arg(args.get("path"), root, &self.options)?;

        let metadata = fs::metadata(&resolved)
            .map_err(|e| HandlerError::new(format!("cannot read {}: {e}", display_arg(args))))?;
        if !metadata.is_file() {
            return Err(HandlerError::new(format!("not a file: {}", display_arg(args))));
        }
        if metadata.len() > MAX_READ_BYTES {
            return Err(HandlerError::structured(json!({
                "message": format!("file too large: {} bytes (limit {MAX_READ_BYTES})", metadata.len()),
                "size": metadata.len(),
            })));
        }

        let path = resolved.to_string_lossy();
        let bytes = atomic_read(&path, root, &self.options)?;
        Ok(HandlerOutput::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Write content to a file
pub struct WriteFileHandler {
    options: GuardOptions,
}

impl WriteFileHandler {
    pub fn new(options: GuardOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let root = project_root(ctx)?;
        let input = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("path must be a string"))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::new("content must be a string"))?;

        atomic_write(input, content.as_bytes(), root, &self.options)?;
        Ok(HandlerOutput::Text(format!(
            "wrote {} bytes to {input}",
            content.len()
        )))
    }
}

/// List directory contents
pub struct ListDirHandler {
    options: GuardOptions,
}

impl ListDirHandler {
    pub fn new(options: GuardOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ToolHandler for ListDirHandler {
    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let root = project_root(ctx)?;
        let dir = match args.get("path") {
            None | Some(Value::Null) => validate_path(".", root, &self.options)?,
            value => validate_path_arg(value, root, &self.options)?,
        };
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);

        if !dir.is_dir() {
            return Err(HandlerError::new(format!("not a directory: {}", display_arg(args))));
        }

        // Canonical root, for boundary-relative entry names
        let base = validate_path(".", root, &self.options)?;
        let mut entries = Vec::new();
        collect_entries(&dir, &base, recursive, &self.options, &mut entries)
            .map_err(|e| HandlerError::new(format!("failed to read directory: {e}")))?;
        entries.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));

        let truncated = entries.len() > MAX_LIST_ENTRIES;
        entries.truncate(MAX_LIST_ENTRIES);
        Ok(HandlerOutput::Json(json!({
            "entries": entries,
            "truncated": truncated,
        })))
    }
}

/// Walk `dir`, recording entries relative to `base`. Symlinks are reported
/// but never followed; protected files are left out.
fn collect_entries(
    dir: &Path,
    base: &Path,
    recursive: bool,
    options: &GuardOptions,
    entries: &mut Vec<Value>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        if entries.len() > MAX_LIST_ENTRIES {
            return Ok(());
        }
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(base).unwrap_or(&path);
        if options.is_protected(relative) {
            continue;
        }

        let file_type = entry.file_type()?;
        let kind = if file_type.is_symlink() {
            "symlink"
        } else if file_type.is_dir() {
            "dir"
        } else if file_type.is_file() {
            "file"
        } else {
            "other"
        };
        entries.push(json!({
            "path": relative.to_string_lossy(),
            "type": kind,
        }));

        if recursive && file_type.is_dir() {
            collect_entries(&path, base, recursive, options, entries)?;
        }
    }
    Ok(())
}

fn display_arg(args: &Map<String, Value>) -> &str {
    args.get("path").and_then(Value::as_str).unwrap_or(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(root: &Path) -> ExecutionContext {
        ExecutionContext::new().with_project_root(root)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_read_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("test.txt"), "Hello, World!").unwrap();

        let handler = ReadFileHandler::new(GuardOptions::quiet());
        let output = handler
            .execute(&args(json!({"path": "test.txt"})), &ctx(temp.path()))
            .await
            .unwrap();
        assert_eq!(output, HandlerOutput::Text("Hello, World!".into()));
    }

    #[tokio::test]
    async fn test_read_file_outside_root() {
        let temp = TempDir::new().unwrap();
        let handler = ReadFileHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(&args(json!({"path": "../../../etc/passwd"})), &ctx(temp.path()))
            .await
            .unwrap_err();
        assert!(err.message().contains("path escapes boundary"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let handler = ReadFileHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(&args(json!({"path": "nope.txt"})), &ctx(temp.path()))
            .await
            .unwrap_err();
        assert!(err.message().contains("cannot read nope.txt"));
    }

    #[tokio::test]
    async fn test_read_directory_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        let handler = ReadFileHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(&args(json!({"path": "src"})), &ctx(temp.path()))
            .await
            .unwrap_err();
        assert!(err.message().contains("not a file"));
    }

    #[tokio::test]
    async fn test_read_without_project_root() {
        let handler = ReadFileHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(&args(json!({"path": "a.txt"})), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(err.message().contains("no project root"));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let temp = TempDir::new().unwrap();
        let handler = WriteFileHandler::new(GuardOptions::quiet());
        let output = handler
            .execute(
                &args(json!({"path": "nested/dir/out.txt", "content": "data"})),
                &ctx(temp.path()),
            )
            .await
            .unwrap();

        assert_eq!(output, HandlerOutput::Text("wrote 4 bytes to nested/dir/out.txt".into()));
        let written = fs::read_to_string(temp.path().join("nested/dir/out.txt")).unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn test_write_protected_settings_denied() {
        let temp = TempDir::new().unwrap();
        let handler = WriteFileHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(
                &args(json!({"path": ".toolgate/settings.json", "content": "{}"})),
                &ctx(temp.path()),
            )
            .await
            .unwrap_err();
        assert!(err.message().contains("protected settings file"));
        assert!(!temp.path().join(".toolgate/settings.json").exists());
    }

    #[tokio::test]
    async fn test_list_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/inner.txt"), "").unwrap();

        let handler = ListDirHandler::new(GuardOptions::quiet());
        let output = handler.execute(&Map::new(), &ctx(temp.path())).await.unwrap();
        let HandlerOutput::Json(value) = output else {
            panic!("expected structured output");
        };
        assert_eq!(
            value["entries"],
            json!([{"path": "a", "type": "dir"}, {"path": "b.txt", "type": "file"}])
        );
        assert_eq!(value["truncated"], false);

        let output = handler
            .execute(&args(json!({"path": ".", "recursive": true})), &ctx(temp.path()))
            .await
            .unwrap();
        let HandlerOutput::Json(value) = output else {
            panic!("expected structured output");
        };
        let paths: Vec<&str> = value["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["a", "a/inner.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_list_dir_hides_protected_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".toolgate")).unwrap();
        fs::write(temp.path().join(".toolgate/settings.json"), "{}").unwrap();
        fs::write(temp.path().join(".toolgate/notes.md"), "").unwrap();

        let handler = ListDirHandler::new(GuardOptions::quiet());
        let output = handler
            .execute(&args(json!({"path": ".toolgate"})), &ctx(temp.path()))
            .await
            .unwrap();
        let HandlerOutput::Json(value) = output else {
            panic!("expected structured output");
        };
        assert_eq!(value["entries"], json!([{"path": ".toolgate/notes.md", "type": "file"}]));
    }

    #[tokio::test]
    async fn test_list_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("f.txt"), "").unwrap();
        let handler = ListDirHandler::new(GuardOptions::quiet());
        let err = handler
            .execute(&args(json!({"path": "f.txt"})), &ctx(temp.path()))
            .await
            .unwrap_err();
        assert!(err.message().contains("not a directory"));
    }

    #[test]
    fn test_builtin_tools_are_valid() {
        let tools = builtin_tools(&GuardOptions::quiet());
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["read_file", "write_file", "list_dir"]);
        assert!(tools.iter().all(|t| t.validate().is_ok()));
    }
}
