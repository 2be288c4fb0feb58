use super::{error_value, require_str, LocalTool, ToolContext};
use crate::domain::tool::ToolDeclaration;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const GREP_DEFAULT_FILE_PATTERN: &str = "**/*";
const GREP_MAX_FILES: usize = 100;
const GREP_MAX_MATCHES_PER_FILE: usize = 10;
const GREP_MAX_MATCHES: usize = 100;

/// Resolves a candidate path against the working directory and rejects any
/// resolved form that is not a descendant of it. Both `/etc/passwd` and
/// `{root}/../etc/passwd` fail here. This is a hard invariant for every
/// path-based executor, not a best-effort check.
pub(crate) fn resolve_within(root: &Path, candidate: &str) -> Result<PathBuf, String> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let candidate_path = Path::new(candidate);
    let joined = if candidate_path.is_absolute() {
        candidate_path.to_path_buf()
    } else {
        root.join(candidate_path)
    };

    let normalized = normalize(&joined);
    // Resolve symlinks before the check; a link pointing outside the root
    // must not pass even when the leaf does not exist yet.
    let resolved = resolve_existing_prefix(&normalized);

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(format!(
            "path escapes working directory: {candidate} (working directory: {})",
            root.display()
        ))
    }
}

/// Canonicalizes the deepest existing ancestor of `path` and re-appends the
/// remaining components. A symlinked directory anywhere along the way is
/// resolved to its target, so `root/link/new.txt` with `link` pointing
/// elsewhere resolves to the target directory, not under `root`.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for component in tail.iter().rev() {
                    resolved.push(component);
                }
                return resolved;
            }
            Err(_) => match existing.file_name() {
                Some(name) => {
                    tail.push(name.to_os_string());
                    existing.pop();
                }
                None => return path.to_path_buf(),
            },
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub struct ReadTool;

#[async_trait]
impl LocalTool for ReadTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Read",
            "Read the complete contents of a file from the filesystem",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to read (relative or absolute)"
                    }
                },
                "required": ["file_path"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let file_path = match require_str(&args, "file_path") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let path = match resolve_within(&ctx.root, file_path) {
            Ok(path) => path,
            Err(reason) => return error_value(reason),
        };
        if !path.is_file() {
            return error_value(format!("file not found: {file_path}"));
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                info!(path = %path.display(), "read file");
                json!({
                    "content": String::from_utf8_lossy(&bytes).into_owned(),
                    "file_path": path.display().to_string(),
                })
            }
            Err(err) => error_value(format!("failed to read {file_path}: {err}")),
        }
    }
}

pub struct WriteTool;

#[async_trait]
impl LocalTool for WriteTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Write",
            "Write content to a file, creating it if it doesn't exist",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let file_path = match require_str(&args, "file_path") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let content = match args.get("content").and_then(Value::as_str) {
            Some(value) => value,
            None => return super::missing_param("content"),
        };
        let path = match resolve_within(&ctx.root, file_path) {
            Ok(path) => path,
            Err(reason) => return error_value(reason),
        };

        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return error_value(format!("failed to create parent directories: {err}"));
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                info!(path = %path.display(), bytes = content.len(), "wrote file");
                json!({
                    "success": true,
                    "file_path": path.display().to_string(),
                    "bytes_written": content.len(),
                })
            }
            Err(err) => error_value(format!("failed to write {file_path}: {err}")),
        }
    }
}

pub struct EditTool;

#[async_trait]
impl LocalTool for EditTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Edit",
            "Edit a file by replacing occurrences of old_string with new_string",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file to edit"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "String to replace (must match exactly)"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "String to replace with"
                    }
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let file_path = match require_str(&args, "file_path") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let old_string = match require_str(&args, "old_string") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let new_string = match args.get("new_string").and_then(Value::as_str) {
            Some(value) => value,
            None => return super::missing_param("new_string"),
        };
        let path = match resolve_within(&ctx.root, file_path) {
            Ok(path) => path,
            Err(reason) => return error_value(reason),
        };
        if !path.is_file() {
            return error_value(format!("file not found: {file_path}"));
        }

        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => return error_value(format!("failed to read {file_path}: {err}")),
        };

        let replacements = content.matches(old_string).count();
        if replacements == 0 {
            let preview: String = old_string.chars().take(100).collect();
            return error_value(format!("string not found in file: {preview}"));
        }

        let updated = content.replace(old_string, new_string);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => {
                info!(path = %path.display(), replacements, "edited file");
                json!({
                    "success": true,
                    "file_path": path.display().to_string(),
                    "replacements": replacements,
                })
            }
            Err(err) => error_value(format!("failed to write {file_path}: {err}")),
        }
    }
}

pub struct GlobTool;

impl GlobTool {
    /// Shared with Grep for file selection. Matches are filtered back through
    /// the containment check and returned relative to the root, sorted.
    pub(crate) fn matches(root: &Path, pattern: &str) -> Result<Vec<String>, String> {
        if pattern.starts_with('/') || pattern.starts_with("..") {
            return Err("pattern must not start with / or ..".to_string());
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let full_pattern = format!("{}/{pattern}", root.display());
        let entries = glob::glob(&full_pattern).map_err(|err| format!("invalid pattern: {err}"))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    debug!(%err, "skipping unreadable glob entry");
                    continue;
                }
            };
            let resolved = path.canonicalize().unwrap_or(path);
            if let Ok(relative) = resolved.strip_prefix(&root) {
                files.push(relative.display().to_string());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl LocalTool for GlobTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Glob",
            "Find files matching a glob pattern (e.g., '**/*.rs' for all Rust files)",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern (supports ** for recursive search)"
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let pattern = match require_str(&args, "pattern") {
            Ok(value) => value,
            Err(error) => return error,
        };
        match Self::matches(&ctx.root, pattern) {
            Ok(files) => {
                info!(pattern, count = files.len(), "glob matched files");
                json!({
                    "files": files,
                    "count": files.len(),
                    "pattern": pattern,
                })
            }
            Err(reason) => error_value(reason),
        }
    }
}

pub struct GrepTool;

#[async_trait]
impl LocalTool for GrepTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "Grep",
            "Search for a regex pattern in files matching a glob pattern",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression pattern to search for"
                    },
                    "file_pattern": {
                        "type": "string",
                        "description": "Glob pattern for files to search (default: **/*)"
                    },
                    "case_sensitive": {
                        "type": "boolean",
                        "description": "Whether search is case sensitive (default: true)"
                    }
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Value {
        let pattern = match require_str(&args, "pattern") {
            Ok(value) => value,
            Err(error) => return error,
        };
        let file_pattern = args
            .get("file_pattern")
            .and_then(Value::as_str)
            .unwrap_or(GREP_DEFAULT_FILE_PATTERN);
        let case_sensitive = args
            .get("case_sensitive")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let regex = match regex::RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(regex) => regex,
            Err(err) => return error_value(format!("invalid regex pattern: {err}")),
        };

        let files = match GlobTool::matches(&ctx.root, file_pattern) {
            Ok(files) => files,
            Err(reason) => return error_value(reason),
        };

        let mut matches = Vec::new();
        let mut truncated = false;
        'files: for file in files.iter().take(GREP_MAX_FILES) {
            let full_path = ctx.root.join(file);
            if !full_path.is_file() {
                continue;
            }
            let content = match tokio::fs::read(&full_path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(err) => {
                    warn!(file = file.as_str(), %err, "skipping unreadable file");
                    continue;
                }
            };
            let mut per_file = 0;
            for (line_number, line) in content.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                if matches.len() >= GREP_MAX_MATCHES {
                    truncated = true;
                    break 'files;
                }
                matches.push(json!({
                    "file": file,
                    "line": line_number + 1,
                    "content": line.trim(),
                }));
                per_file += 1;
                if per_file >= GREP_MAX_MATCHES_PER_FILE {
                    break;
                }
            }
        }

        info!(
            pattern,
            total = matches.len(),
            truncated,
            files_searched = files.len(),
            "grep finished"
        );
        json!({
            "matches": matches,
            "total_matches": matches.len(),
            "truncated": truncated,
            "pattern": pattern,
            "files_searched": files.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn context(root: &Path) -> ToolContext {
        ToolContext::new(root.to_path_buf())
    }

    #[test]
    fn contained_paths_resolve() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("sub")).expect("mkdir");
        let resolved = resolve_within(dir.path(), "sub/../notes.txt").expect("contained");
        assert!(resolved.ends_with("notes.txt"));
    }

    #[test]
    fn absolute_and_traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(resolve_within(dir.path(), "/etc/passwd").is_err());
        assert!(resolve_within(dir.path(), "../etc/passwd").is_err());
        let sneaky = format!("{}/../etc/passwd", dir.path().display());
        assert!(resolve_within(dir.path(), &sneaky).is_err());
    }

    #[test]
    fn symlinked_directory_cannot_smuggle_new_files_out() {
        let outside = tempfile::tempdir().expect("outside dir");
        let dir = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");

        // The leaf does not exist yet; the link in the ancestor chain must
        // still be resolved and rejected.
        assert!(resolve_within(dir.path(), "link/escape.txt").is_err());
    }

    #[test]
    fn symlink_staying_inside_the_root_is_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("real")).expect("mkdir");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias"))
            .expect("symlink");

        let resolved = resolve_within(dir.path(), "alias/notes.txt").expect("contained");
        assert!(resolved.ends_with("real/notes.txt"));
    }

    #[tokio::test]
    async fn write_through_escaping_symlink_is_an_error_result() {
        let outside = tempfile::tempdir().expect("outside dir");
        let dir = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");

        let result = WriteTool
            .run(
                json!({"file_path": "link/escape.txt", "content": "leak"}),
                &context(dir.path()),
            )
            .await;
        assert!(result.get("error").is_some());
        assert!(!outside.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn read_missing_file_is_an_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ReadTool
            .run(json!({"file_path": "absent.txt"}), &context(dir.path()))
            .await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path());

        let written = WriteTool
            .run(
                json!({"file_path": "nested/out.txt", "content": "hello"}),
                &ctx,
            )
            .await;
        assert_eq!(written.get("success"), Some(&Value::Bool(true)));

        let read = ReadTool
            .run(json!({"file_path": "nested/out.txt"}), &ctx)
            .await;
        assert_eq!(
            read.get("content").and_then(Value::as_str),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn edit_counts_replacements() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("code.rs"), "foo foo bar").expect("seed file");
        let ctx = context(dir.path());

        let result = EditTool
            .run(
                json!({"file_path": "code.rs", "old_string": "foo", "new_string": "baz"}),
                &ctx,
            )
            .await;
        assert_eq!(result.get("replacements"), Some(&json!(2)));
        assert_eq!(
            fs::read_to_string(dir.path().join("code.rs")).expect("read back"),
            "baz baz bar"
        );
    }

    #[tokio::test]
    async fn edit_missing_string_is_an_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("code.rs"), "nothing here").expect("seed file");
        let result = EditTool
            .run(
                json!({"file_path": "code.rs", "old_string": "absent", "new_string": "x"}),
                &context(dir.path()),
            )
            .await;
        assert!(result.get("error").is_some());
    }

    #[tokio::test]
    async fn glob_rejects_escaping_patterns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path());
        let escaped = GlobTool.run(json!({"pattern": "../**/*"}), &ctx).await;
        assert!(escaped.get("error").is_some());
        let absolute = GlobTool.run(json!({"pattern": "/etc/*"}), &ctx).await;
        assert!(absolute.get("error").is_some());
    }

    #[tokio::test]
    async fn grep_finds_lines_with_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "alpha\nneedle here\nomega").expect("seed file");
        let result = GrepTool
            .run(
                json!({"pattern": "needle", "file_pattern": "*.txt"}),
                &context(dir.path()),
            )
            .await;
        let matches = result
            .get("matches")
            .and_then(Value::as_array)
            .expect("matches array");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("line"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn grep_caps_total_matches_and_flags_truncation() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Eleven files, each contributing the per-file maximum, push the
        // global cap: 10 files fill it and the eleventh overflows.
        let block = "needle\n".repeat(GREP_MAX_MATCHES_PER_FILE + 2);
        for i in 0..11 {
            fs::write(dir.path().join(format!("f{i:02}.txt")), &block).expect("seed file");
        }

        let result = GrepTool
            .run(
                json!({"pattern": "needle", "file_pattern": "*.txt"}),
                &context(dir.path()),
            )
            .await;
        let matches = result
            .get("matches")
            .and_then(Value::as_array)
            .expect("matches array");
        assert_eq!(matches.len(), GREP_MAX_MATCHES);
        assert_eq!(result.get("total_matches"), Some(&json!(GREP_MAX_MATCHES)));
        assert_eq!(result.get("truncated"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn grep_invalid_regex_is_an_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = GrepTool
            .run(json!({"pattern": "(unclosed"}), &context(dir.path()))
            .await;
        assert!(result.get("error").is_some());
    }
}
