//! Path guard: boundary enforcement for every filesystem-touching tool
//!
//! Every path argument a model hands us goes through [`validate_path`]
//! before any syscall sees it:
//! - Encoded traversal detection (single and double percent-encoding)
//! - Directory-prefix boundary check (no `root_sibling` false positives)
//! - Lexical normalization of `.` and `..`
//! - Component-wise symlink resolution with a bounded hop count
//! - Protected settings files denied regardless of the above
//!
//! [`atomic_read`] and [`atomic_write`] validate once and then operate on the
//! resolved path, re-checking the realpath next to the write to narrow the
//! check-then-use window.

use glob::Pattern;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Maximum symlinks followed while resolving one path (matches Linux MAXSYMLINKS)
pub const DEFAULT_MAX_SYMLINK_HOPS: usize = 40;

/// Percent-decoding passes before we stop unwrapping nested encodings
const MAX_DECODE_DEPTH: usize = 4;

/// Boundary-relative files that are never readable or writable through tools
pub const DEFAULT_PROTECTED_PATTERNS: &[&str] =
    &[".toolgate/settings.json", ".toolgate/settings.local.json"];

/// Path guard rejection or guarded I/O failure
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    #[error("path escapes boundary: {path}")]
    PathEscapesBoundary { path: String },

    #[error("path outside boundary: {}", path.display())]
    PathOutsideBoundary { path: PathBuf },

    #[error("symlink escapes boundary: {} -> {}", path.display(), target.display())]
    SymlinkEscapesBoundary { path: PathBuf, target: PathBuf },

    #[error("access to protected settings file denied: {}", path.display())]
    ProtectedSettingsFile { path: PathBuf },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SecurityError {
    /// Stable rule name, used in audit logs and error kinds
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::InvalidPath { .. } => "invalid_path",
            SecurityError::PathEscapesBoundary { .. } => "path_escapes_boundary",
            SecurityError::PathOutsideBoundary { .. } => "path_outside_boundary",
            SecurityError::SymlinkEscapesBoundary { .. } => "symlink_escapes_boundary",
            SecurityError::ProtectedSettingsFile { .. } => "protected_settings_file",
            SecurityError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => "enoent",
                io::ErrorKind::PermissionDenied => "eacces",
                _ => "io_error",
            },
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        SecurityError::InvalidPath {
            reason: reason.into(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        SecurityError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Knobs for the guard. Cheap to clone, shared by every handler.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    /// Boundary-relative globs that are always denied
    pub protected: Vec<Pattern>,

    /// Emit `toolgate::audit` warnings on rejection
    pub audit_log: bool,

    /// Symlink hops allowed before the path is treated as a cycle
    pub max_symlink_hops: usize,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            protected: compile_patterns(DEFAULT_PROTECTED_PATTERNS.iter().copied()),
            audit_log: true,
            max_symlink_hops: DEFAULT_MAX_SYMLINK_HOPS,
        }
    }
}

impl GuardOptions {
    /// Replace the protected pattern set. Patterns that fail to compile are
    /// dropped with a warning.
    pub fn with_protected_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protected = compile_patterns(patterns);
        self
    }

    /// Toggle the security audit trail
    pub fn with_audit_log(mut self, enabled: bool) -> Self {
        self.audit_log = enabled;
        self
    }

    /// Set the symlink hop bound
    pub fn with_max_symlink_hops(mut self, hops: usize) -> Self {
        self.max_symlink_hops = hops;
        self
    }

    /// Options for tests: defaults with the audit log silenced
    pub fn quiet() -> Self {
        Self::default().with_audit_log(false)
    }

    /// Whether a boundary-relative path matches a protected pattern
    pub fn is_protected(&self, relative: &Path) -> bool {
        self.protected.iter().any(|p| p.matches_path(relative))
    }
}

fn compile_patterns<I, S>(patterns: I) -> Vec<Pattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|p| match Pattern::new(p.as_ref()) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = p.as_ref(), error = %e, "ignoring invalid protected path pattern");
                None
            }
        })
        .collect()
}

/// Path guard bound to one sandbox root
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    options: GuardOptions,
}

impl PathGuard {
    /// Create a guard for an existing directory. The root is canonicalized so
    /// platform-level symlinks above it (`/tmp` on macOS) do not trip checks.
    pub fn new(root: impl AsRef<Path>, options: GuardOptions) -> Result<Self, SecurityError> {
        let root = root.as_ref();
        if !root.is_absolute() {
            return Err(SecurityError::invalid(format!(
                "boundary must be absolute: {}",
                root.display()
            )));
        }
        let root = root.canonicalize().map_err(|e| SecurityError::io(root, e))?;
        if !root.is_dir() {
            return Err(SecurityError::invalid(format!(
                "boundary is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    pub fn validate(&self, input: &str) -> Result<PathBuf, SecurityError> {
        validate_path(input, &self.root, &self.options)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        within_boundary(path, &self.root)
    }

    pub fn read(&self, input: &str) -> Result<Vec<u8>, SecurityError> {
        atomic_read(input, &self.root, &self.options)
    }

    pub fn write(&self, input: &str, content: &[u8]) -> Result<PathBuf, SecurityError> {
        atomic_write(input, content, &self.root, &self.options)
    }
}

/// Validate a JSON tool argument as a path. Missing or non-string values are
/// rejected as `invalid_path` before any string handling happens.
pub fn validate_path_arg(
    value: Option<&serde_json::Value>,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<PathBuf, SecurityError> {
    match value.and_then(|v| v.as_str()) {
        Some(input) => validate_path(input, boundary, opts),
        None => {
            let err = SecurityError::invalid("path must be a string");
            audit(opts, "<non-string>", &err);
            Err(err)
        }
    }
}

/// Validate `input` against `boundary` and return the canonical absolute path.
///
/// ```text
/// Valid(p) ⟺ realpath(normalize(root ⊕ p)) ∈ Subtree(root)
///           ∧ relative(p) ∉ Protected
/// ```
pub fn validate_path(
    input: &str,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<PathBuf, SecurityError> {
    let result = validate_path_inner(input, boundary, opts);
    if let Err(e) = &result {
        audit(opts, input, e);
    }
    result
}

fn validate_path_inner(
    input: &str,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<PathBuf, SecurityError> {
    if input.is_empty() {
        return Err(SecurityError::invalid("path is empty"));
    }
    if input.contains('\0') {
        return Err(SecurityError::invalid("path contains a NUL byte"));
    }
    if !boundary.is_absolute() {
        return Err(SecurityError::invalid(format!(
            "boundary must be absolute: {}",
            boundary.display()
        )));
    }

    if has_encoded_traversal(input) {
        return Err(SecurityError::PathEscapesBoundary {
            path: input.to_string(),
        });
    }

    let (lexical_root, root) = boundary_roots(boundary);
    let candidate = Path::new(input);

    let joined = if candidate.is_absolute() {
        if candidate.starts_with(&root) {
            candidate.to_path_buf()
        } else if let Ok(rest) = candidate.strip_prefix(&lexical_root) {
            root.join(rest)
        } else {
            return Err(SecurityError::PathOutsideBoundary {
                path: candidate.to_path_buf(),
            });
        }
    } else {
        root.join(candidate)
    };

    let normalized = normalize_lexically(&joined);
    if !normalized.starts_with(&root) {
        return Err(SecurityError::PathEscapesBoundary {
            path: input.to_string(),
        });
    }

    let resolved = resolve_symlinks(&normalized, &root, opts.max_symlink_hops)?;
    if !resolved.starts_with(&root) {
        return Err(SecurityError::SymlinkEscapesBoundary {
            path: normalized,
            target: resolved,
        });
    }

    // Check both the name the caller used and what it points at
    for path in [&normalized, &resolved] {
        if let Ok(relative) = path.strip_prefix(&root) {
            if opts.is_protected(relative) {
                return Err(SecurityError::ProtectedSettingsFile {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    Ok(resolved)
}

/// Directory-prefix membership test. No symlink resolution.
pub fn within_boundary(path: impl AsRef<Path>, boundary: impl AsRef<Path>) -> bool {
    let boundary = normalize_lexically(boundary.as_ref());
    resolve_path(path, &boundary).starts_with(&boundary)
}

/// Join `input` onto `boundary` (when relative) and normalize lexically.
/// Pure: does not touch the filesystem or enforce the boundary.
pub fn resolve_path(input: impl AsRef<Path>, boundary: impl AsRef<Path>) -> PathBuf {
    let input = input.as_ref();
    if input.is_absolute() {
        normalize_lexically(input)
    } else {
        normalize_lexically(&boundary.as_ref().join(input))
    }
}

/// Post-condition check: the realpath of an existing `path` lies inside the
/// boundary and is not protected.
pub fn validate_realpath(
    path: &Path,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<(), SecurityError> {
    let result = validate_realpath_inner(path, boundary, opts);
    if let Err(e) = &result {
        audit(opts, &path.to_string_lossy(), e);
    }
    result
}

fn validate_realpath_inner(
    path: &Path,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<(), SecurityError> {
    let (_, root) = boundary_roots(boundary);
    let real = fs::canonicalize(path).map_err(|e| SecurityError::io(path, e))?;
    if !real.starts_with(&root) {
        return Err(SecurityError::SymlinkEscapesBoundary {
            path: path.to_path_buf(),
            target: real,
        });
    }
    if let Ok(relative) = real.strip_prefix(&root) {
        if opts.is_protected(relative) {
            return Err(SecurityError::ProtectedSettingsFile { path: real });
        }
    }
    Ok(())
}

/// Validate once, then read the resolved path.
pub fn atomic_read(
    input: &str,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<Vec<u8>, SecurityError> {
    let resolved = validate_path(input, boundary, opts)?;

    let mut file = open_nofollow(&resolved, fs::OpenOptions::new().read(true))
        .map_err(|e| swapped_or_io(&resolved, e, opts))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| SecurityError::io(&resolved, e))?;
    Ok(buf)
}

/// Validate once, create missing parents inside the boundary, then write.
///
/// New files cannot be realpath-checked before they exist, so the parent
/// directory is re-checked right before the open and the file right after.
/// A failed post-check removes a file we just created.
pub fn atomic_write(
    input: &str,
    content: &[u8],
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<PathBuf, SecurityError> {
    let resolved = validate_path(input, boundary, opts)?;
    let parent = resolved
        .parent()
        .ok_or_else(|| SecurityError::invalid("path has no parent directory"))?;

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| SecurityError::io(parent, e))?;
    }
    validate_realpath(parent, boundary, opts)?;

    let existed = fs::symlink_metadata(&resolved).is_ok();
    if existed {
        validate_realpath(&resolved, boundary, opts)?;
    }

    let mut file = open_nofollow(
        &resolved,
        fs::OpenOptions::new().write(true).create(true).truncate(true),
    )
    .map_err(|e| swapped_or_io(&resolved, e, opts))?;
    file.write_all(content)
        .map_err(|e| SecurityError::io(&resolved, e))?;
    file.flush().map_err(|e| SecurityError::io(&resolved, e))?;
    drop(file);

    verify_written(&resolved, !existed, boundary, opts)?;
    Ok(resolved)
}

/// Post-write realpath check. A file we created that no longer resolves
/// inside the boundary is removed; a pre-existing one is left alone.
fn verify_written(
    path: &Path,
    created: bool,
    boundary: &Path,
    opts: &GuardOptions,
) -> Result<(), SecurityError> {
    if let Err(e) = validate_realpath(path, boundary, opts) {
        if created {
            let _ = fs::remove_file(path);
        }
        return Err(e);
    }
    Ok(())
}

/// Open without following a symlink in the final component. The resolved
/// path never ends in a symlink, so hitting one here means it was swapped in
/// after validation.
fn open_nofollow(path: &Path, options: &mut fs::OpenOptions) -> io::Result<fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOFOLLOW);
    }
    options.open(path)
}

fn swapped_or_io(path: &Path, e: io::Error, opts: &GuardOptions) -> SecurityError {
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::ELOOP) {
        let err = SecurityError::SymlinkEscapesBoundary {
            path: path.to_path_buf(),
            target: fs::read_link(path).unwrap_or_default(),
        };
        audit(opts, &path.to_string_lossy(), &err);
        return err;
    }
    let _ = opts;
    SecurityError::io(path, e)
}

fn audit(opts: &GuardOptions, input: &str, err: &SecurityError) {
    if opts.audit_log {
        warn!(
            target: "toolgate::audit",
            input = input,
            rule = err.kind(),
            "path rejected: {err}"
        );
    }
}

/// The boundary as given (normalized) and as it exists on disk. They differ
/// only when the boundary sits below a symlink.
fn boundary_roots(boundary: &Path) -> (PathBuf, PathBuf) {
    let lexical = normalize_lexically(boundary);
    let canonical = fs::canonicalize(&lexical).unwrap_or_else(|_| lexical.clone());
    (lexical, canonical)
}

/// `..` reached through percent-encoding or backslash separators is never a
/// legitimate relative path; plain `a/../b` is left to lexical normalization.
fn has_encoded_traversal(input: &str) -> bool {
    if input.contains('\\') && has_parent_segment(&input.replace('\\', "/")) {
        return true;
    }

    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_DEPTH {
        let decoded = match urlencoding::decode(&current) {
            Ok(d) => d.into_owned(),
            Err(_) => break,
        };
        if decoded == current {
            break;
        }
        if has_parent_segment(&decoded.replace('\\', "/")) {
            return true;
        }
        current = decoded;
    }
    false
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Collapse `.` and `..` without touching the filesystem. `..` at the root
/// stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

enum Segment {
    Root(PathBuf),
    Parent,
    Name(OsString),
}

fn segments(path: &Path) -> Vec<Segment> {
    path.components()
        .filter_map(|c| match c {
            Component::Prefix(_) | Component::RootDir => {
                Some(Segment::Root(PathBuf::from(c.as_os_str())))
            }
            Component::CurDir => None,
            Component::ParentDir => Some(Segment::Parent),
            Component::Normal(name) => Some(Segment::Name(name.to_os_string())),
        })
        .collect()
}

/// Walk `normalized` below `root` one component at a time, splicing link
/// targets into the pending queue. `resolved` is always a physical path, so
/// `..` from a link target pops the real parent. Every name is inspected,
/// including names reached again via `..` after a missing component; only
/// names that do not exist are appended lexically.
fn resolve_symlinks(
    normalized: &Path,
    root: &Path,
    max_hops: usize,
) -> Result<PathBuf, SecurityError> {
    let relative = normalized.strip_prefix(root).unwrap_or(normalized);
    let mut pending: Vec<Segment> = segments(relative);
    pending.reverse();

    let mut resolved = root.to_path_buf();
    let mut hops = 0usize;

    while let Some(segment) = pending.pop() {
        match segment {
            Segment::Root(r) => resolved = r,
            Segment::Parent => {
                resolved.pop();
            }
            Segment::Name(name) => {
                let candidate = resolved.join(&name);
                match fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > max_hops {
                            return Err(SecurityError::invalid(format!(
                                "too many levels of symbolic links: {}",
                                normalized.display()
                            )));
                        }
                        let target =
                            fs::read_link(&candidate).map_err(|e| SecurityError::io(&candidate, e))?;
                        let mut spliced = segments(&target);
                        spliced.reverse();
                        pending.extend(spliced);
                    }
                    Ok(_) => resolved = candidate,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => resolved = candidate,
                    Err(e) => return Err(SecurityError::io(&candidate, e)),
                }
            }
        }
    }

    Ok(resolved)
}
