//! Default values for archdrift configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Extraction Defaults
// ============================================================================

/// Largest source file the extractor will parse (1 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default directories to exclude from extraction.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    ".pytest_cache",
    // Build outputs
    "target",
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    // IDE/Editor
    ".idea",
    ".vscode",
    // archdrift's own data
    ".archdrift",
    // Other common excludes
    "coverage",
    ".next",
    ".nuxt",
    ".cache",
];

// ============================================================================
// Snapshot Defaults
// ============================================================================

/// Default git executable.
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Time allowed for cloning and checking out a commit (seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Render Defaults
// ============================================================================

/// Default render backend: "graphviz" or "dot-source".
pub const DEFAULT_RENDER_BACKEND: &str = "graphviz";

/// Default Graphviz output format.
pub const DEFAULT_RENDER_FORMAT: &str = "png";

/// Default Graphviz executable.
pub const DEFAULT_DOT_BINARY: &str = "dot";

/// Time allowed for one render call (seconds).
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Scheduler Defaults
// ============================================================================

/// Interval between remote HEAD checks (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = ".archdrift";

/// Default projects subdirectory.
pub const DEFAULT_PROJECTS_DIR: &str = "projects";

/// Project record file name.
pub const DEFAULT_PROJECT_FILE: &str = "project.json";

/// Version record file name.
pub const DEFAULT_VERSION_FILE: &str = "version.json";

/// Ontology file name.
pub const DEFAULT_ONTOLOGY_FILE: &str = "ontology.yaml";

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Length of the abbreviated commit hash shown to users.
pub const SHORT_HASH_LEN: usize = 7;
