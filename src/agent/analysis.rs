//! Bounded project analysis
//!
//! A cheap scan of the workspace that scales with the agent's intelligence
//! level: smarter agents look at more files. Dependency and build
//! directories are always skipped.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FleetError, FleetResult};

/// Directories never worth scanning.
pub const EXCLUDED_DIRS: &[&str] = &[
    "env",
    "venv",
    "__pycache__",
    ".git",
    "node_modules",
    "logs",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "target",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "cpp", "h", "toml", "yaml", "yml",
    "json", "md",
];

#[derive(Debug, Clone)]
pub struct ProjectAnalysis {
    pub files_scanned: usize,
    pub source_files: usize,
    pub total_lines: usize,
    pub largest_file: Option<(PathBuf, usize)>,
    pub scan_capacity: usize,
}

impl ProjectAnalysis {
    /// One-line digest suitable for inclusion in a prompt.
    pub fn digest(&self) -> String {
        format!(
            "{} files scanned ({} source, {} lines total)",
            self.files_scanned, self.source_files, self.total_lines
        )
    }
}

pub struct ProjectAnalyzer {
    root: PathBuf,
}

impl ProjectAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk the workspace up to the intelligence-scaled file budget.
    pub async fn analyze(&self, intelligence_level: f64) -> FleetResult<ProjectAnalysis> {
        let capacity = scan_capacity(intelligence_level);
        let mut analysis = ProjectAnalysis {
            files_scanned: 0,
            source_files: 0,
            total_lines: 0,
            largest_file: None,
            scan_capacity: capacity,
        };

        let mut dirs = vec![self.root.clone()];
        'walk: while let Some(dir) = dirs.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| FleetError::Fatal(format!("workspace scan failed: {e}")))?
            {
                let path = entry.path();
                if path.is_dir() {
                    if !is_excluded(&path) {
                        dirs.push(path);
                    }
                    continue;
                }

                analysis.files_scanned += 1;
                if is_source_file(&path) {
                    analysis.source_files += 1;
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        let lines = content.lines().count();
                        analysis.total_lines += lines;
                        if analysis
                            .largest_file
                            .as_ref()
                            .map(|(_, max)| lines > *max)
                            .unwrap_or(true)
                        {
                            analysis.largest_file = Some((path.clone(), lines));
                        }
                    }
                }

                if analysis.files_scanned >= capacity {
                    break 'walk;
                }
            }
        }

        debug!(
            files = analysis.files_scanned,
            capacity,
            lines = analysis.total_lines,
            "project analysis complete"
        );
        Ok(analysis)
    }
}

/// File budget for one analysis pass: `min(100, max(10, 10 + 5·level))`.
pub fn scan_capacity(intelligence_level: f64) -> usize {
    ((10.0 + 5.0 * intelligence_level) as usize).clamp(10, 100)
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
