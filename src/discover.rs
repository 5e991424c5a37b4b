//! Input discovery and output planning for a source directory.
//!
//! Only the top level of the directory is scanned. Symlinks are followed,
//! directories are skipped, and files are matched on their extension
//! case-insensitively. Results are sorted so logs and summaries are stable
//! from run to run.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lower-cased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

/// List the convertible files directly inside `dir`.
pub async fn discover_inputs(dir: &Path, extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(ext) = extension_of(&path) else {
            continue;
        };
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            continue;
        }
        // `metadata` follows symlinks; a dangling link is skipped.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }

    found.sort();
    debug!(
        "Found {} convertible files in '{}'",
        found.len(),
        dir.display()
    );
    Ok(found)
}

/// Destination path for each input: `out_dir/<stem>.<target_ext>`.
///
/// When two inputs share a stem (`a.doc`, `a.docx`) their destinations keep
/// the source extension (`a.doc.pdf`, `a.docx.pdf`) so neither overwrites
/// the other.
pub fn plan_outputs(out_dir: &Path, inputs: &[PathBuf], target_ext: &str) -> Vec<PathBuf> {
    let stem = |p: &Path| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for input in inputs {
        *stem_counts.entry(stem(input)).or_default() += 1;
    }

    inputs
        .iter()
        .map(|input| {
            let base = stem(input);
            let file_name = if stem_counts.get(&base).copied().unwrap_or(0) > 1 {
                let full = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or(base);
                format!("{full}.{target_ext}")
            } else {
                format!("{base}.{target_ext}")
            };
            out_dir.join(file_name)
        })
        .collect()
}
