//! Output titles and directory layout of a run.

use std::path::{Path, PathBuf};

/// Turns an image title into the stem used for every output file.
///
/// Drops directories and the file extension, replaces whitespace with `_`,
/// removes `_-_` separators, collapses repeated underscores, trims leading and
/// trailing underscores and spells `#` as `Series`.
pub fn sanitize_title(title: &str) -> String {
    let base = title
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(title);
    let base = base.replace(".czi", "");
    let base = strip_extension(&base);

    let mut sanitized: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    while sanitized.contains("_-_") {
        sanitized = sanitized.replace("_-_", "_");
    }
    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    sanitized.trim_matches('_').replace('#', "Series")
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic()) =>
        {
            stem
        }
        _ => name,
    }
}

/// Where a run writes its files.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
    title: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, image_title: &str) -> Self {
        Self {
            root: root.into(),
            title: sanitize_title(image_title),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identify_fibers_dir(&self) -> PathBuf {
        self.root.join(&self.title).join("1_identify_fibers")
    }

    pub fn central_nuclei_dir(&self) -> PathBuf {
        self.root.join("2a_central_nuclei_counter")
    }

    pub fn fiber_typing_dir(&self) -> PathBuf {
        self.root.join("2c_fibertyping")
    }

    pub fn manual_rerun_dir(&self) -> PathBuf {
        self.root.clone()
    }

    /// `<title><suffix>` inside `dir`, without extension.
    pub fn titled(&self, dir: &Path, suffix: &str) -> PathBuf {
        dir.join(format!("{}{suffix}", self.title))
    }
}
