//! Identifier-scoped artifact storage.
//!
//! Every uploaded dataset gets an opaque [`DatasetId`], and all derived
//! artifacts (the raw upload, generated scripts, cleaned tables, reports)
//! are stored keyed by that identifier. The [`ArtifactStore`] trait exists
//! so tests can swap in a store rooted at a temporary directory; production
//! uses [`FsArtifactStore`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque unique token minted once per uploaded file.
///
/// Scopes all derived artifacts; destroying it (via
/// [`ArtifactStore::delete_all`]) removes everything derived from the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::error::CleaningError::InvalidConfig(format!("bad dataset id: {e}")))
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kinds of artifacts tracked per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The original uploaded file, stored verbatim.
    RawUpload,
    /// The generated Python cleaning script.
    GeneratedScript,
    /// The script generated for the final validation-and-cleanup pass.
    MasterScript,
    /// The cleaned table written by a committed cleaning attempt.
    CleanedTable,
    /// The table produced by the final master pass.
    FinalTable,
    /// The Markdown QA report.
    Report,
}

impl ArtifactKind {
    /// All artifact kinds, in lifecycle order.
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::RawUpload,
        ArtifactKind::GeneratedScript,
        ArtifactKind::CleanedTable,
        ArtifactKind::MasterScript,
        ArtifactKind::FinalTable,
        ArtifactKind::Report,
    ];

    /// Human-readable name for diagnostics.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::RawUpload => "raw upload",
            Self::GeneratedScript => "generated script",
            Self::MasterScript => "master script",
            Self::CleanedTable => "cleaned table",
            Self::FinalTable => "final table",
            Self::Report => "QA report",
        }
    }
}

/// Identifier-scoped artifact storage.
///
/// `get` returns a path only when the artifact actually exists on disk;
/// downstream stages rely on this as the commit-atomicity check, so an
/// implementation must never report a path for content that was not durably
/// written.
pub trait ArtifactStore: Send + Sync {
    /// Write `content` as the artifact of `kind` for `id`, returning its path.
    /// A later `put` for the same `(id, kind)` overwrites.
    fn put(&self, id: DatasetId, kind: ArtifactKind, content: &[u8]) -> Result<PathBuf>;

    /// Store an uploaded file as the raw-upload artifact, preserving its
    /// source extension.
    fn put_upload(&self, id: DatasetId, source: &Path) -> Result<PathBuf>;

    /// Reserve a staging path where an external process will produce the
    /// artifact. Parent directories are created, the file itself is not, and
    /// any stale staging file left by an earlier attempt is removed. Content
    /// written there becomes visible to `get` only after `commit`.
    fn reserve(&self, id: DatasetId, kind: ArtifactKind) -> Result<PathBuf>;

    /// Promote the staged file from `reserve` to the committed artifact,
    /// replacing a previously committed one. Fails with
    /// [`CleaningError::MissingArtifact`](crate::error::CleaningError) when
    /// nothing was staged, so a producer that wrote nothing can never
    /// re-expose an older attempt's artifact.
    fn commit(&self, id: DatasetId, kind: ArtifactKind) -> Result<PathBuf>;

    /// Path of an existing committed artifact, or `None` if absent on disk.
    fn get(&self, id: DatasetId, kind: ArtifactKind) -> Option<PathBuf>;

    /// Remove every artifact kind for the identifier.
    fn delete_all(&self, id: DatasetId) -> Result<()>;
}

/// Filesystem-backed artifact store.
///
/// Layout under the root directory:
///
/// ```text
/// uploads/<id>.<ext>
/// scripts/<id>/clean_<id>.py
/// cleaned/cleaned_<id>.csv
/// cleaned/final_<id>.csv
/// reports/<id>/report_<id>.md
/// ```
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory tree.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["uploads", "scripts", "cleaned", "reports"] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, id: DatasetId, kind: ArtifactKind) -> PathBuf {
        match kind {
            // The raw upload keeps its original extension; `put` records it
            // and `get` scans for it, since uploads may be .csv or .tsv.
            ArtifactKind::RawUpload => self.root.join("uploads").join(format!("{id}.csv")),
            ArtifactKind::GeneratedScript => self
                .root
                .join("scripts")
                .join(id.to_string())
                .join(format!("clean_{id}.py")),
            ArtifactKind::MasterScript => self
                .root
                .join("scripts")
                .join(id.to_string())
                .join(format!("master_clean_{id}.py")),
            ArtifactKind::CleanedTable => self.root.join("cleaned").join(format!("cleaned_{id}.csv")),
            ArtifactKind::FinalTable => self.root.join("cleaned").join(format!("final_{id}.csv")),
            ArtifactKind::Report => self
                .root
                .join("reports")
                .join(id.to_string())
                .join(format!("report_{id}.md")),
        }
    }

    // Staging files sit next to the committed artifact with a name prefix,
    // keeping the extension so readers dispatch on it unchanged.
    fn staging_path(&self, id: DatasetId, kind: ArtifactKind) -> PathBuf {
        let path = self.artifact_path(id, kind);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("staging_{name}"))
    }

    fn find_upload(&self, id: DatasetId) -> Option<PathBuf> {
        let uploads = self.root.join("uploads");
        let prefix = format!("{id}.");
        let entries = fs::read_dir(&uploads).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                return Some(entry.path());
            }
        }
        None
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, id: DatasetId, kind: ArtifactKind, content: &[u8]) -> Result<PathBuf> {
        // Re-putting a raw upload must hit the file the extension-preserving
        // scan will find, not mint a second upload with a different name.
        let path = match kind {
            ArtifactKind::RawUpload => self
                .find_upload(id)
                .unwrap_or_else(|| self.artifact_path(id, kind)),
            _ => self.artifact_path(id, kind),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    // Extensions other than the recognized tabular ones are accepted here;
    // the reader rejects them at load time.
    fn put_upload(&self, id: DatasetId, source: &Path) -> Result<PathBuf> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("csv")
            .to_lowercase();
        let dest = self.root.join("uploads").join(format!("{id}.{ext}"));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &dest)?;
        Ok(dest)
    }

    fn reserve(&self, id: DatasetId, kind: ArtifactKind) -> Result<PathBuf> {
        let path = self.staging_path(id, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // A leftover from an aborted attempt must not be mistaken for this
        // attempt's output.
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(path)
    }

    fn commit(&self, id: DatasetId, kind: ArtifactKind) -> Result<PathBuf> {
        let staged = self.staging_path(id, kind);
        if !staged.exists() {
            return Err(crate::error::CleaningError::MissingArtifact(format!(
                "no staged {} for dataset {id}",
                kind.display_name()
            )));
        }
        let path = self.artifact_path(id, kind);
        fs::rename(&staged, &path)?;
        Ok(path)
    }

    fn get(&self, id: DatasetId, kind: ArtifactKind) -> Option<PathBuf> {
        if kind == ArtifactKind::RawUpload {
            return self.find_upload(id);
        }
        let path = self.artifact_path(id, kind);
        path.exists().then_some(path)
    }

    fn delete_all(&self, id: DatasetId) -> Result<()> {
        if let Some(upload) = self.find_upload(id) {
            fs::remove_file(upload)?;
        }
        for kind in [
            ArtifactKind::CleanedTable,
            ArtifactKind::FinalTable,
        ] {
            for path in [self.artifact_path(id, kind), self.staging_path(id, kind)] {
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
        }
        // Scripts and reports live in per-id directories.
        for dir in [
            self.root.join("scripts").join(id.to_string()),
            self.root.join("reports").join(id.to_string()),
        ] {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}
