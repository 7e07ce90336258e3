//! Artifact storage: the on-disk layout of everything a run produces.
//!
//! ```text
//! {root}/
//!   {stem}_data.json     metadata record (ResultBundle), overwritten per run
//!   {stem}_1.png         figure images, 1-based sequence index in match order
//!   {stem}_2.pdf
//!   {stem}_images.zip    on-demand bundle of the images, never primary
//! ```
//!
//! `stem` is [`PaperId::file_stem`]. File names never contain anything the
//! collaborator produced, so a hostile or confused `file_path` cannot
//! escape `root` or collide with another paper's files.
//!
//! The store is passed explicitly into every stage that writes; two stores
//! with different roots share nothing.

use crate::error::FigureError;
use crate::output::ResultBundle;
use crate::pipeline::fetch::PaperId;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A directory holding per-paper artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the `index`-th image of `id` (1-based).
    pub fn image_filename(id: &PaperId, index: usize, extension: &str) -> String {
        format!("{}_{}.{}", id.file_stem(), index, extension)
    }

    pub fn metadata_path(&self, id: &PaperId) -> PathBuf {
        self.root.join(format!("{}_data.json", id.file_stem()))
    }

    pub fn bundle_path(&self, id: &PaperId) -> PathBuf {
        self.root.join(format!("{}_images.zip", id.file_stem()))
    }

    /// Create the root directory if needed.
    pub async fn ensure_root(&self) -> Result<(), FigureError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| FigureError::StorageFailed {
                path: self.root.clone(),
                source: e,
            })
    }

    /// Write one image file, replacing any previous file of that name.
    pub async fn write_image(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, FigureError> {
        let path = self.artifact_path(filename)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| FigureError::StorageFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Persist the metadata record for `id`, replacing any previous one.
    ///
    /// Uses atomic write (temp file + rename) so readers never see a
    /// half-written record.
    pub async fn write_metadata(
        &self,
        id: &PaperId,
        bundle: &ResultBundle,
    ) -> Result<PathBuf, FigureError> {
        let path = self.metadata_path(id);
        let json = serde_json::to_vec_pretty(bundle)
            .map_err(|e| FigureError::Internal(format!("Failed to serialise metadata: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| FigureError::StorageFailed {
                path: path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| FigureError::StorageFailed {
                path: path.clone(),
                source: e,
            })?;

        info!(
            "Saved metadata for {} images to {}",
            bundle.images.len(),
            path.display()
        );
        Ok(path)
    }

    /// Load the metadata record for `id`.
    pub async fn load_metadata(&self, id: &PaperId) -> Result<ResultBundle, FigureError> {
        let path = self.metadata_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FigureError::ArtifactNotFound { path })
            }
            Err(e) => return Err(FigureError::StorageFailed { path, source: e }),
        };
        serde_json::from_slice(&bytes).map_err(|e| FigureError::MetadataCorrupt {
            path,
            detail: e.to_string(),
        })
    }

    /// Image files of `id` present on disk, ordered by sequence index.
    ///
    /// Only names of the exact form `{stem}_{n}.{ext}` count, so
    /// `2301.1234` never picks up files of `2301.12345`.
    pub fn image_files(&self, id: &PaperId) -> Result<Vec<PathBuf>, FigureError> {
        let pattern = Regex::new(&format!(
            r"^{}_(\d+)\.[A-Za-z0-9]+$",
            regex::escape(&id.file_stem())
        ))
        .map_err(|e| FigureError::Internal(e.to_string()))?;

        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FigureError::StorageFailed {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        let mut files: Vec<(u64, PathBuf)> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let index = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
                Some((index, entry.path()))
            })
            .collect();
        files.sort_by_key(|(index, _)| *index);
        Ok(files.into_iter().map(|(_, p)| p).collect())
    }

    /// Build `{stem}_images.zip` from the images of `id`.
    ///
    /// The images listed in the metadata record are bundled when the record
    /// exists; otherwise every `{stem}_{n}.{ext}` file on disk. The zip is
    /// written to a temp file and renamed into place.
    pub async fn write_image_bundle(&self, id: &PaperId) -> Result<PathBuf, FigureError> {
        let files = match self.load_metadata(id).await {
            Ok(bundle) => bundle
                .images
                .iter()
                .map(|a| self.root.join(&a.stored_filename))
                .collect(),
            Err(FigureError::ArtifactNotFound { .. }) => self.image_files(id)?,
            Err(e) => return Err(e),
        };

        let root = self.root.clone();
        let zip_path = self.bundle_path(id);
        let target = zip_path.clone();
        let count = files.len();
        tokio::task::spawn_blocking(move || write_zip(&root, &target, &files))
            .await
            .map_err(|e| FigureError::Internal(format!("bundle task failed: {e}")))??;

        info!("Bundled {} images into {}", count, zip_path.display());
        Ok(zip_path)
    }

    /// Read one stored artifact by bare file name.
    ///
    /// Names containing path separators or `..` are rejected.
    pub async fn read_artifact(&self, filename: &str) -> Result<Vec<u8>, FigureError> {
        let path = self.artifact_path(filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FigureError::ArtifactNotFound { path })
            }
            Err(e) => Err(FigureError::StorageFailed { path, source: e }),
        }
    }

    fn artifact_path(&self, filename: &str) -> Result<PathBuf, FigureError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(FigureError::ArtifactNotFound {
                path: PathBuf::from(filename),
            });
        }
        Ok(self.root.join(filename))
    }
}

fn write_zip(root: &Path, target: &Path, files: &[PathBuf]) -> Result<(), FigureError> {
    let bundle_err = |detail: String| FigureError::BundleFailed {
        path: target.to_path_buf(),
        detail,
    };

    let tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| bundle_err(e.to_string()))?;
    let mut zip = zip::ZipWriter::new(tmp);
    let options = zip::write::SimpleFileOptions::default();

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| bundle_err(format!("not a file: {}", file.display())))?;
        let bytes = std::fs::read(file).map_err(|e| bundle_err(format!("{name}: {e}")))?;
        zip.start_file(name.as_str(), options)
            .map_err(|e| bundle_err(e.to_string()))?;
        zip.write_all(&bytes).map_err(|e| bundle_err(e.to_string()))?;
    }

    let tmp = zip.finish().map_err(|e| bundle_err(e.to_string()))?;
    tmp.persist(target).map_err(|e| bundle_err(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ImageArtifact;
    use std::io::Read;

    fn id(s: &str) -> PaperId {
        PaperId::parse(s).unwrap()
    }

    fn artifact(name: &str) -> ImageArtifact {
        ImageArtifact {
            figure_number: "1".into(),
            stored_filename: name.into(),
            original_path: "images/plot.png".into(),
            caption: "c".into(),
        }
    }

    #[test]
    fn names_are_derived_from_id_and_index() {
        assert_eq!(ArtifactStore::image_filename(&id("1706.03762"), 1, "png"), "1706.03762_1.png");
        assert_eq!(
            ArtifactStore::image_filename(&id("hep-th/9901001"), 12, "pdf"),
            "hep-th_9901001_12.pdf"
        );
        let store = ArtifactStore::new("/data");
        assert_eq!(
            store.metadata_path(&id("1706.03762")),
            PathBuf::from("/data/1706.03762_data.json")
        );
    }

    #[tokio::test]
    async fn metadata_round_trips_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pid = id("2101.00001");

        let first = ResultBundle {
            arxiv_id: pid.to_string(),
            images: vec![artifact("2101.00001_1.png"), artifact("2101.00001_2.png")],
        };
        store.write_metadata(&pid, &first).await.unwrap();
        let second = ResultBundle {
            arxiv_id: pid.to_string(),
            images: vec![artifact("2101.00001_1.png")],
        };
        store.write_metadata(&pid, &second).await.unwrap();

        assert_eq!(store.load_metadata(&pid).await.unwrap(), second);
        assert!(!dir.path().join("2101.00001_data.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_and_corrupt_metadata_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pid = id("2101.00001");
        assert!(matches!(
            store.load_metadata(&pid).await,
            Err(FigureError::ArtifactNotFound { .. })
        ));
        std::fs::write(store.metadata_path(&pid), b"{not json").unwrap();
        assert!(matches!(
            store.load_metadata(&pid).await,
            Err(FigureError::MetadataCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn image_files_do_not_leak_across_prefix_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        for name in [
            "2301.1234_2.png",
            "2301.1234_1.pdf",
            "2301.12345_1.png",
            "2301.1234_data.json",
            "2301.1234_images.zip",
        ] {
            store.write_image(name, b"x").await.unwrap();
        }
        let files = store.image_files(&id("2301.1234")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2301.1234_1.pdf", "2301.1234_2.png"]);
    }

    #[tokio::test]
    async fn bundle_contains_exactly_the_recorded_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pid = id("2101.00001");
        store.write_image("2101.00001_1.png", b"one").await.unwrap();
        store.write_image("2101.00001_2.png", b"stale").await.unwrap();
        store
            .write_metadata(
                &pid,
                &ResultBundle {
                    arxiv_id: pid.to_string(),
                    images: vec![artifact("2101.00001_1.png")],
                },
            )
            .await
            .unwrap();

        let zip_path = store.write_image_bundle(&pid).await.unwrap();
        let mut zip = zip::ZipArchive::new(std::fs::File::open(zip_path).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        let mut content = String::new();
        zip.by_name("2101.00001_1.png")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "one");
    }

    #[tokio::test]
    async fn artifact_reads_reject_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.write_image("a_1.png", b"img").await.unwrap();
        assert_eq!(store.read_artifact("a_1.png").await.unwrap(), b"img");
        for bad in ["../a_1.png", "sub/a_1.png", "", "..\\x"] {
            assert!(store.read_artifact(bad).await.is_err(), "{bad:?}");
        }
        assert!(store.write_image("../escape.png", b"x").await.is_err());
    }
}
