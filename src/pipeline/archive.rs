//! Archive probing and entry access for arXiv source bundles.
//!
//! arXiv serves `/e-print/{id}` as a gzipped tar, occasionally a zip, and
//! for single-file submissions a bare (often gzipped) `.tex` or a PDF. The
//! response carries no reliable extension, so the format is found by trial:
//! each decoder in [`DECODERS`] gets a look at the bytes in order and the
//! first one that parses the whole structure wins. Nothing matching is the
//! explicit [`ArchiveKind::Raw`] outcome, never an error.
//!
//! The buffer is immutable after probing. Every scan builds a fresh reader
//! over offset 0, so consumers never share a half-consumed stream.

use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Structural errors while walking an archive that already probed fine.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Source is not an archive")]
    NotAnArchive,
}

/// Container format discovered by [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// A tar stream, plain or gzip-compressed.
    Tar,
    Zip,
    /// Neither; no entry-level access is possible.
    Raw,
}

/// A probed source bundle.
#[derive(Debug, Clone)]
pub struct SourceArchive {
    bytes: Vec<u8>,
    kind: ArchiveKind,
    gzip: bool,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type Decoder = fn(&[u8]) -> bool;

/// Decoders tried in order; the first to accept the bytes decides the kind.
const DECODERS: &[(ArchiveKind, Decoder)] =
    &[(ArchiveKind::Tar, accepts_tar), (ArchiveKind::Zip, accepts_zip)];

/// Determine the container format of `bytes`.
///
/// Never fails: unrecognised input yields [`ArchiveKind::Raw`].
pub fn probe(bytes: Vec<u8>) -> SourceArchive {
    let kind = DECODERS
        .iter()
        .find(|(_, accepts)| accepts(&bytes))
        .map(|(kind, _)| *kind)
        .unwrap_or(ArchiveKind::Raw);

    let gzip = is_gzip(&bytes);
    match kind {
        ArchiveKind::Raw => warn!(
            "Source ({} bytes) is neither tar nor zip; treating as raw content",
            bytes.len()
        ),
        _ => debug!("Probed source as {:?} (gzip: {})", kind, gzip),
    }

    SourceArchive { bytes, kind, gzip }
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

fn tar_reader(bytes: &[u8]) -> Box<dyn Read + '_> {
    if is_gzip(bytes) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    }
}

/// A tar must parse end to end and contain at least one entry.
fn accepts_tar(bytes: &[u8]) -> bool {
    let mut archive = tar::Archive::new(tar_reader(bytes));
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    let mut count = 0usize;
    for entry in entries {
        match entry {
            Ok(_) => count += 1,
            Err(_) => return false,
        }
    }
    count > 0
}

fn accepts_zip(bytes: &[u8]) -> bool {
    ZipArchive::new(Cursor::new(bytes)).is_ok()
}

impl SourceArchive {
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the bytes are gzip-compressed.
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    /// Whether entry-level operations are possible.
    pub fn is_archive(&self) -> bool {
        self.kind != ArchiveKind::Raw
    }

    /// Raw bytes, unchanged from what was probed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Names of all regular-file entries, in archive order.
    ///
    /// Zip names come from the central directory without opening any entry,
    /// so encrypted or unsupported entries are still listed.
    pub fn entry_names(&self) -> Result<Vec<String>, ArchiveError> {
        match self.kind {
            ArchiveKind::Raw => Err(ArchiveError::NotAnArchive),
            ArchiveKind::Zip => {
                let zip = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
                Ok(zip_file_names(&zip))
            }
            ArchiveKind::Tar => {
                let mut names = Vec::new();
                self.visit_files(
                    |name| {
                        names.push(name.to_string());
                        false
                    },
                    |_, _| Ok(Visit::Skip),
                )?;
                Ok(names)
            }
        }
    }

    /// Read the entry named exactly `name`. `Ok(None)` if it does not exist.
    ///
    /// Each call rescans the archive from its start. A tar may carry the
    /// same path more than once (appended updates); the last copy wins, as
    /// it would when the tar is unpacked.
    pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        match self.kind {
            ArchiveKind::Raw => Err(ArchiveError::NotAnArchive),
            ArchiveKind::Zip => {
                let mut zip = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
                let result = match zip.by_name(name) {
                    Ok(mut file) => {
                        let mut buf = Vec::new();
                        file.read_to_end(&mut buf)?;
                        Some(buf)
                    }
                    Err(zip::result::ZipError::FileNotFound) => None,
                    Err(e) => return Err(e.into()),
                };
                Ok(result)
            }
            ArchiveKind::Tar => {
                let mut found = None;
                self.visit_files(
                    |entry_name| entry_name == name,
                    |_, reader| {
                        let mut buf = Vec::new();
                        reader.read_to_end(&mut buf)?;
                        found = Some(buf);
                        Ok(Visit::Skip)
                    },
                )?;
                Ok(found)
            }
        }
    }

    /// Walk regular-file entries from the start of the archive.
    ///
    /// `wanted` sees every entry name first; only accepted entries are
    /// opened and handed to `visit` with a reader over their contents.
    /// Directories, links and other special entries are not visited. A zip
    /// entry that cannot be opened (encrypted, unsupported compression) is
    /// logged and skipped without ending the walk.
    pub fn visit_files<P, F>(&self, mut wanted: P, mut visit: F) -> Result<(), ArchiveError>
    where
        P: FnMut(&str) -> bool,
        F: FnMut(&str, &mut dyn Read) -> Result<Visit, ArchiveError>,
    {
        match self.kind {
            ArchiveKind::Raw => Err(ArchiveError::NotAnArchive),
            ArchiveKind::Tar => {
                let mut archive = tar::Archive::new(tar_reader(&self.bytes));
                for entry in archive.entries()? {
                    let mut entry = entry?;
                    if !entry.header().entry_type().is_file() {
                        continue;
                    }
                    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                    if !wanted(&name) {
                        continue;
                    }
                    if let Visit::Stop = visit(&name, &mut entry)? {
                        break;
                    }
                }
                Ok(())
            }
            ArchiveKind::Zip => {
                let mut zip = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
                for name in zip_file_names(&zip) {
                    if !wanted(&name) {
                        continue;
                    }
                    let mut file = match zip.by_name(&name) {
                        Ok(file) => file,
                        Err(e) => {
                            warn!("Skipping unreadable zip entry '{}': {}", name, e);
                            continue;
                        }
                    };
                    if let Visit::Stop = visit(&name, &mut file)? {
                        break;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Regular-file names from the central directory, in archive order.
fn zip_file_names<R: Read + std::io::Seek>(zip: &ZipArchive<R>) -> Vec<String> {
    (0..zip.len())
        .filter_map(|i| zip.name_for_index(i))
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect()
}

/// Visitor decision for [`SourceArchive::visit_files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Skip,
    Stop,
}

/// In-memory archive builders shared by unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use zip::unstable::write::FileOptionsExt;

    pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&tar_bytes(files)).unwrap();
        enc.finish().unwrap()
    }

    pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// A zip whose first entry is password-protected and so cannot be
    /// opened without a key.
    pub fn zip_with_encrypted_entry(
        secret: (&str, &[u8]),
        files: &[(&str, &[u8])],
    ) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let locked = zip::write::SimpleFileOptions::default().with_deprecated_encryption(b"secret");
        zip.start_file(secret.0, locked).unwrap();
        zip.write_all(secret.1).unwrap();
        for (name, data) in files {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub fn gz_bytes(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }
}
