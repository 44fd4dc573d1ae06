//! File operations for uploads.
//!
//! - [`Manifest`]: the ordered `(name, declared size)` list sent at init
//! - [`ChunkReader`]: reads a file in fixed-size slices (client side)
//! - [`ChunkWriter`]: writes slices at a tracked offset (server side)
//! - [`validate_name`]: keeps client-supplied names inside the destination

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::FIELD_SEPARATOR;

/// One file announced in the init message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name as it will appear in the destination directory
    pub name: String,
    /// Declared size in bytes (advisory, used for progress display)
    pub size: u64,
}

impl ManifestEntry {
    /// Create a new entry.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Ordered list of files in one upload session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from entries.
    #[must_use]
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Build a manifest from local file paths, in the given order.
    ///
    /// Each entry is named after the final path component and sized from
    /// the file's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a path has no usable file name, two paths share
    /// a file name, or a file cannot be stat'ed.
    pub async fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| !n.contains(FIELD_SEPARATOR))
                .ok_or_else(|| Error::InvalidName(path.display().to_string()))?;
            let metadata = tokio::fs::metadata(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FileNotFound(path.display().to_string())
                } else {
                    Error::Io(e)
                }
            })?;
            entries.push(ManifestEntry::new(name, metadata.len()));
        }
        let manifest = Self { entries };
        manifest.check_unique_names()?;
        Ok(manifest)
    }

    /// Fail on the first name that appears twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateName`] with the repeated name.
    pub fn check_unique_names(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::DuplicateName(entry.name.clone()));
            }
        }
        Ok(())
    }

    /// All entries in upload order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ManifestEntry> {
        self.entries.get(index)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to upload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of declared sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Expand upload arguments into a flat list of files.
///
/// Regular files are kept as given. A directory contributes the regular
/// files directly inside it, sorted by name; nested directories are not
/// descended into.
///
/// # Errors
///
/// Returns an error if a path does not exist or a directory cannot be read.
pub fn collect_upload_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    use walkdir::WalkDir;

    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
    }
    Ok(files)
}

/// Check that a client-supplied name is a single normal path component.
///
/// Rejects empty names, separators, `.`/`..`, and absolute or prefixed
/// paths, so `base.join(name)` always stays directly under `base`.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] if the name is unsafe.
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(Error::InvalidName(name.to_string())),
    }
}

/// Reads a file in fixed-size slices.
#[derive(Debug)]
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    bytes_read: u64,
}

impl ChunkReader {
    /// Open `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or `chunk_size` is 0.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "client.chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(Self {
            file,
            chunk_size,
            bytes_read: 0,
        })
    }

    /// Read the next slice.
    ///
    /// Every slice is exactly `chunk_size` bytes except the last one.
    /// Returns `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.file.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        buffer.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(Some(buffer))
    }

    /// Total bytes handed out so far.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// Writes inbound slices for one destination file.
///
/// The file is created (or truncated) when the writer is created, so a
/// zero-length upload still produces an empty file. Each write opens the
/// file, writes at the tracked offset and closes it again; no handle is
/// held between frames.
#[derive(Debug)]
pub struct ChunkWriter {
    path: PathBuf,
    offset: u64,
}

impl ChunkWriter {
    /// Create or truncate the destination file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub async fn create(path: PathBuf) -> Result<Self> {
        tokio::fs::File::create(&path).await?;
        Ok(Self { path, offset: 0 })
    }

    /// Write `data` at the current offset and advance the offset by its
    /// length. Returns the new offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written; the offset
    /// is left unchanged in that case.
    pub async fn write(&mut self, data: &[u8]) -> Result<u64> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        self.offset += data.len() as u64;
        Ok(self.offset)
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("no-extension").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("nested/file.txt").is_err());
        assert!(validate_name("/absolute").is_err());
        assert!(validate_name("trailing/").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_collect_upload_paths_expands_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.txt"), b"c").unwrap();

        let files = collect_upload_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_collect_upload_paths_missing() {
        let dir = TempDir::new().unwrap();
        let result = collect_upload_paths(&[dir.path().join("missing")]);
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_manifest_from_paths() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, b"bye").unwrap();

        let manifest = Manifest::from_paths(&[a, b]).await.unwrap();
        assert_eq!(
            manifest.entries(),
            &[ManifestEntry::new("a.txt", 5), ManifestEntry::new("b.txt", 3)]
        );
        assert_eq!(manifest.total_size(), 8);
    }

    #[tokio::test]
    async fn test_manifest_rejects_shared_file_name() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("d1")).unwrap();
        std::fs::create_dir(dir.path().join("d2")).unwrap();
        let first = dir.path().join("d1/a.txt");
        let second = dir.path().join("d2/a.txt");
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();

        let result = Manifest::from_paths(&[first, second]).await;
        assert!(matches!(result, Err(Error::DuplicateName(ref name)) if name == "a.txt"));
    }

    #[tokio::test]
    async fn test_manifest_rejects_separator_in_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a|b.txt");
        std::fs::write(&path, b"x").unwrap();

        let result = Manifest::from_paths(&[path]).await;
        assert!(matches!(result, Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_check_unique_names() {
        let unique = Manifest::new(vec![
            ManifestEntry::new("a.txt", 1),
            ManifestEntry::new("b.txt", 1),
        ]);
        assert!(unique.check_unique_names().is_ok());

        let repeated = Manifest::new(vec![
            ManifestEntry::new("a.txt", 1),
            ManifestEntry::new("b.txt", 1),
            ManifestEntry::new("a.txt", 2),
        ]);
        assert!(matches!(
            repeated.check_unique_names(),
            Err(Error::DuplicateName(ref name)) if name == "a.txt"
        ));
    }

    #[tokio::test]
    async fn test_chunk_reader_slices() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 10]).unwrap();

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        let mut sizes = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(reader.bytes_read(), 10);
    }

    #[tokio::test]
    async fn test_chunk_reader_rejects_zero_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"x").unwrap();

        assert!(ChunkReader::open(&path, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_chunk_writer_appends_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, b"stale content that is longer").unwrap();

        let mut writer = ChunkWriter::create(path.clone()).await.unwrap();
        assert_eq!(writer.write(b"hel").await.unwrap(), 3);
        assert_eq!(writer.write(b"lo").await.unwrap(), 5);

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_chunk_writer_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");

        let writer = ChunkWriter::create(path.clone()).await.unwrap();
        assert_eq!(writer.offset(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"");
    }
}
