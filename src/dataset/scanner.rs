//! Directory scanner producing labeled image records
//!
//! Expected layout is `root/<label>/<image-file>`, one level deep:
//! ```text
//! root/
//! ├── daisy/
//! │   ├── 100080576.jpg
//! │   └── 102841525.png
//! └── tulips/
//!     └── ...
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::format::{classify, ImageFormat, MAX_SIGNATURE_LEN};
use super::ImageRecord;
use crate::config::DatasetConfig;
use crate::error::Result;

/// How records get their label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// Name of the immediate subfolder
    FolderName,
    /// Same label for every record
    Fixed(String),
}

/// Walks a dataset root and emits one record per readable JPEG/PNG file
#[derive(Debug, Clone)]
pub struct DatasetScanner {
    root: PathBuf,
    labels: LabelSource,
}

impl DatasetScanner {
    pub fn new(root: impl Into<PathBuf>, labels: LabelSource) -> Self {
        Self {
            root: root.into(),
            labels,
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        let labels = if config.use_folder_name_as_label {
            LabelSource::FolderName
        } else {
            LabelSource::Fixed(config.default_label.clone())
        };
        Self::new(&config.root, labels)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan every label folder under the root.
    ///
    /// Files that cannot be read are logged and skipped. Records come back
    /// sorted by path so repeated scans of an unchanged tree agree.
    pub fn scan(&self) -> Result<Vec<ImageRecord>> {
        info!("Scanning dataset at {:?}", self.root);

        let mut candidates: Vec<(PathBuf, String)> = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {:?}: {}", self.root, e);
                    continue;
                }
            };
            // Follows symlinked label folders
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable entry {:?}: {}", entry.path(), e);
                    continue;
                }
            }

            let label = match &self.labels {
                LabelSource::FolderName => entry.file_name().to_string_lossy().into_owned(),
                LabelSource::Fixed(label) => label.clone(),
            };

            for file in WalkDir::new(entry.path()).min_depth(1).max_depth(1).follow_links(true) {
                match file {
                    Ok(file) if file.file_type().is_file() => {
                        candidates.push((file.into_path(), label.clone()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry: {}", e),
                }
            }
        }

        let mut records: Vec<ImageRecord> = candidates
            .into_par_iter()
            .filter_map(|(path, label)| match sniff_file(&path) {
                Ok(format) if format.is_accepted() => Some(ImageRecord::new(path, label)),
                Ok(format) => {
                    debug!("Skipping {:?}: {} is not an accepted image format", path, format);
                    None
                }
                Err(e) => {
                    warn!("Skipping unreadable file {:?}: {}", path, e);
                    None
                }
            })
            .collect();

        records.sort_by(|a, b| a.source.path().cmp(&b.source.path()));
        info!("Found {} images", records.len());
        Ok(records)
    }

    /// Accepted images directly inside `dir` (no recursion), sorted by path
    pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let mut images: Vec<PathBuf> = WalkDir::new(dir.as_ref())
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| sniff_file(p).map(|f| f.is_accepted()).unwrap_or(false))
            .collect();
        images.sort();
        Ok(images)
    }
}

/// Read just enough of a file to classify it
pub fn sniff_file(path: &Path) -> std::io::Result<ImageFormat> {
    let mut header = Vec::with_capacity(MAX_SIGNATURE_LEN);
    File::open(path)?
        .take(MAX_SIGNATURE_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(classify(&header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PNG_HEADER: &[u8] = &[137, 80, 78, 71, 13, 10, 26, 10];
    const JPEG_HEADER: &[u8] = &[255, 216, 255, 224, 0, 16];

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let daisy = dir.path().join("daisy");
        let roses = dir.path().join("roses");
        fs::create_dir(&daisy).unwrap();
        fs::create_dir(&roses).unwrap();
        fs::create_dir(daisy.join("nested")).unwrap();

        fs::write(daisy.join("a.png"), PNG_HEADER).unwrap();
        fs::write(daisy.join("b.jpg"), JPEG_HEADER).unwrap();
        fs::write(daisy.join("notes.txt"), b"not an image").unwrap();
        fs::write(daisy.join("nested").join("deep.png"), PNG_HEADER).unwrap();
        fs::write(roses.join("c.jpg"), JPEG_HEADER).unwrap();
        fs::write(roses.join("d.gif"), b"GIF89a").unwrap();
        fs::write(roses.join("empty.png"), b"").unwrap();
        fs::write(dir.path().join("root-level.png"), PNG_HEADER).unwrap();
        dir
    }

    #[test]
    fn test_scan_uses_folder_names() {
        let dir = fixture();
        let records = DatasetScanner::new(dir.path(), LabelSource::FolderName)
            .scan()
            .unwrap();

        let summary: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.file_name().unwrap(), r.label.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.png".to_string(), "daisy".to_string()),
                ("b.jpg".to_string(), "daisy".to_string()),
                ("c.jpg".to_string(), "roses".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_with_fixed_label() {
        let dir = fixture();
        let records = DatasetScanner::new(dir.path(), LabelSource::Fixed("unlabeled".into()))
            .scan()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.label == "unlabeled"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = fixture();
        let elsewhere = TempDir::new().unwrap();
        let tulips = elsewhere.path().join("tulips");
        fs::create_dir(&tulips).unwrap();
        fs::write(tulips.join("t.png"), PNG_HEADER).unwrap();
        fs::write(elsewhere.path().join("real.png"), PNG_HEADER).unwrap();

        symlink(&tulips, dir.path().join("tulips")).unwrap();
        symlink(elsewhere.path().join("real.png"), dir.path().join("daisy").join("linked.png")).unwrap();

        let records = DatasetScanner::new(dir.path(), LabelSource::FolderName)
            .scan()
            .unwrap();
        let summary: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.file_name().unwrap(), r.label.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.png".to_string(), "daisy".to_string()),
                ("b.jpg".to_string(), "daisy".to_string()),
                ("linked.png".to_string(), "daisy".to_string()),
                ("c.jpg".to_string(), "roses".to_string()),
                ("t.png".to_string(), "tulips".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_dangling_links() {
        use std::os::unix::fs::symlink;

        let dir = fixture();
        symlink(dir.path().join("gone.png"), dir.path().join("daisy").join("linked.png")).unwrap();
        symlink(dir.path().join("gone"), dir.path().join("lilies")).unwrap();

        let records = DatasetScanner::new(dir.path(), LabelSource::FolderName)
            .scan()
            .unwrap();
        let names: Vec<String> = records.iter().map(|r| r.file_name().unwrap()).collect();
        assert_eq!(names, vec!["a.png", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let scanner = DatasetScanner::new(dir.path().join("missing"), LabelSource::FolderName);
        assert!(scanner.scan().is_err());
    }

    #[test]
    fn test_list_images_is_flat() {
        let dir = fixture();
        let images = DatasetScanner::list_images(dir.path().join("daisy")).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn test_sniff_file() {
        let dir = fixture();
        assert_eq!(sniff_file(&dir.path().join("daisy/a.png")).unwrap(), ImageFormat::Png);
        assert_eq!(sniff_file(&dir.path().join("roses/empty.png")).unwrap(), ImageFormat::Unknown);
        assert!(sniff_file(&dir.path().join("nope.png")).is_err());
    }
}
