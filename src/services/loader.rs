//! PDF discovery and per-page text extraction.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LoadError;
use crate::models::{DocumentsConfig, PageUnit};
use crate::utils::{is_pdf_file, normalize_page_text};

/// Extracts raw page texts from one PDF file, in page order.
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoadError>;
}

/// Page extraction backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoadError> {
        let document = lopdf::Document::load(path).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        // get_pages is keyed by 1-based page number, already ordered
        document
            .get_pages()
            .keys()
            .map(|page_number| {
                document
                    .extract_text(&[*page_number])
                    .map_err(|e| LoadError::Parse {
                        path: path.to_path_buf(),
                        message: format!("page {page_number}: {e}"),
                    })
            })
            .collect()
    }
}

/// Outcome of loading a document directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub pages: Vec<PageUnit>,
    pub files_scanned: usize,
    pub files_loaded: usize,
    /// Pages with no text left after normalization. They are still listed in
    /// `pages` and yield no chunks.
    pub blank_pages: usize,
    pub failures: Vec<LoadError>,
}

impl LoadReport {
    pub fn directory_missing(&self) -> bool {
        self.failures
            .iter()
            .any(|e| matches!(e, LoadError::DirectoryNotFound(_)))
    }

    /// True when no page carries any text.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.is_empty())
    }
}

/// PDF files found under a directory, plus entries the walk could not read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub failures: Vec<LoadError>,
}

/// Reads every PDF in a directory into page units.
pub struct DocumentLoader {
    extractor: Box<dyn PageExtractor>,
    recursive: bool,
    exclude_patterns: Vec<glob::Pattern>,
}

impl DocumentLoader {
    pub fn new(config: &DocumentsConfig) -> Self {
        Self::with_extractor(config, Box::new(LopdfExtractor))
    }

    pub fn with_extractor(config: &DocumentsConfig, extractor: Box<dyn PageExtractor>) -> Self {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();

        Self {
            extractor,
            recursive: config.recursive,
            exclude_patterns,
        }
    }

    /// PDF files under `directory`, sorted by path. Unreadable entries are
    /// collected and the walk goes on.
    pub fn discover(&self, directory: &Path) -> Result<Discovery, LoadError> {
        if !directory.is_dir() {
            return Err(LoadError::DirectoryNotFound(directory.to_path_buf()));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut found = Discovery::default();

        for entry in WalkDir::new(directory)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    found.failures.push(LoadError::Walk(e.to_string()));
                    continue;
                }
            };
            let path = entry.path();

            if !entry.file_type().is_file() || !is_pdf_file(path) {
                continue;
            }

            let path_str = path.to_string_lossy();
            if self.exclude_patterns.iter().any(|p| p.matches(&path_str)) {
                tracing::debug!(path = %path.display(), "excluded by pattern");
                continue;
            }

            found.files.push(path.to_path_buf());
        }

        Ok(found)
    }

    /// Load one page unit per PDF page, blank pages included. Never fails:
    /// problems go to `failures`.
    pub fn load(&self, directory: &Path) -> LoadReport {
        let mut report = LoadReport::default();

        let files = match self.discover(directory) {
            Ok(found) => {
                report.failures.extend(found.failures);
                found.files
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot scan document directory");
                report.failures.push(e);
                return report;
            }
        };

        tracing::info!(directory = %directory.display(), files = files.len(), "scanning PDFs");
        report.files_scanned = files.len();

        for path in &files {
            match self.extractor.extract_pages(path) {
                Ok(raw_pages) => {
                    let source_path = path.to_string_lossy().to_string();
                    let before = report.pages.len();
                    for (idx, raw) in raw_pages.iter().enumerate() {
                        let text = normalize_page_text(raw);
                        if text.is_empty() {
                            report.blank_pages += 1;
                        }
                        report
                            .pages
                            .push(PageUnit::new(text, source_path.clone(), idx as u32 + 1));
                    }
                    report.files_loaded += 1;
                    tracing::debug!(
                        path = %path.display(),
                        pages = report.pages.len() - before,
                        "loaded PDF"
                    );
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable PDF");
                    report.failures.push(e);
                }
            }
        }

        if report.is_empty() {
            tracing::warn!(directory = %directory.display(), "no PDF content found");
        } else {
            tracing::info!(
                pages = report.pages.len(),
                files = report.files_loaded,
                "loaded pages"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    /// Serves canned pages by file name; names absent from the map fail to parse.
    struct FakeExtractor(HashMap<String, Vec<String>>);

    impl PageExtractor for FakeExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoadError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.0.get(&name).cloned().ok_or_else(|| LoadError::Parse {
                path: path.to_path_buf(),
                message: "corrupt xref table".to_string(),
            })
        }
    }

    fn loader(pages: &[(&str, &[&str])], recursive: bool) -> DocumentLoader {
        let map = pages
            .iter()
            .map(|(name, texts)| {
                (
                    name.to_string(),
                    texts.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        let config = DocumentsConfig {
            recursive,
            ..Default::default()
        };
        DocumentLoader::with_extractor(&config, Box::new(FakeExtractor(map)))
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let report = loader(&[], false).load(&dir.path().join("nope"));
        assert!(report.pages.is_empty());
        assert!(report.directory_missing());
    }

    #[test]
    fn test_pages_numbered_from_one_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.pdf"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let report = loader(&[("a.pdf", &["first", "second"]), ("b.pdf", &["third"])], false)
            .load(dir.path());

        assert_eq!(report.files_scanned, 2);
        let summary: Vec<(String, u32)> = report
            .pages
            .iter()
            .map(|p| (p.text.clone(), p.page_number))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("first".to_string(), 1),
                ("second".to_string(), 2),
                ("third".to_string(), 1)
            ]
        );
        assert!(report.pages[0].source_path.ends_with("a.pdf"));
    }

    #[test]
    fn test_parse_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"").unwrap();
        fs::write(dir.path().join("good.pdf"), b"").unwrap();

        let report = loader(&[("good.pdf", &["usable text"])], false).load(dir.path());

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], LoadError::Parse { .. }));
        assert!(!report.directory_missing());
    }

    #[test]
    fn test_blank_pages_are_kept_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scan.pdf"), b"").unwrap();

        let report = loader(&[("scan.pdf", &["cover", "  \n ", "body"])], false).load(dir.path());

        assert_eq!(report.blank_pages, 1);
        let numbers: Vec<u32> = report.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(report.pages[1].text.is_empty());
        assert!(!report.is_empty());
    }

    #[test]
    fn test_only_blank_pages_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scan.pdf"), b"").unwrap();

        let report = loader(&[("scan.pdf", &["", "\t"])], false).load(dir.path());

        assert_eq!(report.pages.len(), 2);
        assert!(report.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_does_not_stop_discovery() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.pdf"), b"").unwrap();
        fs::write(dir.path().join("open.pdf"), b"").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not restrict root
        let restricted = fs::read_dir(&locked).is_err();
        let report = loader(&[("open.pdf", &["visible"])], true).load(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.files_loaded, 1);
        if restricted {
            assert!(
                report
                    .failures
                    .iter()
                    .any(|e| matches!(e, LoadError::Walk(_)))
            );
        }
    }

    #[test]
    fn test_recursive_flag_controls_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.pdf"), b"").unwrap();
        fs::write(dir.path().join("sub").join("deep.pdf"), b"").unwrap();
        let pages: &[(&str, &[&str])] = &[("top.pdf", &["top"]), ("deep.pdf", &["deep"])];

        assert_eq!(loader(pages, false).load(dir.path()).pages.len(), 1);
        assert_eq!(loader(pages, true).load(dir.path()).pages.len(), 2);
    }

    #[test]
    fn test_exclude_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.pdf"), b"").unwrap();
        fs::write(dir.path().join("draft-skip.pdf"), b"").unwrap();
        let config = DocumentsConfig {
            exclude_patterns: vec!["**/draft-*".to_string()],
            ..Default::default()
        };
        let loader =
            DocumentLoader::with_extractor(&config, Box::new(FakeExtractor(HashMap::new())));

        let found = loader.discover(dir.path()).unwrap();
        assert_eq!(found.files.len(), 1);
        assert!(found.files[0].ends_with("keep.pdf"));
        assert!(found.failures.is_empty());
    }

    #[test]
    fn test_lopdf_extractor_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pdf");
        fs::write(&path, b"definitely not a pdf").unwrap();

        let result = LopdfExtractor.extract_pages(&path);
        assert!(matches!(result, Err(LoadError::Parse { .. })));
    }
}
