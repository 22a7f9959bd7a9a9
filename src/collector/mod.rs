//! 문서 로더 모듈
//!
//! 데이터 디렉토리를 재귀적으로 스캔하여 마크다운/텍스트 파일을
//! `Document` 목록으로 읽어옵니다.
//! 읽을 수 없는 파일은 경고 후 건너뛰며 전체 로드를 중단하지 않습니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

// ============================================================================
// Document
// ============================================================================

/// 로드된 문서 (파일 1개 = 문서 1개)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// 원본 파일 경로
    pub source_path: PathBuf,
    /// 디코딩된 본문
    pub text: String,
    /// 부가 정보 (source, encoding, extension)
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// 경로 문자열 (표시/저장용)
    pub fn source(&self) -> String {
        self.source_path.display().to_string()
    }
}

// ============================================================================
// Loader Config
// ============================================================================

/// 로더 설정
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// 수집할 확장자 (소문자, 점 제외)
    pub extensions: Vec<String>,
    /// .gitignore / .ignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string(), "txt".to_string()],
            respect_gitignore: false,
            include_hidden: true,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

// ============================================================================
// DocumentLoader
// ============================================================================

/// 문서 로더
pub struct DocumentLoader {
    config: LoaderConfig,
}

impl DocumentLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LoaderConfig::default())
    }

    /// 디렉토리 재귀 로드
    ///
    /// 루트 디렉토리가 없으면 에러, 비어 있으면 빈 목록을 반환합니다.
    /// 결과는 경로 순으로 정렬되어 항상 같은 순서를 가집니다.
    pub fn load(&self, root: &Path) -> Result<Vec<Document>> {
        if !root.exists() {
            anyhow::bail!("Data directory not found: {:?}", root);
        }

        if !root.is_dir() {
            anyhow::bail!("Not a directory: {:?}", root);
        }

        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .ignore(self.config.respect_gitignore)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let mut paths = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if !self.has_supported_extension(entry.path()) {
                continue;
            }

            if self.config.max_file_size > 0 {
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        tracing::warn!("Skipping file without metadata {:?}: {}", entry.path(), e);
                        continue;
                    }
                };
                if size > self.config.max_file_size {
                    tracing::warn!(
                        "Skipping large file {:?} ({} bytes, limit {})",
                        entry.path(),
                        size,
                        self.config.max_file_size
                    );
                    continue;
                }
            }

            paths.push(entry.into_path());
        }

        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read_document(&path) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {:?}: {:#}", path, e);
                }
            }
        }

        tracing::info!("Loaded {} documents from {:?}", documents.len(), root);
        Ok(documents)
    }

    /// 확장자 필터
    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// 단일 파일 읽기 (디코딩 실패는 에러)
    fn read_document(&self, path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path)?;

        let (text, encoding) = decode_text(&bytes)
            .ok_or_else(|| anyhow::anyhow!("Unsupported text encoding"))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), path.display().to_string());
        metadata.insert("encoding".to_string(), encoding.to_string());
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            metadata.insert("extension".to_string(), ext.to_lowercase());
        }

        Ok(Document {
            source_path: path.to_path_buf(),
            text,
            metadata,
        })
    }
}

/// 편의 함수: 기본 설정으로 디렉토리 로드
pub fn load_documents(root: &Path) -> Result<Vec<Document>> {
    DocumentLoader::with_defaults().load(root)
}

// ============================================================================
// Encoding Detection
// ============================================================================

/// 바이트를 텍스트로 디코딩
///
/// BOM으로 UTF-8 / UTF-16 LE / UTF-16 BE를 판별하고,
/// BOM이 없으면 UTF-8로 해석합니다.
fn decode_text(bytes: &[u8]) -> Option<(String, &'static str)> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(rest.to_vec()).ok().map(|s| (s, "utf-8"));
    }

    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes).map(|s| (s, "utf-16le"));
    }

    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes).map(|s| (s, "utf-16be"));
    }

    std::str::from_utf8(bytes)
        .ok()
        .map(|s| (s.to_string(), "utf-8"))
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_empty_directory_yields_no_documents() {
        let dir = TempDir::new().unwrap();
        let docs = load_documents(dir.path()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_documents(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_one_document_per_supported_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "resume.md", b"# Resume\n\nEngineer.");
        write(dir.path(), "notes.txt", b"plain notes");
        write(dir.path(), "nested/deep/projects.MD", b"Projects");
        write(dir.path(), "image.png", &[0x89, 0x50, 0x4E, 0x47]);
        write(dir.path(), "script.py", b"print('hi')");

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 3);

        // 경로 순 정렬
        let mut sorted = docs.clone();
        sorted.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        assert_eq!(docs, sorted);

        let resume = docs
            .iter()
            .find(|d| d.source_path.ends_with("resume.md"))
            .unwrap();
        assert_eq!(resume.text, "# Resume\n\nEngineer.");
        assert_eq!(resume.metadata.get("extension").unwrap(), "md");
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.txt", b"fine");
        write(dir.path(), "bad.txt", &[0xC3, 0x28, 0xA0, 0xA1]);

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].source_path.ends_with("good.txt"));
    }

    #[test]
    fn test_decode_utf8_bom() {
        let (text, enc) = decode_text(&[0xEF, 0xBB, 0xBF, b'h', b'i']).unwrap();
        assert_eq!(text, "hi");
        assert_eq!(enc, "utf-8");
    }

    #[test]
    fn test_decode_utf16_le_and_be() {
        let le = [0xFF, 0xFE, b'o', 0x00, b'k', 0x00];
        assert_eq!(decode_text(&le).unwrap(), ("ok".to_string(), "utf-16le"));

        let be = [0xFE, 0xFF, 0x00, b'o', 0x00, b'k'];
        assert_eq!(decode_text(&be).unwrap(), ("ok".to_string(), "utf-16be"));

        // 홀수 길이
        assert!(decode_text(&[0xFF, 0xFE, b'o']).is_none());
    }

    #[test]
    fn test_hidden_and_ignored_files_are_loaded() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".notes.md", b"dotfile notes");
        write(dir.path(), ".private/bio.txt", b"bio in hidden dir");
        write(dir.path(), "public.md", b"public");
        write(dir.path(), "listed.md", b"listed in .ignore");
        write(dir.path(), ".ignore", b"listed.md\n");
        write(dir.path(), ".gitignore", b"public.md\n");

        let docs = load_documents(dir.path()).unwrap();
        let mut names: Vec<String> = docs
            .iter()
            .map(|d| d.source_path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![".notes.md", "bio.txt", "listed.md", "public.md"]);
    }

    #[test]
    fn test_large_file_skipped_before_reading() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "small.md", b"short");
        write(dir.path(), "big.md", &[b'x'; 64]);

        let loader = DocumentLoader::new(LoaderConfig {
            max_file_size: 16,
            ..LoaderConfig::default()
        });
        let docs = loader.load(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].source_path.ends_with("small.md"));
    }
}
