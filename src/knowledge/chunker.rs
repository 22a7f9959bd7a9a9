//! Text Chunking Module
//!
//! 문서를 고정 크기의 겹치는 문자 윈도우로 분할합니다.
//! 각 청크의 시작 위치는 이전 청크보다 정확히 `window - overlap` 문자만큼 앞서며,
//! 마지막 청크만 `window`보다 짧을 수 있습니다.

use anyhow::Result;

use crate::collector::Document;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 윈도우 크기 (문자 수)
    window: usize,
    /// 오버랩 크기 (문자 수, window 미만)
    overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window: 800,
            overlap: 150,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (`0 <= overlap < window`)
    pub fn new(window: usize, overlap: usize) -> Result<Self> {
        if window == 0 {
            anyhow::bail!("Chunk window must be greater than zero");
        }
        if overlap >= window {
            anyhow::bail!(
                "Chunk overlap ({}) must be smaller than window ({})",
                overlap,
                window
            );
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// 연속 청크 간 시작 위치 간격
    pub fn stride(&self) -> usize {
        self.window - self.overlap
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 문서의 한 조각
///
/// 원본 문서를 빌려서 참조합니다 (소유하지 않음).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 원본 문서
    pub document: &'a Document,
    /// 문서 내 청크 순번 (0-based)
    pub index: usize,
    /// 문서 내 시작 위치 (문자 단위)
    pub start_offset: usize,
    /// 이전 청크와 겹치는 문자 수 (첫 청크는 0)
    pub overlap_with_previous: usize,
    /// 청크 텍스트
    pub text: String,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 문서 하나를 청크로 분할
    fn chunk<'a>(&self, document: &'a Document) -> Vec<Chunk<'a>>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 여러 문서를 순서대로 분할 (문서 경계를 넘지 않음)
    fn chunk_all<'a>(&self, documents: &'a [Document]) -> Vec<Chunk<'a>> {
        documents.iter().flat_map(|doc| self.chunk(doc)).collect()
    }
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 고정 윈도우 청커
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }
}

impl Chunker for WindowChunker {
    fn chunk<'a>(&self, document: &'a Document) -> Vec<Chunk<'a>> {
        let text = document.text.as_str();
        if text.trim().is_empty() {
            return vec![];
        }

        // 문자 인덱스 -> 바이트 오프셋 (끝 위치 포함)
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let window = self.config.window;
        let stride = self.config.stride();

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut prev_end: usize = 0;

        loop {
            let end = (start + window).min(char_len);

            chunks.push(Chunk {
                document,
                index: chunks.len(),
                start_offset: start,
                overlap_with_previous: if chunks.is_empty() {
                    0
                } else {
                    prev_end.saturating_sub(start)
                },
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });

            if end >= char_len {
                break;
            }

            prev_end = end;
            start += stride;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn doc(text: &str) -> Document {
        Document {
            source_path: PathBuf::from("about.md"),
            text: text.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn chunker(window: usize, overlap: usize) -> WindowChunker {
        WindowChunker::new(ChunkConfig::new(window, overlap).unwrap())
    }

    /// 오버랩을 제외하고 이어 붙이면 원문이 되어야 함
    fn reconstruct(chunks: &[Chunk<'_>]) -> String {
        chunks
            .iter()
            .map(|c| c.text.chars().skip(c.overlap_with_previous).collect::<String>())
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(10, 10).is_err());
        assert!(ChunkConfig::new(10, 11).is_err());
        assert_eq!(ChunkConfig::new(10, 3).unwrap().stride(), 7);

        let default = ChunkConfig::default();
        assert_eq!(default.window(), 800);
        assert_eq!(default.overlap(), 150);
    }

    #[test]
    fn test_empty_and_blank_documents() {
        let c = chunker(10, 2);
        assert!(c.chunk(&doc("")).is_empty());
        assert!(c.chunk(&doc("   \n\t")).is_empty());
    }

    #[test]
    fn test_short_document_single_chunk() {
        let d = doc("hello");
        let chunks = chunker(10, 2).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].overlap_with_previous, 0);
    }

    #[test]
    fn test_windows_advance_by_stride() {
        let d = doc("abcdefghijklmnopqrstuvwxyz");
        let chunks = chunker(10, 3).chunk(&d);

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);

        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_offset, pair[0].start_offset + 7);
            assert_eq!(pair[1].overlap_with_previous, 3);
        }

        // 마지막 청크만 짧음
        let last = chunks.last().unwrap();
        assert!(last.text.chars().count() < 10);
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.text.chars().count(), 10);
        }

        assert_eq!(reconstruct(&chunks), d.text);
    }

    #[test]
    fn test_exact_fit_has_no_trailing_chunk() {
        let d = doc("abcdefghij");
        let chunks = chunker(10, 3).chunk(&d);
        assert_eq!(chunks.len(), 1);

        let d = doc("abcdefghijklmnopq"); // 17 = 10 + 7
        let chunks = chunker(10, 3).chunk(&d);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(reconstruct(&chunks), d.text);
    }

    #[test]
    fn test_zero_overlap() {
        let d = doc("aaaabbbbcc");
        let chunks = chunker(4, 0).chunk(&d);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa", "bbbb", "cc"]);
        assert!(chunks.iter().all(|c| c.overlap_with_previous == 0));
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let d = doc("안녕하세요 세계, héllo wörld");
        let chunks = chunker(6, 2).chunk(&d);
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.text.chars().count(), 6);
        }
        assert_eq!(reconstruct(&chunks), d.text);
    }

    #[test]
    fn test_deterministic() {
        let d = doc(&"Pablo builds agentic payment flows. ".repeat(50));
        let c = chunker(100, 20);
        assert_eq!(c.chunk(&d), c.chunk(&d));
    }

    #[test]
    fn test_chunk_all_keeps_document_boundaries() {
        let docs = vec![doc("0123456789ab"), doc("xyz")];
        let c = chunker(5, 1);
        let chunks = c.chunk_all(&docs);

        let first_doc: Vec<_> = chunks
            .iter()
            .filter(|ch| std::ptr::eq(ch.document, &docs[0]))
            .collect();
        let second_doc: Vec<_> = chunks
            .iter()
            .filter(|ch| std::ptr::eq(ch.document, &docs[1]))
            .collect();

        assert_eq!(first_doc.len() + second_doc.len(), chunks.len());
        assert_eq!(second_doc.len(), 1);
        assert_eq!(second_doc[0].text, "xyz");
        assert_eq!(second_doc[0].index, 0);
        assert_eq!(second_doc[0].start_offset, 0);
    }
}
