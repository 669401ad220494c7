//! Fixed-size character windows with overlap.

use crate::error::ConfigError;
use crate::models::{Chunk, IndexConfig, PageUnit};

/// Splits page text into overlapping windows of at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Requires `0 < overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if overlap == 0 || overlap >= chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk overlap must satisfy 0 < overlap < chunk_size (got {overlap} / {chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every page, preserving page order then window order.
    pub fn split(&self, pages: &[PageUnit]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = pages.iter().flat_map(|page| self.chunk_page(page)).collect();
        tracing::info!(
            pages = pages.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "split pages into chunks"
        );
        chunks
    }

    pub fn chunk_page(&self, page: &PageUnit) -> Vec<Chunk> {
        self.windows(&page.text)
            .into_iter()
            .map(|(start, text)| Chunk::from_page(page, text, start))
            .collect()
    }

    /// `(start_offset, text)` windows over `content`, offsets in characters.
    fn windows(&self, content: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = content.chars().collect();
        let total = chars.len();

        if total == 0 {
            return Vec::new();
        }

        if total <= self.chunk_size {
            return vec![(0, content.to_string())];
        }

        let mut windows = Vec::with_capacity(self.expected_chunks(total));
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            windows.push((start, chars[start..end].iter().collect()));
            if end >= total {
                break;
            }
            start += self.step();
        }

        windows
    }

    /// Number of windows a text of `len` characters produces.
    pub fn expected_chunks(&self, len: usize) -> usize {
        match len {
            0 => 0,
            n if n <= self.chunk_size => 1,
            n => (n - self.overlap).div_ceil(self.step()),
        }
    }
}
