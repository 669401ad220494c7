use serde::{Deserialize, Serialize};

use crate::utils::calculate_checksum;

/// Text of one PDF page with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUnit {
    pub text: String,
    pub source_path: String,
    /// 1-based page number within the source file.
    pub page_number: u32,
}

impl PageUnit {
    pub fn new(text: impl Into<String>, source_path: impl Into<String>, page_number: u32) -> Self {
        Self {
            text: text.into(),
            source_path: source_path.into(),
            page_number,
        }
    }
}

/// A window of page text, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// Character offset of the window within its page text.
    pub start_offset: usize,
    pub source_path: String,
    pub page_number: u32,
}

impl Chunk {
    /// Deterministic id: same page, offset and text always map to the same id.
    pub fn generate_id(
        source_path: &str,
        page_number: u32,
        start_offset: usize,
        text: &str,
    ) -> String {
        use uuid::Uuid;
        let name = format!(
            "{}:{}:{}:{}",
            source_path,
            page_number,
            start_offset,
            calculate_checksum(text)
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn from_page(page: &PageUnit, text: String, start_offset: usize) -> Self {
        let id = Self::generate_id(&page.source_path, page.page_number, start_offset, &text);
        Self {
            id,
            text,
            start_offset,
            source_path: page.source_path.clone(),
            page_number: page.page_number,
        }
    }

    /// Human-readable citation, e.g. `manual.pdf p.3 @1600`.
    pub fn citation(&self) -> String {
        let name = std::path::Path::new(&self.source_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.clone());
        format!("{} p.{} @{}", name, self.page_number, self.start_offset)
    }
}

/// An embedding paired with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}
