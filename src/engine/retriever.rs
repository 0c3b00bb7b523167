//! Document search and folder browsing

use crate::Result;
use crate::db::{DocumentRecord, DocumentRepo, backfill_folder};

/// Rows a list message can carry
pub const PAGE_SIZE: usize = 10;

/// Documents filed under one folder
#[derive(Debug, Clone)]
pub struct FolderListing {
    /// Newest first
    pub documents: Vec<DocumentRecord>,
    /// Count from a separate query; may differ from `documents.len()`
    pub total_count: usize,
}

/// One page of a folder listing
#[derive(Debug, Clone, Copy)]
pub struct DocumentPage<'a> {
    /// Zero-based page index
    pub page: usize,
    pub total_pages: usize,
    pub documents: &'a [DocumentRecord],
    /// Position of the first document on this page in the full listing
    pub offset: usize,
}

impl DocumentPage<'_> {
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 0
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }
}

/// Search and listing over a user's documents
#[derive(Clone)]
pub struct DocumentRetriever {
    documents: DocumentRepo,
}

impl DocumentRetriever {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(documents: DocumentRepo) -> Self {
        Self { documents }
    }

    /// First document whose raw text contains `query`, ignoring case
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn search(&self, phone: &str, query: &str) -> Result<Option<DocumentRecord>> {
        let found = self.documents.find_by_raw_text(phone, query)?;
        tracing::debug!(phone, query, found = found.is_some(), "document search");
        Ok(found)
    }

    /// Documents filed under `folder_id`, newest first, with legacy folder
    /// references backfilled into the nested shape
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn list_by_folder(&self, phone: &str, folder_id: &str) -> Result<FolderListing> {
        let mut documents = self.documents.list_by_folder(phone, folder_id)?;
        let total_count = self.documents.count_by_folder(phone, folder_id)?;

        if total_count != documents.len() {
            tracing::warn!(
                phone,
                folder_id,
                listed = documents.len(),
                total_count,
                "folder document count disagrees with listing"
            );
        }

        for doc in &mut documents {
            backfill_folder(&mut doc.metadata);
        }

        Ok(FolderListing {
            documents,
            total_count,
        })
    }
}

/// Documents per page for a listing of `len` documents
///
/// A listing that fits in one list message is shown whole. Longer listings
/// keep two rows free on every page for the back and next controls.
const fn documents_per_page(len: usize) -> usize {
    if len <= PAGE_SIZE { PAGE_SIZE } else { PAGE_SIZE - 2 }
}

/// Slice out page `page` (clamped to the last page); `None` when empty
#[must_use]
pub fn paginate(documents: &[DocumentRecord], page: usize) -> Option<DocumentPage<'_>> {
    if documents.is_empty() {
        return None;
    }

    let per_page = documents_per_page(documents.len());
    let total_pages = documents.len().div_ceil(per_page);
    let page = page.min(total_pages - 1);
    let offset = page * per_page;
    let end = (offset + per_page).min(documents.len());

    Some(DocumentPage {
        page,
        total_pages,
        documents: &documents[offset..end],
        offset,
    })
}
