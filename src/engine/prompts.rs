//! Reply texts and interactive prompts

use serde_json::Value;

use super::event::ReplyId;
use super::retriever::{DocumentPage, PAGE_SIZE};
use crate::channels::{Button, ListPrompt, ListRow, ListSection};
use crate::db::{DocumentRecord, Folder};
use crate::session::MediaKind;

pub const MAIN_MENU: &str = "What would you like to do?";
pub const FOLDER_CHOICE: &str = "In which folder would you like to save your document?";
pub const UPLOAD_PROMPT: &str = "Upload your Document.\n\n⚠️ Important: Select and send only ONE file.";
pub const SEARCH_PROMPT: &str = "🔎 Please tell me the name of the document you want.";
pub const UPLOAD_IN_PROGRESS: &str = "⏳ Please complete your current upload first. Send the name/details for your previous file before uploading a new one.";
pub const NO_SAVED_FOLDERS_EXPLORE: &str =
    "You don't have any saved folders yet. Upload a document to create one.";
pub const CHOOSE_FOLDER_OPTION: &str = "Please choose one of the folder options above.";
pub const USER_NOT_FOUND: &str = "❌ User not found. Please reconnect your account.";
pub const DOCUMENT_NOT_FOUND: &str = "Document not found.";
pub const SEARCH_FAILED: &str = "❌ Error searching for document. Please try again.";
pub const NOTHING_PENDING: &str =
    "No document is waiting to be saved. Please upload a document first.";
pub const NO_SAVED_FOLDERS_UPLOAD: &str = "You do not have any saved folders yet. Please choose the default folder or create a new folder.";
pub const NEW_FOLDER_NAME_PROMPT: &str = "Give the name for new Google Drive folder.";
pub const DEFAULT_FOLDER_FAILED: &str =
    "❌ Unable to use the default folder right now. Please choose another option.";
pub const FOLDER_PICK_NOT_FOUND: &str = "Folder not found. Please choose again.";
pub const FOLDER_PICK_FAILED: &str = "❌ Unable to use that folder. Please choose another option.";
pub const FOLDER_NAME_FAILED: &str = "❌ Unable to use that folder. Please try again.";
pub const FOLDER_INDEX_PROMPT: &str =
    "Please reply with the number or name of the folder you want to use.";
pub const FOLDER_NAME_NOT_FOUND: &str =
    "❌ Folder not found. Please reply with a number from the list or try again.";
pub const FOLDER_NAME_REQUIRED: &str = "Please provide a folder name.";
pub const FOLDER_CREATE_FAILED: &str =
    "❌ Unable to create that folder. Please choose another option.";
pub const NOTHING_TO_SAVE: &str =
    "No document is waiting to be saved. Please upload a new document.";
pub const FOLDER_REQUIRED: &str = "Please choose a folder before we can save your document.";
pub const SAVE_FAILED: &str = "❌ Error saving document. Please try uploading again.";
pub const EXPLORE_DOCUMENT_NOT_FOUND: &str =
    "Document not found. Send \"Explore\" to view your folders again.";
pub const SESSION_EXPIRED: &str = "Session expired. Send \"Explore\" to view your folders again.";
pub const INVALID_NAVIGATION: &str =
    "Invalid navigation. Send \"Explore\" to view your folders again.";
pub const EXPLORE_FOLDER_NOT_FOUND: &str =
    "Folder not found. Please tap Explore again to reload your folders.";

const SAVED_FOLDER_BODY: &str = "Select a folder to continue.";
const SAVED_FOLDER_BUTTON: &str = "Select Folder";
const DOCUMENT_LIST_BODY: &str = "Select a document to view its metadata and Drive link.";
const DOCUMENT_LIST_BUTTON: &str = "View documents";
const MAX_ROW_TITLE: usize = 24;
const MAX_HEADER: usize = 60;

/// Acknowledgement for received media
#[must_use]
pub const fn media_received(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => {
            "✅ We have received your image!\n\nNow please send the metaData (name/details) of the document."
        }
        MediaKind::Document => {
            "✅ We have received your document!\n\nNow please send the name/details of the document."
        }
    }
}

/// "Upload" / "Get" / "Explore"
#[must_use]
pub fn main_menu_buttons() -> Vec<Button> {
    vec![
        Button::new(ReplyId::UploadDocument.to_string(), "Upload document"),
        Button::new(ReplyId::GetDocuments.to_string(), "Get document"),
        Button::new(ReplyId::ExploreFolders.to_string(), "Explore"),
    ]
}

/// "Default" / "Existing" / "New"
#[must_use]
pub fn folder_choice_buttons() -> Vec<Button> {
    vec![
        Button::new(ReplyId::FolderDefault.to_string(), "WhatsAppBotUpload"),
        Button::new(ReplyId::FolderExisting.to_string(), "My Existing Folder"),
        Button::new(ReplyId::FolderNew.to_string(), "Create New Folder"),
    ]
}

/// Confirmation after a folder was attached to an upload
#[must_use]
pub fn folder_selected(name: &str, suffix: Option<&str>) -> String {
    suffix.map_or_else(
        || format!("✅ Folder selected: {name}"),
        |s| format!("✅ Folder selected: {name} ({s})"),
    )
}

#[must_use]
pub fn document_saved(view_link: &str) -> String {
    format!("✅ Document saved successfully!\n\n📁 Google Drive: {view_link}")
}

#[must_use]
pub fn empty_folder(name: &str) -> String {
    format!("📁 Folder: {name}\n\nNo documents have been saved in this folder yet.")
}

/// List of saved folders, ten per section
#[must_use]
pub fn saved_folder_list(folders: &[Folder]) -> ListPrompt {
    let sections = folders
        .chunks(PAGE_SIZE)
        .enumerate()
        .map(|(chunk, group)| {
            let start = chunk * PAGE_SIZE;
            ListSection {
                title: format!("Folders {}-{}", start + 1, start + group.len()),
                rows: group
                    .iter()
                    .enumerate()
                    .map(|(i, folder)| {
                        let title = if folder.name.is_empty() {
                            format!("Folder {}", start + i + 1)
                        } else {
                            truncate(&folder.name, MAX_ROW_TITLE)
                        };
                        ListRow::new(ReplyId::SavedFolder(folder.id.clone()).to_string(), title)
                    })
                    .collect(),
            }
        })
        .collect();

    ListPrompt {
        header: None,
        body: SAVED_FOLDER_BODY.to_string(),
        button: SAVED_FOLDER_BUTTON.to_string(),
        sections,
    }
}

/// One page of a folder's documents with back/next controls
#[must_use]
pub fn document_list(folder_name: &str, page: &DocumentPage<'_>) -> ListPrompt {
    let mut rows = Vec::with_capacity(page.documents.len() + 2);

    if page.has_previous() {
        rows.push(ListRow::new(
            ReplyId::PreviousPage(Some(page.page - 1)).to_string(),
            "◀ Back",
        ));
    }

    rows.extend(page.documents.iter().enumerate().map(|(i, doc)| {
        ListRow::new(
            ReplyId::DocumentMeta(doc.id.clone()).to_string(),
            document_row_title(doc, page.offset + i + 1),
        )
    }));

    if page.has_next() {
        rows.push(ListRow::new(
            ReplyId::NextPage(Some(page.page + 1)).to_string(),
            "▶ Next",
        ));
    }

    ListPrompt {
        header: Some(truncate(folder_name, MAX_HEADER)),
        body: DOCUMENT_LIST_BODY.to_string(),
        button: DOCUMENT_LIST_BUTTON.to_string(),
        sections: vec![ListSection {
            title: format!("Page {}/{}", page.page + 1, page.total_pages),
            rows,
        }],
    }
}

/// Reply for a document found by search
#[must_use]
pub fn search_result(doc: &DocumentRecord) -> String {
    let folder = doc.folder().map(|f| f.name);
    describe(
        &format!("📁 Folder : {}", folder.as_deref().unwrap_or("Selected folder")),
        doc.raw_text().filter(|t| !t.is_empty()),
        doc.drive_link().as_deref(),
    )
}

/// Reply for a document picked while browsing a folder
#[must_use]
pub fn document_detail(folder_name: &str, doc: &DocumentRecord) -> String {
    let details = document_text(doc).unwrap_or(doc.file_name.as_str());
    describe(
        &format!("📁Folder : {folder_name}"),
        Some(details).filter(|d| !d.is_empty()),
        doc.drive_link().as_deref(),
    )
}

fn describe(folder_line: &str, details: Option<&str>, link: Option<&str>) -> String {
    let mut lines = vec![folder_line.to_string()];
    if let Some(details) = details {
        lines.push(format!("\n📝 Details : {details}"));
    }
    lines.push(link.map_or_else(
        || "\n🔗 Document link not available.".to_string(),
        |l| format!("\n🔗 Document link : {l}"),
    ));
    lines.join("\n")
}

/// Most descriptive text stored for a document
fn document_text(doc: &DocumentRecord) -> Option<&str> {
    ["rawText", "description", "title"]
        .into_iter()
        .find_map(|key| doc.metadata.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

fn document_row_title(doc: &DocumentRecord, position: usize) -> String {
    let title = document_text(doc)
        .map(ToString::to_string)
        .or_else(|| Some(doc.file_name.clone()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| format!("Document {position}"));

    if title.chars().count() > MAX_ROW_TITLE {
        format!("{}...", truncate(&title, MAX_ROW_TITLE - 3))
    } else {
        title
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::engine::retriever::paginate;

    fn doc(id: &str, metadata: serde_json::Value) -> DocumentRecord {
        let Value::Object(metadata) = metadata else {
            panic!("object expected");
        };
        DocumentRecord {
            id: id.to_string(),
            phone_number: "1555".to_string(),
            user_id: "u".to_string(),
            file_name: format!("{id}.pdf"),
            mime_type: "application/pdf".to_string(),
            metadata,
            google_drive_link: None,
            google_drive_id: Some(format!("g-{id}")),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_document_list_rows_per_page() {
        let docs: Vec<_> = (0..23).map(|i| doc(&format!("d{i}"), json!({}))).collect();

        let first = document_list("Taxes", &paginate(&docs, 0).unwrap());
        let rows = &first.sections[0].rows;
        assert_eq!(first.sections[0].title, "Page 1/3");
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[8].id, "doc_nav_next_1");

        let middle = document_list("Taxes", &paginate(&docs, 1).unwrap());
        let rows = &middle.sections[0].rows;
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].id, "doc_nav_back_0");
        assert_eq!(rows[1].id, "document_meta_d8");
        assert_eq!(rows[9].id, "doc_nav_next_2");

        let last = document_list("Taxes", &paginate(&docs, 2).unwrap());
        let rows = &last.sections[0].rows;
        assert_eq!(last.sections[0].title, "Page 3/3");
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].id, "doc_nav_back_1");
        assert_eq!(rows.iter().filter(|r| r.id.starts_with("document_meta_")).count(), 7);
    }

    #[test]
    fn test_row_titles() {
        let long = doc("a", json!({"rawText": "A very long description of a scanned receipt"}));
        assert_eq!(document_row_title(&long, 1), "A very long descripti...");
        assert_eq!(document_row_title(&long, 1).chars().count(), 24);

        let titled = doc("b", json!({"title": "Lease"}));
        assert_eq!(document_row_title(&titled, 2), "Lease");

        let mut bare = doc("c", json!({}));
        assert_eq!(document_row_title(&bare, 3), "c.pdf");
        bare.file_name.clear();
        assert_eq!(document_row_title(&bare, 3), "Document 3");
    }

    #[test]
    fn test_saved_folder_sections() {
        let folders: Vec<_> = (1..=12)
            .map(|i| Folder::new(format!("f{i}"), format!("Folder name number {i} is long")))
            .collect();
        let list = saved_folder_list(&folders);
        assert_eq!(list.sections.len(), 2);
        assert_eq!(list.sections[0].title, "Folders 1-10");
        assert_eq!(list.sections[1].title, "Folders 11-12");
        assert_eq!(list.sections[0].rows[0].id, "folder_saved_f1");
        assert_eq!(list.sections[0].rows[0].title.chars().count(), 24);
    }

    #[test]
    fn test_detail_and_search_replies() {
        let d = doc("a", json!({"rawText": "passport scan", "folder": {"id": "f1", "name": "IDs"}}));
        assert_eq!(
            search_result(&d),
            "📁 Folder : IDs\n\n📝 Details : passport scan\n\n🔗 Document link : https://drive.google.com/file/d/g-a/view"
        );
        assert!(document_detail("IDs", &d).starts_with("📁Folder : IDs"));

        let mut bare = doc("b", json!({}));
        bare.google_drive_id = None;
        assert_eq!(
            search_result(&bare),
            "📁 Folder : Selected folder\n\n🔗 Document link not available."
        );
        assert_eq!(
            document_detail("X", &bare),
            "📁Folder : X\n\n📝 Details : b.pdf\n\n🔗 Document link not available."
        );
    }

    #[test]
    fn test_folder_selected_text() {
        assert_eq!(
            folder_selected("WhatsAppBotUpload", Some("default folder")),
            "✅ Folder selected: WhatsAppBotUpload (default folder)"
        );
        assert_eq!(folder_selected("Taxes", None), "✅ Folder selected: Taxes");
        assert_eq!(folder_selected("Taxes", Some("new")), "✅ Folder selected: Taxes (new)");
    }
}
