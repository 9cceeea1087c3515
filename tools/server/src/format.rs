//! Text rendering of tool results.

use chrono::{DateTime, SecondsFormat, Utc};

use drivemcp_common::FileId;
use drivemcp_drive::{DriveFile, Representation, FOLDER_MIME};

/// Results returned when the caller does not ask for a count.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Largest page the Drive API serves.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Display name used for the top-level folder.
pub const ROOT_DISPLAY_NAME: &str = "Root";

/// Page size for a requested result count.
pub fn page_size(max_results: Option<u32>) -> u32 {
    max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_PAGE_SIZE)
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn quote_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive query matching names or full text.
pub fn search_query(text: &str) -> String {
    let text = quote_literal(text);
    format!("name contains '{}' or fullText contains '{}'", text, text)
}

/// Drive query for the folders directly under `parent`.
pub fn folders_query(parent: &FileId) -> String {
    format!(
        "'{}' in parents and mimeType = '{}'",
        quote_literal(parent.as_str()),
        FOLDER_MIME
    )
}

/// Timestamps as the Drive API reports them, e.g. `2024-03-01T10:15:00.000Z`.
pub fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn size_kb(file: &DriveFile) -> Option<u64> {
    file.size_bytes().map(|bytes| bytes / 1024)
}

/// Which attributes a listing entry shows.
#[derive(Debug, Clone, Copy)]
struct EntryFields {
    mime_type: bool,
    size: bool,
}

fn entry(file: &DriveFile, fields: EntryFields) -> String {
    let mut out = format!("• {} (ID: {})\n", file.name, file.id);
    if fields.mime_type {
        out.push_str(&format!("  - Type: {}\n", file.mime_type));
    }
    if let Some(created) = &file.created_time {
        out.push_str(&format!("  - Created: {}\n", timestamp(created)));
    }
    if let Some(modified) = &file.modified_time {
        out.push_str(&format!("  - Modified: {}\n", timestamp(modified)));
    }
    if fields.size {
        if let Some(kb) = size_kb(file) {
            out.push_str(&format!("  - Size: {} KB\n", kb));
        }
    }
    out
}

fn entries(files: &[DriveFile], fields: EntryFields) -> String {
    files
        .iter()
        .map(|file| entry(file, fields))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of `list_files`.
pub fn file_list(files: &[DriveFile]) -> String {
    if files.is_empty() {
        return "No files found.".to_string();
    }
    let body = entries(
        files,
        EntryFields {
            mime_type: true,
            size: true,
        },
    );
    format!("Files found ({}):\n\n{}", files.len(), body)
}

/// Result of `search_files`.
pub fn search_results(query: &str, files: &[DriveFile]) -> String {
    if files.is_empty() {
        return format!("No files found matching '{}'.", query);
    }
    let body = entries(
        files,
        EntryFields {
            mime_type: true,
            size: false,
        },
    );
    format!("Search results for '{}' ({}):\n\n{}", query, files.len(), body)
}

/// Result of `list_folders`.
pub fn folder_list(parent_name: &str, folders: &[DriveFile]) -> String {
    if folders.is_empty() {
        return format!("No folders found in '{}'.", parent_name);
    }
    let body = entries(
        folders,
        EntryFields {
            mime_type: false,
            size: false,
        },
    );
    format!("Folders in '{}' ({}):\n\n{}", parent_name, folders.len(), body)
}

/// Result of `get_file_content` for a supported file.
pub fn content(name: &str, representation: Representation, text: &str) -> String {
    let heading = match representation {
        Representation::Text => format!("Content of '{}':", name),
        Representation::PlainText => format!("Content of Google Doc '{}':", name),
        Representation::Csv => format!("Content of Google Sheet '{}' (CSV format):", name),
    };
    format!("{}\n\n{}", heading, text)
}

/// Result of `get_file_content` for a file with no text form.
pub fn unsupported(mime_type: &str) -> String {
    format!(
        "Cannot display content for file type: {}. This file type is not supported for text preview.",
        mime_type
    )
}

/// Result of `get_file_metadata`.
pub fn metadata(file: &DriveFile) -> String {
    let mut lines = vec![
        format!("File: {}", file.name),
        format!("ID: {}", file.id),
        format!("Type: {}", file.mime_type),
    ];

    if let Some(created) = &file.created_time {
        lines.push(format!("Created: {}", timestamp(created)));
    }
    if let Some(modified) = &file.modified_time {
        lines.push(format!("Modified: {}", timestamp(modified)));
    }
    if let Some(kb) = size_kb(file) {
        lines.push(format!("Size: {} KB", kb));
    }
    if let Some(description) = file.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {}", description));
    }
    if let Some(link) = &file.web_view_link {
        lines.push(format!("Web View: {}", link));
    }
    if let Some(owners) = &file.owners {
        let names = owners
            .iter()
            .map(|owner| owner.display_name.as_deref().unwrap_or("Unknown"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Owners: {}", names));
    }

    lines.join("\n")
}
