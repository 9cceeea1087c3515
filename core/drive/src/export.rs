//! Mapping from a file's MIME type to a retrieval plan.
//!
//! Plain and structured text is downloaded byte-for-byte. Native Google
//! documents cannot be downloaded directly and are converted server-side
//! into a text representation. Everything else is reported as unsupported.

/// MIME type of native Google Docs.
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
/// MIME type of native Google Sheets.
pub const GOOGLE_SHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
/// MIME type of folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// How the bytes of a file are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Byte-identical download of the stored content.
    Raw,
    /// Server-side conversion into `target_mime`.
    Export { target_mime: &'static str },
}

/// Textual form of the retrieved bytes, also used when presenting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// UTF-8 text as stored in an ordinary file.
    Text,
    /// Plain text exported from a Google Doc.
    PlainText,
    /// Comma-separated values exported from a Google Sheet.
    Csv,
}

/// Retrieval plan for one file kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPlan {
    pub mode: RetrievalMode,
    pub representation: Representation,
}

/// Outcome of resolving a MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The content can be retrieved as text.
    Supported(ExportPlan),
    /// No text representation exists for this kind. Not an error.
    Unsupported { mime_type: String },
}

impl Resolution {
    /// The plan, if supported.
    pub fn plan(&self) -> Option<&ExportPlan> {
        match self {
            Resolution::Supported(plan) => Some(plan),
            Resolution::Unsupported { .. } => None,
        }
    }
}

const RAW_TEXT: ExportPlan = ExportPlan {
    mode: RetrievalMode::Raw,
    representation: Representation::Text,
};

/// Native kinds with a server-side text conversion.
const EXPORT_TABLE: &[(&str, ExportPlan)] = &[
    (
        GOOGLE_DOC_MIME,
        ExportPlan {
            mode: RetrievalMode::Export {
                target_mime: "text/plain",
            },
            representation: Representation::PlainText,
                },
    ),
    (
        GOOGLE_SHEET_MIME,
        ExportPlan {
            mode: RetrievalMode::Export {
                target_mime: "text/csv",
            },
            representation: Representation::Csv,
                },
    ),
];

/// Stateless MIME type to plan resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportFormatResolver;

impl ExportFormatResolver {
    /// Decide how to retrieve content of the given MIME type.
    pub fn resolve(mime_type: &str) -> Resolution {
        if mime_type.starts_with("text/") || mime_type == "application/json" {
            return Resolution::Supported(RAW_TEXT);
        }

        EXPORT_TABLE
            .iter()
            .find(|(mime, _)| *mime == mime_type)
            .map(|(_, plan)| Resolution::Supported(*plan))
            .unwrap_or_else(|| Resolution::Unsupported {
                mime_type: mime_type.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_text_kinds_are_raw() {
        for mime in ["text/plain", "text/markdown", "text/csv", "application/json"] {
            let resolution = ExportFormatResolver::resolve(mime);
            assert_eq!(resolution, Resolution::Supported(RAW_TEXT), "{}", mime);
        }
    }

    #[test]
    fn test_google_doc_exports_plain_text() {
        let plan = *ExportFormatResolver::resolve(GOOGLE_DOC_MIME).plan().unwrap();
        assert_eq!(
            plan.mode,
            RetrievalMode::Export {
                target_mime: "text/plain"
            }
        );
        assert_eq!(plan.representation, Representation::PlainText);
    }

    #[test]
    fn test_spreadsheet_exports_csv() {
        let plan = *ExportFormatResolver::resolve(GOOGLE_SHEET_MIME).plan().unwrap();
        assert_eq!(
            plan.mode,
            RetrievalMode::Export {
                target_mime: "text/csv"
            }
        );
        assert_eq!(plan.representation, Representation::Csv);
    }

    #[test]
    fn test_binary_kinds_are_unsupported() {
        for mime in ["application/pdf", "image/png", FOLDER_MIME, ""] {
            assert_eq!(
                ExportFormatResolver::resolve(mime),
                Resolution::Unsupported {
                    mime_type: mime.to_string()
                }
            );
        }
    }

    #[test]
    fn test_prefix_match_is_case_sensitive() {
        assert!(ExportFormatResolver::resolve("Text/plain").plan().is_none());
    }

    proptest! {
        #[test]
        fn prop_resolution_is_deterministic(mime in ".{0,64}") {
            prop_assert_eq!(
                ExportFormatResolver::resolve(&mime),
                ExportFormatResolver::resolve(&mime)
            );
        }

        #[test]
        fn prop_text_prefix_is_always_raw(subtype in "[a-z0-9.+-]{1,32}") {
            let mime = format!("text/{}", subtype);
            prop_assert_eq!(ExportFormatResolver::resolve(&mime), Resolution::Supported(RAW_TEXT));
        }

        #[test]
        fn prop_unsupported_echoes_mime(mime in "(application|image|video)/[a-z]{1,16}") {
            prop_assume!(mime != "application/json");
            match ExportFormatResolver::resolve(&mime) {
                Resolution::Unsupported { mime_type } => prop_assert_eq!(mime_type, mime),
                Resolution::Supported(_) => prop_assert!(false, "unexpected plan for {}", mime),
            }
        }
    }
}
