//! Document format registry.
//!
//! Maps a file extension to the [`DocumentFormat`] the conversion service
//! understands. The registry is an ordinary value: build it once, wrap it in
//! an `Arc`, and hand it to whichever component needs to validate format
//! tags. There is no process-wide table to mutate.

use serde::Serialize;
use std::collections::HashMap;

/// Broad document family, used to pick a service-side filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentFamily {
    Text,
    Spreadsheet,
    Presentation,
    Drawing,
}

/// One format known to the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFormat {
    pub name: String,
    pub family: DocumentFamily,
    pub mime_type: String,
    pub extension: String,
}

impl DocumentFormat {
    pub fn new(
        name: impl Into<String>,
        family: DocumentFamily,
        mime_type: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            family,
            mime_type: mime_type.into(),
            extension: extension.into().to_ascii_lowercase(),
        }
    }
}

/// Immutable extension → format lookup table.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    by_extension: HashMap<String, DocumentFormat>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The formats a stock LibreOffice install converts, including the
    /// Office 2007 XML formats.
    pub fn office_defaults() -> Self {
        use DocumentFamily::*;
        let formats = [
            ("Portable Document Format", Drawing, "application/pdf", "pdf"),
            ("Microsoft Word", Text, "application/msword", "doc"),
            (
                "Microsoft Word 2007 XML",
                Text,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "docx",
            ),
            ("OpenDocument Text", Text, "application/vnd.oasis.opendocument.text", "odt"),
            ("Rich Text Format", Text, "application/rtf", "rtf"),
            ("Plain Text", Text, "text/plain", "txt"),
            ("HTML", Text, "text/html", "html"),
            ("Microsoft Excel", Spreadsheet, "application/vnd.ms-excel", "xls"),
            (
                "Microsoft Excel 2007 XML",
                Spreadsheet,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "xlsx",
            ),
            (
                "OpenDocument Spreadsheet",
                Spreadsheet,
                "application/vnd.oasis.opendocument.spreadsheet",
                "ods",
            ),
            ("CSV", Spreadsheet, "text/csv", "csv"),
            (
                "Microsoft PowerPoint",
                Presentation,
                "application/vnd.ms-powerpoint",
                "ppt",
            ),
            (
                "Microsoft PowerPoint 2007 XML",
                Presentation,
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "pptx",
            ),
            (
                "OpenDocument Presentation",
                Presentation,
                "application/vnd.oasis.opendocument.presentation",
                "odp",
            ),
        ];

        formats
            .into_iter()
            .fold(Self::empty(), |reg, (name, family, mime, ext)| {
                reg.with_format(DocumentFormat::new(name, family, mime, ext))
            })
    }

    /// Return a registry that additionally knows `format`.
    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.by_extension.insert(format.extension.clone(), format);
        self
    }

    /// Look up a format by extension (case-insensitive, leading dot allowed).
    pub fn by_extension(&self, ext: &str) -> Option<&DocumentFormat> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.get(&ext)
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.by_extension(ext).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}
