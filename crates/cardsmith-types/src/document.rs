//! Accepted upload formats.

use serde::{Deserialize, Serialize};

/// MIME type for PDF documents.
pub const PDF_MIME: &str = "application/pdf";

/// MIME type for Office Open XML word-processing documents.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Legacy Word MIME type. Browsers frequently label `.docx` uploads with it.
pub const MSWORD_MIME: &str = "application/msword";

/// Type declared by clients that do not know better.
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or("").trim()
}

/// Binary format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Resolve a format from a MIME type, ignoring parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = essence(mime);
        if essence.eq_ignore_ascii_case(PDF_MIME) {
            Some(Self::Pdf)
        } else if essence.eq_ignore_ascii_case(DOCX_MIME) || essence.eq_ignore_ascii_case(MSWORD_MIME)
        {
            Some(Self::Docx)
        } else {
            None
        }
    }

    /// Resolve a format from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if ext.eq_ignore_ascii_case("docx") {
            Some(Self::Docx)
        } else {
            None
        }
    }

    /// Resolve from the declared content type.
    ///
    /// The file extension is consulted only when no type was declared or the
    /// type is the generic `application/octet-stream`. Any other declared
    /// type decides on its own, so `text/plain` named `x.pdf` is rejected.
    pub fn detect(mime: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        match mime.map(essence).filter(|m| !m.is_empty()) {
            Some(m) if !m.eq_ignore_ascii_case(OCTET_STREAM_MIME) => Self::from_mime(m),
            _ => file_name.and_then(Self::from_file_name),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "PDF"),
            Self::Docx => write!(f, "DOCX"),
        }
    }
}
