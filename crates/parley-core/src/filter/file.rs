//! File name classification and upload policy.

use std::fmt;
use url::{form_urlencoded, Url};

/// Maximum accepted upload size (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions of executables and scripts.
pub const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "pif", "vbs", "vbe", "js", "jse", "jar", "msi", "msp",
    "ps1", "psm1", "sh", "app", "dll", "reg", "hta", "cpl", "wsf", "lnk", "apk",
];

/// Extensions accepted for upload.
pub const UPLOAD_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "txt", "csv",
];

/// Why a file name was considered suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileThreat {
    /// The file ends in an executable extension.
    ExecutableExtension,
    /// An executable extension is paired with another one to disguise it.
    DoubleExtension,
}

impl fmt::Display for FileThreat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileThreat::ExecutableExtension => f.write_str("executable file type"),
            FileThreat::DoubleExtension => f.write_str("double extension"),
        }
    }
}

/// Why a file may not be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRejection {
    DisallowedType,
    TooLarge { size: u64, limit: u64 },
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::DisallowedType => f.write_str("file type not allowed"),
            UploadRejection::TooLarge { size, limit } => {
                write!(f, "file too large ({} bytes, limit {})", size, limit)
            }
        }
    }
}

fn is_executable(extension: &str) -> bool {
    let extension = extension.to_ascii_lowercase();
    EXECUTABLE_EXTENSIONS.contains(&extension.as_str())
}

/// Lower-cased extension: the substring after the final dot.
#[must_use]
pub fn extension(filename: &str) -> Option<String> {
    let name = filename.trim().trim_end_matches('.');
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Classify a file name. `None` means it looks harmless.
#[must_use]
pub fn classify_file(filename: &str) -> Option<FileThreat> {
    // Windows drops trailing dots and spaces, so `evil.exe.` runs as `evil.exe`.
    let name = filename.trim().trim_end_matches(&['.', ' '][..]);
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < 2 {
        return None;
    }

    let last = segments[segments.len() - 1];
    let second_last = segments[segments.len() - 2];
    let has_inner_extension = segments.len() >= 3 && !second_last.is_empty();

    if is_executable(last) {
        if has_inner_extension && !is_executable(second_last) {
            return Some(FileThreat::DoubleExtension);
        }
        return Some(FileThreat::ExecutableExtension);
    }

    if has_inner_extension && is_executable(second_last) {
        return Some(FileThreat::DoubleExtension);
    }

    None
}

/// Check a file against the upload allowlist and size ceiling.
///
/// # Errors
///
/// Returns the reason the upload is refused.
pub fn is_safe_for_upload(filename: &str, size_bytes: u64) -> Result<(), UploadRejection> {
    let allowed = extension(filename)
        .map(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);

    if !allowed || classify_file(filename).is_some() {
        return Err(UploadRejection::DisallowedType);
    }

    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge {
            size: size_bytes,
            limit: MAX_UPLOAD_BYTES,
        });
    }

    Ok(())
}

/// File name to screen for an attachment.
///
/// Candidates are the last path segment of the URL and every query value
/// (`download?file=invoice.pdf.exe`). The first suspicious candidate wins;
/// otherwise the last path segment is returned.
#[must_use]
pub fn attachment_file_name(attachment: &str) -> Option<String> {
    let attachment = attachment.trim();

    let (last_segment, query_values): (Option<String>, Vec<String>) = match Url::parse(attachment) {
        Ok(url) => (
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string),
            url.query_pairs().map(|(_, value)| value.into_owned()).collect(),
        ),
        Err(_) => {
            let without_fragment = attachment.split('#').next().unwrap_or_default();
            let (path, query) = without_fragment
                .split_once('?')
                .unwrap_or((without_fragment, ""));
            (
                path.rsplit('/').find(|s| !s.is_empty()).map(str::to_string),
                form_urlencoded::parse(query.as_bytes())
                    .map(|(_, value)| value.into_owned())
                    .collect(),
            )
        }
    };

    let last_segment = last_segment.filter(|name| !name.is_empty());

    let suspicious = last_segment
        .iter()
        .chain(query_values.iter())
        .find(|name| classify_file(name).is_some())
        .cloned();

    suspicious.or(last_segment)
}
