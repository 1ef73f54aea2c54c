use std::path::Path;

/// Extensions the general-purpose guess gets wrong for document uploads
/// (`.ts` would otherwise be an MPEG transport stream).
pub const CONTENT_TYPE_OVERRIDES: &[(&str, &str)] = &[
    ("ts", "text/typescript"),
    ("py", "text/x-python"),
    ("mdx", "text/mdx"),
];

/// Content type sent with an upload of `path`.
pub fn detect_content_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(ext) = extension.as_deref() {
        if let Some((_, corrected)) = CONTENT_TYPE_OVERRIDES.iter().find(|(e, _)| *e == ext) {
            return (*corrected).to_string();
        }
    }

    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
