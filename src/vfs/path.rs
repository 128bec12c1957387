//! URI ↔ object key mapping.
//!
//! A URI is `scheme://target`. The target, with leading and trailing
//! slashes (and backslashes) removed, is the object key. Everything here is
//! pure and deterministic.

/// Path prefix under which generated image derivatives live.
pub const STYLES_DIR: &str = "styles";

/// Request path the derivative generator is mounted at.
pub const STYLE_PATH_PREFIX: &str = "/gs/files/styles/";

/// Schemes a derivative request may name.
pub const STYLE_SCHEMES: [&str; 2] = ["public", "gs"];

const SCHEME_SEP: &str = "://";

/// Splits `scheme://target`. A string without `://` has no scheme.
pub fn split_uri(uri: &str) -> (Option<&str>, &str) {
    match uri.split_once(SCHEME_SEP) {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, uri),
    }
}

fn trim_slashes(s: &str) -> &str {
    s.trim_matches(|c| c == '/' || c == '\\')
}

/// Target with surrounding slashes removed and any repeated `scheme://`
/// prefix dropped.
pub fn target(uri: &str) -> String {
    let (scheme, mut rest) = split_uri(uri);
    if let Some(scheme) = scheme {
        let dup = format!("{scheme}{SCHEME_SEP}");
        while let Some(stripped) = rest.strip_prefix(dup.as_str()) {
            rest = stripped;
        }
    }
    trim_slashes(rest).to_string()
}

/// Canonical form used as the metadata cache key.
pub fn normalize_uri(uri: &str) -> String {
    match split_uri(uri) {
        (Some(scheme), _) => format!("{scheme}{SCHEME_SEP}{}", target(uri)),
        (None, rest) => trim_slashes(rest).to_string(),
    }
}

/// Object key for `uri`.
///
/// With `apply_naming` set, a `styles/<style>/<scheme>/...` path has `+`
/// replaced by `-` in its scheme segment so it matches the bucket-derived
/// directory name.
pub fn to_object_key(uri: &str, apply_naming: bool) -> String {
    let key = target(uri);
    if !apply_naming {
        return key;
    }
    let mut segments: Vec<String> = key.split('/').map(str::to_string).collect();
    if segments.len() < 3 || segments[0] != STYLES_DIR {
        return key;
    }
    segments[2] = segments[2].replace('+', "-");
    segments.join("/")
}

/// Parent of `uri`. A top-level entry's parent is the scheme root
/// (`scheme://`), never `.`.
pub fn dirname(uri: &str) -> String {
    let key = to_object_key(uri, true);
    let parent = key.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
    match split_uri(uri).0 {
        Some(scheme) => format!("{scheme}{SCHEME_SEP}{parent}"),
        None => parent.to_string(),
    }
}

pub fn basename(uri: &str) -> String {
    let key = target(uri);
    key.rsplit('/').next().unwrap_or("").to_string()
}

/// Extension of the final path segment, if it has one.
pub fn extension(uri: &str) -> Option<String> {
    let name = basename(uri);
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() || !ext.is_empty()).then(|| ext.to_string())
}

/// Heuristic: a path whose final segment has no extension is treated as a
/// directory.
///
/// A file without an extension is indistinguishable from a directory here.
/// Use a listing or an exact-key lookup when certainty matters. The scheme
/// root is always a directory.
pub fn is_directory_like(uri: &str) -> bool {
    target(uri).is_empty() || extension(uri).is_none()
}

/// A parsed request for an image derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRequest {
    pub style: String,
    pub scheme: String,
    /// Source file target, relative to the scheme root.
    pub file: String,
}

impl StyleRequest {
    pub fn source_uri(&self) -> String {
        format!("{}{SCHEME_SEP}{}", self.scheme, self.file)
    }

    pub fn derivative_uri(&self) -> String {
        derivative_uri(&self.style, &self.source_uri())
    }
}

/// Parses `/gs/files/styles/<style>/<scheme>/<file...>`.
pub fn parse_style_request(path: &str) -> Option<StyleRequest> {
    let rest = path.strip_prefix(STYLE_PATH_PREFIX)?;
    let mut parts = rest.splitn(3, '/');
    let style = parts.next().filter(|s| !s.is_empty())?;
    let scheme = parts.next().filter(|s| STYLE_SCHEMES.contains(s))?;
    let file = trim_slashes(parts.next()?);
    if file.is_empty() {
        return None;
    }
    Some(StyleRequest {
        style: style.to_string(),
        scheme: scheme.to_string(),
        file: file.to_string(),
    })
}

/// `scheme://styles/<style>/<scheme>/<target>` for `source`.
pub fn derivative_uri(style: &str, source: &str) -> String {
    let scheme = split_uri(source).0.unwrap_or(crate::config::DEFAULT_SCHEME);
    format!(
        "{scheme}{SCHEME_SEP}{STYLES_DIR}/{style}/{scheme}/{}",
        target(source)
    )
}

/// MIME type from the key's extension.
pub fn guess_content_type(key: &str) -> &'static str {
    let ext = extension(key).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") => "text/plain",
        Some("htm" | "html") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
