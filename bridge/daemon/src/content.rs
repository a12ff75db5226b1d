//! Embedded browser client
//!
//! The terminal page and its script are compiled into the binary and served
//! by name. Content type is derived from the file extension.

/// Asset served for `GET /`
pub const INDEX: &str = "index.html";

const ASSETS: &[(&str, &[u8])] = &[
    ("index.html", include_bytes!("../content/index.html")),
    ("console.js", include_bytes!("../content/console.js")),
    ("console.css", include_bytes!("../content/console.css")),
];

/// Look up an embedded asset by file name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static [u8]> {
    ASSETS
        .iter()
        .find(|(asset, _)| *asset == name)
        .map(|(_, bytes)| *bytes)
}

/// Content type for a file name, by extension (case-insensitive)
#[must_use]
pub fn content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html",
        "js" => "text/javascript",
        "css" => "text/css",
        _ => "text/plain",
    }
}
