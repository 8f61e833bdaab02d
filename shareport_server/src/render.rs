//! Minimal HTML rendering for the browsing UI.
//!
//! Browsers (Accept: text/html) get these pages; API clients get the JSON
//! types in [`crate::types`]. The pages stay deliberately small: a table
//! per directory, an upload form on writable directories, and nothing that
//! needs client-side scripting. Everything else goes through the JSON API.

use crate::types::{EntryInfo, IndexEntry};

const PAGE_TITLE: &str = "Shareport";

/// Escape text for HTML body and attribute contexts.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a name for use inside a URL path segment.
fn encode_segment(s: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
    // Everything a path segment cannot carry verbatim.
    const SEGMENT: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'#')
        .add(b'%')
        .add(b'/')
        .add(b'<')
        .add(b'>')
        .add(b'?')
        .add(b'\\');
    utf8_percent_encode(s, SEGMENT).to_string()
}

/// Human-readable size with binary units.
pub fn size_for_human(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut result = size as f64;
    let mut unit = 0;
    while result >= 1024.0 && unit < UNITS.len() - 1 {
        result /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size, UNITS[unit])
    } else {
        format!("{:.2} {}", result, UNITS[unit])
    }
}

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n\
         <meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <style>\na{{text-decoration:none;}}\nhr{{width:500px;margin-left:0px;}}\n\
         table{{border:1px solid silver;border-collapse:collapse;}}\n\
         td,th{{border:1px solid silver;padding:2px 8px;}}\n</style>\n\
         </head>\n<body>\n{body}\n<hr>\n\
         <p><i><small>Shareport {version}</small></i></p>\n</body>\n</html>\n",
        title = PAGE_TITLE,
        body = body,
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// The home page: one link per visible share or custom handler.
pub fn index_page(entries: &[IndexEntry]) -> String {
    let mut links = Vec::new();
    for entry in entries {
        let suffix = if entry.kind == "dir" { "/" } else { "" };
        links.push(format!(
            "<a href=\"{href}{suffix}\">{label}{suffix}</a>",
            href = encode_segment(&entry.name),
            label = escape(&entry.name),
            suffix = suffix,
        ));
    }
    page(&format!(
        "<h2>Home Page</h2>\n<p>List of entries</p>\n<hr>\n{}",
        links.join("<br>\n")
    ))
}

/// A directory page: entry table plus an upload form when writable.
pub fn listing_page(
    display_path: &str,
    entries: &[EntryInfo],
    readonly: bool,
    listable: bool,
) -> String {
    let mut rows = vec![
        "<tr>\n<th>Name</th>\n<th>Size</th>\n</tr>".to_string(),
        "<tr>\n<td><a href=\"../\">../</a></td>\n<td>DIR</td>\n</tr>".to_string(),
    ];
    if listable {
        for entry in entries {
            let (href, label, size) = if entry.is_symlink {
                (
                    encode_segment(&entry.name),
                    format!("{}@", escape(&entry.name)),
                    "LNK".to_string(),
                )
            } else if entry.is_dir {
                (
                    format!("{}/", encode_segment(&entry.name)),
                    format!("{}/", escape(&entry.name)),
                    "DIR".to_string(),
                )
            } else {
                (
                    encode_segment(&entry.name),
                    escape(&entry.name),
                    size_for_human(entry.size),
                )
            };
            rows.push(format!(
                "<tr>\n<td><a href=\"{}\">{}</a></td>\n<td>{}</td>\n</tr>",
                href, label, size
            ));
        }
    }

    let upload_form = if readonly {
        String::new()
    } else {
        "<form enctype=\"multipart/form-data\" method=\"post\" accept-charset=\"UTF-8\">\
         Upload:\n<input type=\"file\" name=\"file\" multiple=\"multiple\" required=\"required\">\n\
         <input type=\"submit\" value=\"Upload file(s)\">\n</form>\n<hr>\n"
            .to_string()
    };

    page(&format!(
        "<h2>Index of {path}</h2>\n<hr>\n<table>\n{rows}\n</table>\n<hr>\n{upload}",
        path = escape(display_path),
        rows = rows.join("\n"),
        upload = upload_form,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_size_for_human() {
        assert_eq!(size_for_human(0), "0 B");
        assert_eq!(size_for_human(512), "512 B");
        assert_eq!(size_for_human(2048), "2.00 KiB");
        assert_eq!(size_for_human(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn test_listing_page_escapes_names() {
        let entries = vec![EntryInfo {
            name: "<script>.txt".to_string(),
            size: 10,
            modified: None,
            is_dir: false,
            is_symlink: false,
        }];
        let html = listing_page("shared", &entries, false, true);
        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>.txt"));
    }

    #[test]
    fn test_readonly_hides_upload_form() {
        let html = listing_page("shared", &[], true, true);
        assert!(!html.contains("multipart/form-data"));
        let html = listing_page("shared", &[], false, true);
        assert!(html.contains("multipart/form-data"));
    }

    #[test]
    fn test_unlistable_dir_shows_no_entries() {
        let entries = vec![EntryInfo {
            name: "hidden.txt".to_string(),
            size: 1,
            modified: None,
            is_dir: false,
            is_symlink: false,
        }];
        let html = listing_page("shared", &entries, false, false);
        assert!(!html.contains("hidden.txt"));
    }
}
