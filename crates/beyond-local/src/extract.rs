use std::io::Cursor;

/// Wrap width handed to html2text. Line breaks are collapsed afterwards, so this only has to be
/// wide enough not to split words.
const TEXT_WIDTH: usize = 10_000;

/// Convert HTML to plain text.
pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of a page's main content region, on one line.
///
/// - region: first non-empty `main`, `article` or `[role=main]`, else `body`, else the whole input
/// - `script`/`style`/`noscript` blocks removed
/// - link targets dropped (anchor text kept)
/// - line breaks and runs of whitespace collapsed to single spaces, ends trimmed
pub fn page_text(html: &str) -> String {
    let html = strip_tag_blocks(html, "script");
    let html = strip_tag_blocks(&html, "style");
    let html = strip_tag_blocks(&html, "noscript");
    let region = main_region_html(&html).unwrap_or(html);
    let region = strip_link_targets(&region);
    norm_ws(&html_to_text(&region, TEXT_WIDTH))
}

fn main_region_html(html: &str) -> Option<String> {
    let doc = html_scraper::Html::parse_document(html);
    for selector in ["main", "article", "[role=main]", "body"] {
        let Ok(sel) = html_scraper::Selector::parse(selector) else {
            continue;
        };
        let found = doc
            .select(&sel)
            .find(|el| el.text().any(|t| !t.trim().is_empty()));
        if let Some(el) = found {
            return Some(el.html());
        }
    }
    None
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Minimal, best-effort stripper for <tag ...> ... </tag> blocks.
    // Only removes when it finds a close tag; ASCII-case-insensitive on tag names.
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

/// Remove `href` attributes from every tag so html2text renders anchors as plain text
/// instead of appending numbered link footnotes.
fn strip_link_targets(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut i = 0usize;
    while let Some(rel_open) = html[i..].find('<') {
        let open = i + rel_open;
        let Some(rel_close) = html[open..].find('>') else {
            break;
        };
        let close = open + rel_close;
        out.push_str(&html[i..open]);
        out.push_str(&strip_href_attr(&html[open..=close]));
        i = close + 1;
    }
    out.push_str(&html[i..]);
    out
}

fn strip_href_attr(tag: &str) -> String {
    let lower = tag.to_ascii_lowercase();
    let bytes = tag.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0usize;
    while let Some(rel) = lower[i..].find("href") {
        let start = i + rel;
        let mut j = start + 4;
        while j < len && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let is_attr =
            start > 0 && bytes[start - 1].is_ascii_whitespace() && bytes.get(j) == Some(&b'=');
        if !is_attr {
            out.push_str(&tag[i..start + 4]);
            i = start + 4;
            continue;
        }
        j += 1;
        while j < len && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let end = match bytes.get(j) {
            Some(&q) if q == b'"' || q == b'\'' => tag[j + 1..]
                .find(q as char)
                .map(|r| j + 1 + r + 1)
                .unwrap_or(len),
            Some(_) => {
                let mut k = j;
                while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                    k += 1;
                }
                k
            }
            None => len,
        };
        // Drop the separating whitespace along with the attribute.
        out.push_str(&tag[i..start - 1]);
        i = end;
    }
    out.push_str(&tag[i..]);
    out
}
