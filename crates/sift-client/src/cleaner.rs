use scraper::{ElementRef, Html, Node};
use sift_core::config::ExtractionConfig;
use sift_core::traits::Cleaner;

/// Subtrees that never carry page content.
const SKIP_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe",
];

const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "section",
    "article",
    "main",
    "header",
    "footer",
    "nav",
    "aside",
    "blockquote",
    "pre",
    "ul",
    "ol",
    "dl",
    "dt",
    "dd",
    "table",
    "tr",
    "form",
    "figure",
    "figcaption",
    "address",
    "hr",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// HTML-to-text cleaner built on html5ever (via `scraper`).
///
/// Produces plain text with no inline markup, to minimize prompt tokens.
/// Link targets and image references are suppressed by default; each can be
/// kept independently, rendered as `[text](href)` and `![alt](src)`.
/// Malformed HTML is parsed best-effort and never fails.
#[derive(Debug, Clone, Copy)]
pub struct HtmlTextCleaner {
    ignore_links: bool,
    ignore_images: bool,
}

impl HtmlTextCleaner {
    pub fn new() -> Self {
        Self {
            ignore_links: true,
            ignore_images: true,
        }
    }

    /// Cleaner honoring the config's link and image switches.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            ignore_links: config.clean_ignore_links,
            ignore_images: config.clean_ignore_images,
        }
    }

    pub fn ignore_links(mut self, ignore: bool) -> Self {
        self.ignore_links = ignore;
        self
    }

    pub fn ignore_images(mut self, ignore: bool) -> Self {
        self.ignore_images = ignore;
        self
    }
}

impl Default for HtmlTextCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for HtmlTextCleaner {
    fn clean(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        if !document.errors.is_empty() {
            tracing::debug!(
                errors = document.errors.len(),
                "Malformed HTML, using best-effort text"
            );
        }

        let mut renderer = Renderer {
            ignore_links: self.ignore_links,
            ignore_images: self.ignore_images,
            buf: String::with_capacity(html.len() / 2),
        };
        renderer.children(document.root_element());
        normalize(&renderer.buf)
    }
}

struct Renderer {
    ignore_links: bool,
    ignore_images: bool,
    buf: String,
}

impl Renderer {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.element(child_ref);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if SKIP_TAGS.contains(&tag) {
            return;
        }

        match tag {
            "br" => self.buf.push('\n'),
            "img" => self.image(element),
            "a" => self.link(element),
            "li" => {
                self.buf.push_str("\n* ");
                self.children(element);
            }
            "td" | "th" => {
                self.children(element);
                self.buf.push(' ');
            }
            _ if HEADING_TAGS.contains(&tag) => {
                self.buf.push_str("\n\n");
                self.children(element);
                self.buf.push_str("\n\n");
            }
            _ if BLOCK_TAGS.contains(&tag) => {
                self.buf.push('\n');
                self.children(element);
                self.buf.push('\n');
            }
            _ => self.children(element),
        }
    }

    fn link(&mut self, element: ElementRef<'_>) {
        let href = element
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty() && !h.starts_with('#') && !h.starts_with("javascript:"));

        match href {
            Some(href) if !self.ignore_links => {
                self.buf.push('[');
                self.children(element);
                self.buf.push_str("](");
                self.buf.push_str(href);
                self.buf.push(')');
            }
            _ => self.children(element),
        }
    }

    fn image(&mut self, element: ElementRef<'_>) {
        if self.ignore_images {
            return;
        }
        let Some(src) = element.value().attr("src") else {
            return;
        };
        let alt = element.value().attr("alt").unwrap_or("").trim();
        self.buf.push_str(&format!("![{alt}]({})", src.trim()));
    }

    /// Append a text node, folding source whitespace into single spaces.
    fn text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !self.buf.ends_with([' ', '\n']) && !self.buf.is_empty() {
                    self.buf.push(' ');
                }
            } else {
                self.buf.push(ch);
            }
        }
    }
}

/// Collapse whitespace per line, trim lines, keep at most one blank line
/// between blocks.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_pending = false;

    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_pending = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_pending {
                out.push('\n');
            }
        }
        out.push_str(&collapsed);
        blank_pending = false;
    }

    out
}
