//! DOM subtree to markdown-flavoured text.

use scraper::node::Element;
use scraper::{ElementRef, Node};

/// Tree node handle as exposed by `scraper`.
pub(crate) type NodeRef<'a> = <ElementRef<'a> as std::ops::Deref>::Target;

/// Elements whose content never belongs in section text.
const SKIPPED: &[&str] = &[
    "head",
    "script",
    "style",
    "noscript",
    "template",
    "button",
    "mat-icon",
    "svg",
    "img",
    "code-documentation-diagram-inline",
];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "ul", "ol", "table", "tr", "blockquote",
    "documentation-markdown", "body-content-section", "header", "footer", "figure",
];

/// Tokens from icon fonts that leak into text.
pub(crate) const UI_ARTIFACTS: &[&str] = &[
    "content_copy",
    "refresh",
    "thumb_up",
    "thumb_down",
    "arrow_menu_open",
    "spark",
];

/// Markdown rendering of `el` and everything below it.
pub(crate) fn element_markdown(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    walk_children(el, &mut out);
    tidy(&out)
}

/// Markdown rendering of a run of sibling nodes.
pub(crate) fn nodes_markdown<'a>(nodes: impl IntoIterator<Item = NodeRef<'a>>) -> String {
    let mut out = String::new();
    for node in nodes {
        walk(node, &mut out);
    }
    tidy(&out)
}

/// Whitespace-collapsed plain text of `el`.
pub(crate) fn plain_text(el: ElementRef<'_>) -> String {
    collapse(&el.text().collect::<String>())
}

fn walk_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        walk(child, out);
    }
}

fn walk(node: NodeRef<'_>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            let text = collapse_inline(text);
            if !text.is_empty() {
                out.push_str(&text);
            }
        },
        Node::Element(element) => {
            if let Some(el) = ElementRef::wrap(node) {
                walk_element(el, element, out);
            }
        },
        _ => {},
    }
}

fn walk_element(el: ElementRef<'_>, element: &Element, out: &mut String) {
    let name = element.name();
    if SKIPPED.contains(&name) {
        return;
    }
    match name {
        "pre" => {
            let code: String = el.text().collect();
            out.push_str("\n\n```\n");
            out.push_str(code.trim_end());
            out.push_str("\n```\n\n");
        },
        "code" => {
            let code: String = el.text().collect();
            out.push('`');
            out.push_str(code.trim());
            out.push('`');
        },
        "a" => {
            let label = inner(el);
            match element.attr("href").filter(|h| h.starts_with("http")) {
                Some(href) if !label.is_empty() => {
                    out.push_str(&format!("[{label}]({href})"));
                },
                _ => out.push_str(&label),
            }
        },
        "strong" | "b" => wrap(out, &inner(el), "**"),
        "em" | "i" => wrap(out, &inner(el), "*"),
        "br" => out.push('\n'),
        "li" => {
            out.push_str("\n- ");
            out.push_str(inner(el).trim());
        },
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = heading_level(name).map_or(3, |l| (l + 1).min(6));
            out.push_str("\n\n");
            out.push_str(&"#".repeat(usize::from(level)));
            out.push(' ');
            out.push_str(inner(el).trim());
            out.push_str("\n\n");
        },
        "td" | "th" => {
            out.push_str(" | ");
            out.push_str(inner(el).trim());
        },
        _ if BLOCKS.contains(&name) => {
            out.push_str("\n\n");
            walk_children(el, out);
            out.push_str("\n\n");
        },
        _ => walk_children(el, out),
    }
}

fn inner(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    walk_children(el, &mut out);
    out
}

fn wrap(out: &mut String, text: &str, marker: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    out.push_str(marker);
    out.push_str(text);
    out.push_str(marker);
}

/// Heading level for `h1`..`h6`.
pub(crate) fn heading_level(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b'h', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

/// Collapse whitespace runs inside a text node, keeping a single leading or
/// trailing space so adjacent inline nodes stay separated.
fn collapse_inline(text: &str) -> String {
    let body = collapse(text);
    if body.is_empty() {
        return if text.is_empty() { String::new() } else { " ".to_string() };
    }
    let lead = if text.starts_with(char::is_whitespace) { " " } else { "" };
    let tail = if text.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{body}{tail}")
}

pub(crate) fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim lines, drop icon tokens, and squeeze blank runs to one.
fn tidy(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_code = false;
    let mut blank = true;
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            out.push_str(line.trim());
            out.push('\n');
            blank = false;
            continue;
        }
        if in_code {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let line = line.trim();
        if UI_ARTIFACTS.contains(&line) {
            continue;
        }
        if line.is_empty() {
            if !blank {
                out.push('\n');
            }
            blank = true;
            continue;
        }
        out.push_str(line);
        out.push('\n');
        blank = false;
    }
    out.trim().to_string()
}
