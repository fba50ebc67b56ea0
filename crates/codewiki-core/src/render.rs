//! Text views over a parsed page.
//!
//! These are the strings tools hand back: a topic list, the full page as
//! markdown, a single section with its subsections, and the size-limited
//! window over any of them.

use std::fmt::Write as _;

use serde::Serialize;

use crate::parser::{Diagram, Section, WikiPage};

/// Marker appended when text is cut to fit.
pub const TRUNCATION_MARKER: &str = "\n\n... [truncated]";

/// Share of the limit a boundary must reach to be used as the cut point.
const BOUNDARY_FLOOR: f64 = 0.8;

const MAX_LISTED_ENTITIES: usize = 15;
const MAX_LISTED_EDGES: usize = 20;

/// Numbered topic list with body previews.
pub fn topics_markdown(page: &WikiPage, preview_chars: usize) -> String {
    let toc = page.toc(preview_chars);
    let mut out = format!("# {}\n\n", page.title);
    let _ = writeln!(out, "{} topics:\n", toc.len());
    for (i, entry) in toc.iter().enumerate() {
        let indent = "  ".repeat(usize::from(entry.depth.saturating_sub(1)));
        let _ = write!(out, "{indent}{}. **{}** (#{})", i + 1, entry.title, entry.anchor);
        if !entry.preview.is_empty() {
            let _ = write!(out, "\n{indent}   {}", entry.preview);
        }
        out.push('\n');
    }
    if !page.diagrams.is_empty() {
        let _ = writeln!(out, "\n{} diagram(s) on this page.", page.diagrams.len());
    }
    out.trim_end().to_string()
}

/// The whole page as markdown, diagram summary first.
pub fn page_markdown(page: &WikiPage) -> String {
    let mut out = format!("# {}\n\n", page.title);
    out.push_str(&diagram_summary(&page.diagrams));
    for section in &page.sections {
        push_section(&mut out, section);
    }
    out.trim_end().to_string()
}

/// One section and its descendants, diagram summary first.
pub fn sections_markdown(sections: &[Section]) -> String {
    let diagrams: Vec<Diagram> = sections.iter().flat_map(|s| s.diagrams.iter().cloned()).collect();
    let mut out = diagram_summary(&diagrams);
    for section in sections {
        push_section(&mut out, section);
    }
    out.trim_end().to_string()
}

fn push_section(out: &mut String, section: &Section) {
    let hashes = "#".repeat(usize::from(section.depth.saturating_add(1).min(6)));
    let _ = writeln!(out, "{hashes} {}\n", section.title);
    if !section.body.is_empty() {
        out.push_str(&section.body);
        out.push_str("\n\n");
    }
}

/// Summary block listing every diagram; empty when there are none.
pub fn diagram_summary(diagrams: &[Diagram]) -> String {
    if diagrams.is_empty() {
        return String::new();
    }
    let mut out = format!("**Diagrams ({}):**\n", diagrams.len());
    for diagram in diagrams {
        let _ = writeln!(out, "- {}", diagram.headline());
        if !diagram.nodes.is_empty() {
            let names: Vec<&str> = diagram
                .nodes
                .iter()
                .take(MAX_LISTED_ENTITIES)
                .map(|n| n.label.as_str())
                .collect();
            let more = diagram.nodes.len().saturating_sub(MAX_LISTED_ENTITIES);
            let _ = write!(out, "  Entities: {}", names.join(", "));
            if more > 0 {
                let _ = write!(out, " (+{more} more)");
            }
            out.push('\n');
        }
        for edge in diagram.edges.iter().take(MAX_LISTED_EDGES) {
            let _ = write!(out, "  - {} -> {}", edge.from, edge.to);
            if let Some(label) = &edge.label {
                let _ = write!(out, " ({label})");
            }
            out.push('\n');
        }
        if diagram.nodes.is_empty() && !diagram.labels.is_empty() {
            let _ = writeln!(out, "  Labels: {}", diagram.labels.join(", "));
        }
        if let Some(source) = &diagram.source {
            let _ = writeln!(out, "  ```mermaid\n{}\n  ```", source);
        }
        if let Some(reference) = &diagram.reference {
            let _ = writeln!(out, "  Ref: {reference}");
        }
    }
    out.push('\n');
    out
}

/// Cut `text` to at most `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// The cut lands on the last newline (or, failing that, space) inside the
/// window when that boundary is at least 80% of the way in; otherwise the
/// text is cut at exactly `max_chars`. Returns the text and whether it was
/// cut.
pub fn truncate(text: &str, max_chars: usize) -> (String, bool) {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };
    let window = &text[..limit];
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let floor = (window.len() as f64 * BOUNDARY_FLOOR) as usize;
    let cut = window
        .rfind('\n')
        .filter(|i| *i >= floor)
        .or_else(|| window.rfind(' ').filter(|i| *i >= floor))
        .unwrap_or(limit);
    (format!("{}{TRUNCATION_MARKER}", text[..cut].trim_end()), true)
}

/// Character window over a longer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    /// Returned text, truncation marker included.
    pub text: String,
    /// Start of the window, in characters.
    pub offset: usize,
    /// Characters in the full text.
    pub total_chars: usize,
    /// Offset to request for the rest, if anything was left out.
    pub next_offset: Option<usize>,
}

impl Window {
    /// Whether part of the text was left out.
    pub const fn truncated(&self) -> bool {
        self.next_offset.is_some()
    }
}

/// Return at most `limit` characters of `text` starting at `offset`.
///
/// Cuts on a boundary like [`truncate`] and reports where the next window
/// starts.
pub fn paginate(text: &str, offset: usize, limit: usize) -> Window {
    let total_chars = text.chars().count();
    let start = text.char_indices().nth(offset).map_or(text.len(), |(i, _)| i);
    let rest = &text[start..];

    let (body, cut) = truncate(rest, limit.max(1));
    let next_offset = cut.then(|| {
        let kept = body.strip_suffix(TRUNCATION_MARKER).unwrap_or(&body);
        offset + kept.chars().count()
    });
    let text = match next_offset {
        Some(next) => format!(
            "{body}\n(showing characters {offset}-{next} of {total_chars}; pass offset={next} for more)"
        ),
        None => body,
    };
    Window {
        text,
        offset: offset.min(total_chars),
        total_chars,
        next_offset,
    }
}
