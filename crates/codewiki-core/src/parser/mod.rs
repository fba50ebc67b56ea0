//! Structural parsing of rendered wiki pages.
//!
//! A [`Parser`] holds an ordered list of [`SectionStrategy`]s. The first
//! strategy that recognises the document and yields at least one section
//! wins; the default order puts the site-specific layout ahead of the generic
//! heading walk. Diagrams are extracted separately and attributed to the
//! section that precedes them in document order.
//!
//! Parsing never touches the cache: a [`WikiPage`] is rebuilt from the
//! rendered HTML on every call.

mod diagram;
mod sections;
mod text;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

pub use diagram::{Diagram, DiagramEdge, DiagramKind, DiagramNode, SvgGraph, parse_svg_graph};
pub use sections::{HeadingStrategy, SiteSectionStrategy};

/// How many titles a not-found error lists.
pub const MAX_LISTED_SECTIONS: usize = 20;

static BRANDING: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\s*(spark\s*)?powered by gemini\s*$").expect("static branding pattern")
});

/// Text that marks a repository page the service has not generated yet.
const NOT_INDEXED_PHRASES: &[&str] = &[
    "has not been indexed",
    "hasn't been indexed",
    "is not indexed",
    "isn't indexed yet",
    "not yet indexed",
];

/// Section as produced by a strategy, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// Heading text.
    pub title: String,
    /// Heading level, 1 to 6.
    pub level: u8,
    /// Element id, when the page provides one.
    pub id: Option<String>,
    /// Markdown body.
    pub body: String,
    /// Document position of the section start.
    pub position: usize,
}

/// One way of cutting a document into sections.
pub trait SectionStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the document has this strategy's markers.
    fn applies(&self, doc: &Html) -> bool;

    /// Sections in document order. `position` maps an element to its
    /// document position.
    fn extract(&self, doc: &Html, position: &dyn Fn(ElementRef<'_>) -> usize) -> Vec<RawSection>;
}

/// Normalized section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Heading text.
    pub title: String,
    /// Stable identifier, unique within the page.
    pub anchor: String,
    /// Depth relative to the shallowest heading on the page, starting at 1.
    pub depth: u8,
    /// Markdown body up to the next section.
    pub body: String,
    /// Diagrams that appear inside the section.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagrams: Vec<Diagram>,
}

/// Table-of-contents row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Heading text.
    pub title: String,
    /// Section anchor.
    pub anchor: String,
    /// Section depth.
    pub depth: u8,
    /// Opening words of the body.
    pub preview: String,
}

/// Parsed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiPage {
    /// Page title with site branding removed.
    pub title: String,
    /// Strategy that produced the sections.
    pub strategy: &'static str,
    /// Sections in document order.
    pub sections: Vec<Section>,
    /// Every diagram on the page, in document order.
    pub diagrams: Vec<Diagram>,
}

impl WikiPage {
    /// Outline with body previews of at most `preview_chars` characters.
    pub fn toc(&self, preview_chars: usize) -> Vec<TocEntry> {
        self.sections
            .iter()
            .map(|s| TocEntry {
                title: s.title.clone(),
                anchor: s.anchor.clone(),
                depth: s.depth,
                preview: preview(&s.body, preview_chars),
            })
            .collect()
    }

    /// Index of the first section whose title contains `query`,
    /// case-insensitively. An exact anchor match is accepted when no title
    /// matches.
    pub fn find_section(&self, query: &str) -> Result<usize> {
        let needle = query.trim().trim_start_matches('#').trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::Validation("section must not be empty".into()));
        }
        self.sections
            .iter()
            .position(|s| s.title.to_lowercase().contains(&needle))
            .or_else(|| self.sections.iter().position(|s| s.anchor == needle))
            .ok_or_else(|| Error::NotFound {
                requested: query.trim().to_string(),
                available: self
                    .sections
                    .iter()
                    .take(MAX_LISTED_SECTIONS)
                    .map(|s| s.title.clone())
                    .collect(),
            })
    }

    /// Section at `index` followed by its descendants.
    pub fn section_with_children(&self, index: usize) -> &[Section] {
        let Some(head) = self.sections.get(index) else {
            return &[];
        };
        let end = self.sections[index + 1..]
            .iter()
            .position(|s| s.depth <= head.depth)
            .map_or(self.sections.len(), |offset| index + 1 + offset);
        &self.sections[index..end]
    }
}

/// Ordered strategy list.
pub struct Parser {
    strategies: Vec<Box<dyn SectionStrategy>>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::with_strategies(vec![Box::new(SiteSectionStrategy), Box::new(HeadingStrategy)])
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

impl Parser {
    /// Parser trying `strategies` in order.
    pub fn with_strategies(strategies: Vec<Box<dyn SectionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Parse rendered `html`. `fallback_title` is used when the page has no
    /// heading to take a title from.
    ///
    /// Fails with [`Error::NoContent`] when the page has no visible text and
    /// with [`Error::NotIndexed`] when it has text but no sections.
    #[tracing::instrument(skip_all, fields(bytes = html.len()))]
    pub fn parse(&self, html: &str, fallback_title: &str) -> Result<WikiPage> {
        let doc = Html::parse_document(html);
        let visible = text::element_markdown(doc.root_element());
        if visible.trim().is_empty() {
            return Err(Error::NoContent("rendered page has no visible text".into()));
        }

        let position = document_order(&doc);
        let extracted = self.strategies.iter().filter(|s| s.applies(&doc)).find_map(|s| {
            let raw = s.extract(&doc, &position);
            (!raw.is_empty()).then(|| (s.name(), raw))
        });

        let lowered = visible.to_lowercase();
        let (strategy, raw) = match extracted {
            Some((name, _)) if name != SiteSectionStrategy.name() && looks_unindexed(&lowered) => {
                return Err(not_indexed());
            },
            Some(found) => found,
            None => return Err(not_indexed()),
        };
        debug!(strategy, sections = raw.len(), "parsed wiki page");

        let mut sections = normalize(raw.iter());
        let positions: Vec<usize> = raw.iter().map(|r| r.position).collect();
        let mut diagrams = Vec::new();
        for (pos, mut found) in diagram::extract_diagrams(&doc, &position) {
            let owner = positions.partition_point(|p| *p <= pos);
            if let Some(section) = owner.checked_sub(1).and_then(|i| sections.get_mut(i)) {
                found.section = Some(section.title.clone());
                section.diagrams.push(found.clone());
            }
            diagrams.push(found);
        }

        Ok(WikiPage {
            title: page_title(&doc).unwrap_or_else(|| fallback_title.to_string()),
            strategy,
            sections,
            diagrams,
        })
    }
}

fn not_indexed() -> Error {
    Error::NotIndexed("the page has content but no wiki sections; the repository may not be indexed yet".into())
}

fn looks_unindexed(lowered: &str) -> bool {
    NOT_INDEXED_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Map from element to its pre-order index in `doc`.
fn document_order(doc: &Html) -> impl Fn(ElementRef<'_>) -> usize {
    let index: HashMap<_, usize> = doc
        .root_element()
        .descendants()
        .enumerate()
        .map(|(i, node)| (node.id(), i))
        .collect();
    move |el: ElementRef<'_>| {
        index
            .get(&std::ops::Deref::deref(&el).id())
            .copied()
            .unwrap_or(usize::MAX)
    }
}

fn normalize<'a>(raw: impl Iterator<Item = &'a RawSection> + Clone) -> Vec<Section> {
    let shallowest = raw.clone().map(|r| r.level).min().unwrap_or(1);
    let mut anchors = HashSet::new();
    raw.map(|r| {
        let title = strip_branding(&r.title).unwrap_or_else(|| r.title.clone());
        Section {
            anchor: claim_anchor(&mut anchors, r.id.as_deref(), &title),
            title,
            depth: r.level.saturating_sub(shallowest) + 1,
            body: r.body.clone(),
            diagrams: Vec::new(),
        }
    })
    .collect()
}

fn claim_anchor(taken: &mut HashSet<String>, id: Option<&str>, title: &str) -> String {
    let base = id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| slugify(title), str::to_string);
    let mut candidate = base.clone();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{base}-{n}");
        n += 1;
    }
    candidate
}

/// Lowercase, alphanumerics kept, everything else folded into single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() { "section".to_string() } else { slug.to_string() }
}

fn page_title(doc: &Html) -> Option<String> {
    ["h1", "h2", "title"].iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        doc.select(&sel)
            .map(text::plain_text)
            .find_map(|t| strip_branding(&t))
    })
}

/// `title` without the trailing site badge; `None` if nothing is left.
fn strip_branding(title: &str) -> Option<String> {
    let stripped = BRANDING.replace(title, "");
    let stripped = stripped.trim();
    (!stripped.is_empty()).then(|| stripped.to_string())
}

/// Whitespace-collapsed prefix of `body`, cut at a word boundary.
pub fn preview(body: &str, max_chars: usize) -> String {
    let flat = text::collapse(body);
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    let cut = cut.rfind(' ').filter(|i| *i > 0).map_or(cut.as_str(), |i| &cut[..i]);
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SITE_AND_HEADINGS: &str = r#"<html><body>
      <h1>hello-world spark Powered by Gemini</h1>
      <body-content-section id="overview"><h2>Overview</h2>
        <documentation-markdown><h2>Overview</h2><p>A tiny demo repository.</p></documentation-markdown>
      </body-content-section>
      <body-content-section id="usage"><h2>Usage</h2>
        <documentation-markdown><p>Run <code>make</code>.</p></documentation-markdown>
      </body-content-section>
      <h3>Stray heading</h3><p>outside any section</p>
    </body></html>"#;

    const HEADINGS_ONLY: &str = r#"<html><body><main>
      <h2 id="intro">Intro</h2><p>First.</p>
      <h3>Details</h3><p>Nested.</p><ul><li>a</li></ul>
      <h3>Details</h3><p>Again.</p>
      <h2>Next</h2><p>Last.</p>
    </main></body></html>"#;

    #[test]
    fn test_site_strategy_wins_over_headings() {
        let page = Parser::default().parse(SITE_AND_HEADINGS, "fallback").unwrap();

        assert_eq!(page.strategy, "site-sections");
        assert_eq!(page.title, "hello-world");
        let titles: Vec<&str> = page.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Overview", "Usage"]);
        assert_eq!(page.sections[0].anchor, "overview");
        assert_eq!(page.sections[0].depth, 1);
        assert_eq!(page.sections[0].body, "A tiny demo repository.");
        assert_eq!(page.sections[1].body, "Run `make`.");
    }

    #[test]
    fn test_heading_fallback_one_section_per_heading() {
        let page = Parser::default().parse(HEADINGS_ONLY, "fallback").unwrap();

        assert_eq!(page.strategy, "headings");
        assert_eq!(page.sections.len(), 4);
        let shape: Vec<(&str, u8, &str)> = page
            .sections
            .iter()
            .map(|s| (s.title.as_str(), s.depth, s.anchor.as_str()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("Intro", 1, "intro"),
                ("Details", 2, "details"),
                ("Details", 2, "details-1"),
                ("Next", 1, "next"),
            ]
        );
        assert_eq!(page.sections[1].body, "Nested.\n\n- a");
        assert_eq!(page.title, "Intro");
    }

    #[test]
    fn test_section_lookup_and_descendants() {
        let page = Parser::default().parse(HEADINGS_ONLY, "fallback").unwrap();

        let idx = page.find_section("intro").unwrap();
        assert_eq!(idx, 0);
        let span: Vec<&str> = page
            .section_with_children(idx)
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(span, vec!["Intro", "Details", "Details"]);

        assert_eq!(page.find_section("DETAIL").unwrap(), 1);
        // No title contains "details-1", so the anchor decides.
        assert_eq!(page.find_section("#details-1").unwrap(), 2);
    }

    #[test]
    fn test_missing_section_lists_titles() {
        let page = Parser::default().parse(HEADINGS_ONLY, "fallback").unwrap();
        let err = page.find_section("Deployment").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InputNotFound);
        assert!(err.to_string().contains("Intro, Details, Details, Next"));
    }

    #[test]
    fn test_blank_and_sectionless_pages() {
        let parser = Parser::default();
        let blank = parser.parse("<html><body>  <script>var x;</script> </body></html>", "f");
        assert!(matches!(blank, Err(Error::NoContent(_))));

        let plain = parser.parse("<html><body><p>Search repositories</p></body></html>", "f");
        assert!(matches!(plain, Err(Error::NotIndexed(_))));

        let notice = parser.parse(
            "<html><body><h1>Oops</h1><p>This repository has not been indexed.</p></body></html>",
            "f",
        );
        assert!(matches!(notice, Err(Error::NotIndexed(_))));
    }

    #[test]
    fn test_diagrams_are_attributed_to_preceding_section() {
        let html = r#"<html><body><main>
          <h2>Overview</h2><p>Intro text.</p>
          <h2>Architecture</h2>
          <pre><code class="mermaid">graph LR
  A --> B</code></pre>
        </main></body></html>"#;
        let page = Parser::default().parse(html, "f").unwrap();

        assert!(page.sections[0].diagrams.is_empty());
        assert_eq!(page.sections[1].diagrams.len(), 1);
        assert_eq!(page.diagrams.len(), 1);
        assert_eq!(page.diagrams[0].section.as_deref(), Some("Architecture"));
    }

    #[test]
    fn test_repeated_diagram_stays_in_each_section() {
        let html = r#"<html><body><main>
          <h2>Read path</h2>
          <pre><code class="mermaid">graph LR
  A --> B</code></pre>
          <h2>Write path</h2>
          <pre><code class="mermaid">graph LR
  A --> B</code></pre>
        </main></body></html>"#;
        let page = Parser::default().parse(html, "f").unwrap();

        assert_eq!(page.diagrams.len(), 2);
        assert_eq!(page.sections[0].diagrams.len(), 1);
        assert_eq!(page.sections[1].diagrams.len(), 1);
        assert_eq!(page.diagrams[1].section.as_deref(), Some("Write path"));
    }

    #[test]
    fn test_toc_previews_are_bounded() {
        let page = Parser::default().parse(HEADINGS_ONLY, "fallback").unwrap();
        let toc = page.toc(200);
        assert_eq!(toc.len(), 4);
        assert_eq!(toc[0].preview, "First.");

        assert_eq!(preview("alpha beta gamma", 11), "alpha beta...");
        assert_eq!(preview("short", 200), "short");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started: Build & Run"), "getting-started-build-run");
        assert_eq!(slugify("  ¿?  "), "section");
    }
}
