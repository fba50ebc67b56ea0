//! Diagram extraction.
//!
//! Three encodings are recognised, most structured first:
//!
//! 1. Inline diagram widgets carrying a base64 SVG data URI (or a raw
//!    `<svg>` child). Graphviz-style SVGs are parsed into nodes and edges;
//!    anything else keeps its text labels.
//! 2. Mermaid source blocks, kept verbatim.
//! 3. Titled `<svg>` elements and images whose alt text or file name looks
//!    like a diagram, kept as opaque references.

use std::collections::HashSet;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use super::text::{collapse, plain_text};

const INLINE_WIDGET: &str = "code-documentation-diagram-inline";
const SVG_DATA_PREFIX: &str = "data:image/svg+xml;base64,";

static DIAGRAM_HINT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)diagram|architecture|flow|chart|graph").expect("static diagram pattern")
});

/// How a diagram was encoded in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    /// Parsed graph-layout SVG.
    Graph,
    /// Mermaid source text.
    Mermaid,
    /// Titled image or SVG without structure.
    Image,
}

/// Graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramNode {
    /// Layout identifier.
    pub id: String,
    /// Rendered label.
    pub label: String,
}

/// Graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramEdge {
    /// Source vertex id.
    pub from: String,
    /// Target vertex id.
    pub to: String,
    /// Edge label, if drawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One extracted diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagram {
    /// Encoding.
    pub kind: DiagramKind,
    /// Title of the section it belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Caption, alt text, or SVG title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Vertices of a parsed graph.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<DiagramNode>,
    /// Edges of a parsed graph.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<DiagramEdge>,
    /// Text labels of an SVG that is not graph-layout output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Mermaid source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Image URL or element id for opaque diagrams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Diagram {
    fn new(kind: DiagramKind) -> Self {
        Self {
            kind,
            section: None,
            title: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            labels: Vec::new(),
            source: None,
            reference: None,
        }
    }

    /// One-line description used in summaries.
    pub fn headline(&self) -> String {
        let name = self
            .title
            .as_deref()
            .or(self.section.as_deref())
            .unwrap_or("Untitled diagram");
        match self.kind {
            DiagramKind::Graph if !self.nodes.is_empty() => format!(
                "{name}: {} entities, {} relationships",
                self.nodes.len(),
                self.edges.len()
            ),
            DiagramKind::Graph => format!("{name}: {} labels", self.labels.len()),
            DiagramKind::Mermaid => {
                let lines = self.source.as_deref().map_or(0, |s| s.lines().count());
                format!("{name}: mermaid source, {lines} lines")
            },
            DiagramKind::Image => format!("{name}: image"),
        }
    }
}

/// Nodes, edges, and loose text labels read from an SVG document.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SvgGraph {
    /// `<g class="node">` groups.
    pub nodes: Vec<DiagramNode>,
    /// `<g class="edge">` groups.
    pub edges: Vec<DiagramEdge>,
    /// Every `<text>` run, in document order.
    pub labels: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Node,
    Edge,
}

struct Group {
    kind: GroupKind,
    depth: usize,
    title: String,
    texts: Vec<String>,
}

fn class_kind(start: &BytesStart<'_>) -> Option<GroupKind> {
    start.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() != b"class" {
            return None;
        }
        let value = attr.unescape_value().ok()?;
        value.split_whitespace().find_map(|class| match class {
            "node" => Some(GroupKind::Node),
            "edge" => Some(GroupKind::Edge),
            _ => None,
        })
    })
}

/// Parse graph-layout SVG output into a node and edge list.
///
/// Malformed markup ends parsing early and keeps whatever was read so far.
pub fn parse_svg_graph(svg: &str) -> SvgGraph {
    let mut reader = Reader::from_str(svg);
    reader.config_mut().trim_text(true);

    let mut graph = SvgGraph::default();
    let mut seen_nodes = HashSet::new();
    let mut current: Option<Group> = None;
    let mut depth = 0usize;
    let mut in_title = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"g" => {
                    depth += 1;
                    if current.is_none() {
                        if let Some(kind) = class_kind(&start) {
                            current = Some(Group {
                                kind,
                                depth,
                                title: String::new(),
                                texts: Vec::new(),
                            });
                        }
                    }
                },
                b"title" => in_title = true,
                b"text" => in_text = true,
                _ => {},
            },
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"g" => {
                    if current.as_ref().is_some_and(|g| g.depth == depth) {
                        if let Some(group) = current.take() {
                            finish_group(group, &mut graph, &mut seen_nodes);
                        }
                    }
                    depth = depth.saturating_sub(1);
                },
                b"title" => in_title = false,
                b"text" => in_text = false,
                _ => {},
            },
            Ok(Event::Text(text)) => {
                let Ok(text) = text.unescape() else { continue };
                let text = collapse(&text);
                if text.is_empty() {
                    continue;
                }
                if let Some(group) = current.as_mut() {
                    if in_title {
                        group.title.push_str(&text);
                    } else if in_text {
                        group.texts.push(text.clone());
                    }
                }
                if in_text {
                    graph.labels.push(text);
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("stopped reading diagram svg: {e}");
                break;
            },
            Ok(_) => {},
        }
    }
    graph
}

fn finish_group(group: Group, graph: &mut SvgGraph, seen: &mut HashSet<String>) {
    let title = group.title.trim();
    let label = (!group.texts.is_empty()).then(|| group.texts.join(" "));
    match group.kind {
        GroupKind::Node => {
            if title.is_empty() || !seen.insert(title.to_string()) {
                return;
            }
            graph.nodes.push(DiagramNode {
                id: title.to_string(),
                label: label.unwrap_or_else(|| title.to_string()),
            });
        },
        GroupKind::Edge => {
            let split = title.split_once("->").or_else(|| title.split_once("--"));
            if let Some((from, to)) = split {
                graph.edges.push(DiagramEdge {
                    from: from.trim().to_string(),
                    to: to.trim().to_string(),
                    label,
                });
            }
        },
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Every `href`-like attribute of `el`, whatever its namespace prefix.
fn href_of(el: ElementRef<'_>) -> Option<String> {
    el.value()
        .attrs()
        .find(|(name, _)| *name == "href" || *name == "src")
        .map(|(_, value)| value.to_string())
}

fn inside(el: ElementRef<'_>, ancestor: &str) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == ancestor)
}

fn decode_svg_uri(href: &str) -> Option<String> {
    let payload = href.strip_prefix(SVG_DATA_PREFIX)?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn graph_diagram(svg: &str) -> Diagram {
    let graph = parse_svg_graph(svg);
    let mut diagram = Diagram::new(DiagramKind::Graph);
    if graph.nodes.is_empty() {
        diagram.labels = graph.labels;
    } else {
        diagram.nodes = graph.nodes;
        diagram.edges = graph.edges;
    }
    diagram
}

/// Extract every diagram in `doc`, paired with the element's document
/// position as reported by `position`.
pub(crate) fn extract_diagrams(
    doc: &Html,
    position: &dyn Fn(ElementRef<'_>) -> usize,
) -> Vec<(usize, Diagram)> {
    let mut found = Vec::new();
    let mut seen_refs = HashSet::new();

    if let Some(widgets) = selector(INLINE_WIDGET) {
        let images = selector("image, img");
        let svgs = selector("svg");
        for widget in doc.select(&widgets) {
            let href = images
                .as_ref()
                .and_then(|sel| {
                    widget
                        .select(sel)
                        .find_map(|img| href_of(img).filter(|h| h.starts_with(SVG_DATA_PREFIX)))
                });
            let diagram = match href {
                Some(href) => {
                    if !seen_refs.insert(href.clone()) {
                        continue;
                    }
                    let Some(svg) = decode_svg_uri(&href) else {
                        debug!("undecodable diagram data uri");
                        continue;
                    };
                    graph_diagram(&svg)
                },
                None => match svgs.as_ref().and_then(|sel| widget.select(sel).next()) {
                    Some(svg) => graph_diagram(&svg.html()),
                    None => continue,
                },
            };
            found.push((position(widget), diagram));
        }
    }

    if let Some(mermaid) = selector("pre > code.mermaid, pre.mermaid, div.mermaid, code.language-mermaid") {
        for block in doc.select(&mermaid) {
            // `pre.mermaid > code.mermaid` is one diagram; take the outer element.
            let nested = block
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| mermaid.matches(&a));
            let source: String = block.text().collect();
            let source = source.trim().to_string();
            if nested || source.is_empty() {
                continue;
            }
            let mut diagram = Diagram::new(DiagramKind::Mermaid);
            diagram.source = Some(source);
            found.push((position(block), diagram));
        }
    }

    if let Some(svgs) = selector("svg") {
        let title_sel = selector("title");
        for svg in doc.select(&svgs) {
            if inside(svg, INLINE_WIDGET) || inside(svg, "svg") {
                continue;
            }
            let title = title_sel
                .as_ref()
                .and_then(|sel| svg.select(sel).next())
                .map(plain_text)
                .filter(|t| !t.is_empty());
            let Some(title) = title else { continue };
            let reference = svg.value().attr("id").map_or_else(|| format!("svg:{title}"), str::to_string);
            if !seen_refs.insert(reference.clone()) {
                continue;
            }
            let mut diagram = Diagram::new(DiagramKind::Image);
            diagram.title = Some(title);
            diagram.reference = Some(reference);
            found.push((position(svg), diagram));
        }
    }

    if let Some(imgs) = selector("img") {
        for img in doc.select(&imgs) {
            if inside(img, INLINE_WIDGET) {
                continue;
            }
            let alt = img.value().attr("alt").unwrap_or_default().trim();
            let src = img.value().attr("src").unwrap_or_default();
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            let file = src.rsplit('/').next().unwrap_or(src);
            if !DIAGRAM_HINT.is_match(alt) && !DIAGRAM_HINT.is_match(file) {
                continue;
            }
            if !seen_refs.insert(src.to_string()) {
                continue;
            }
            let mut diagram = Diagram::new(DiagramKind::Image);
            diagram.title = (!alt.is_empty()).then(|| alt.to_string());
            diagram.reference = Some(src.to_string());
            found.push((position(img), diagram));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found
}
