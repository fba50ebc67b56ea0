//! Section extraction strategies.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::text::{NodeRef, element_markdown, heading_level, nodes_markdown, plain_text};
use super::{RawSection, SectionStrategy};

const UNTITLED: &str = "Untitled section";

fn static_selector(css: &'static str) -> Selector {
    #[allow(clippy::expect_used)]
    Selector::parse(css).expect("static selector")
}

static HEADINGS: LazyLock<Selector> = LazyLock::new(|| static_selector("h1, h2, h3, h4, h5, h6"));
static CONTAINERS: LazyLock<Selector> = LazyLock::new(|| static_selector("body-content-section"));
static MARKDOWN: LazyLock<Selector> = LazyLock::new(|| static_selector("documentation-markdown"));
static SCOPES: LazyLock<[Selector; 3]> =
    LazyLock::new(|| [static_selector("main"), static_selector("article"), static_selector("body")]);

/// Site-specific layout: one `<body-content-section>` per section with the
/// prose inside `<documentation-markdown>` blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SiteSectionStrategy;

impl SectionStrategy for SiteSectionStrategy {
    fn name(&self) -> &'static str {
        "site-sections"
    }

    fn applies(&self, doc: &Html) -> bool {
        doc.select(&CONTAINERS).next().is_some()
    }

    fn extract(&self, doc: &Html, position: &dyn Fn(ElementRef<'_>) -> usize) -> Vec<RawSection> {
        doc.select(&CONTAINERS)
            .filter(|c| !nested_container(*c))
            .map(|container| {
                let heading = container.select(&HEADINGS).next();
                let title = heading
                    .map(plain_text)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string());
                let level = heading
                    .and_then(|h| heading_level(h.value().name()))
                    .unwrap_or(2);
                let id = container
                    .value()
                    .attr("id")
                    .or_else(|| heading.and_then(|h| h.value().attr("id")))
                    .map(str::to_string);

                let blocks: Vec<String> = container
                    .select(&MARKDOWN)
                    .filter(|m| !nested_markdown(*m))
                    .map(element_markdown)
                    .filter(|b| !b.is_empty())
                    .collect();
                let body = if blocks.is_empty() {
                    element_markdown(container)
                } else {
                    blocks.join("\n\n")
                };

                RawSection {
                    body: strip_leading_title(&body, &title),
                    title,
                    level,
                    id,
                    position: position(container),
                }
            })
            .collect()
    }
}

fn nested_container(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "body-content-section")
}

fn nested_markdown(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "documentation-markdown")
}

/// Drop a first line that only repeats the section title.
fn strip_leading_title(body: &str, title: &str) -> String {
    let mut lines = body.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    if first.trim_start_matches('#').trim() == title {
        lines.collect::<Vec<_>>().join("\n").trim().to_string()
    } else {
        body.to_string()
    }
}

/// Generic layout: every heading starts a section that runs until the next
/// heading.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadingStrategy;

impl HeadingStrategy {
    fn scope(doc: &Html) -> ElementRef<'_> {
        SCOPES
            .iter()
            .find_map(|sel| {
                doc.select(sel)
                    .find(|scope| scope.select(&HEADINGS).next().is_some())
            })
            .unwrap_or_else(|| doc.root_element())
    }
}

fn starts_new_section(node: &NodeRef<'_>) -> bool {
    ElementRef::wrap(*node).is_some_and(|el| {
        heading_level(el.value().name()).is_some() || el.select(&HEADINGS).next().is_some()
    })
}

impl SectionStrategy for HeadingStrategy {
    fn name(&self) -> &'static str {
        "headings"
    }

    fn applies(&self, doc: &Html) -> bool {
        doc.select(&HEADINGS).next().is_some()
    }

    fn extract(&self, doc: &Html, position: &dyn Fn(ElementRef<'_>) -> usize) -> Vec<RawSection> {
        Self::scope(doc)
            .select(&HEADINGS)
            .filter_map(|heading| {
                let title = plain_text(heading);
                if title.is_empty() {
                    return None;
                }
                let body = nodes_markdown(heading.next_siblings().take_while(|n| !starts_new_section(n)));
                Some(RawSection {
                    level: heading_level(heading.value().name()).unwrap_or(2),
                    id: heading.value().attr("id").map(str::to_string),
                    position: position(heading),
                    title,
                    body,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_leading_title() {
        assert_eq!(strip_leading_title("### Usage\n\nRun it.", "Usage"), "Run it.");
        assert_eq!(strip_leading_title("Run it.", "Usage"), "Run it.");
        assert_eq!(strip_leading_title("", "Usage"), "");
    }

    #[test]
    fn test_heading_scope_prefers_main() {
        let doc = Html::parse_document(
            "<html><body><nav><h2>Menu</h2></nav><main><h1>Real</h1></main></body></html>",
        );
        let scope = HeadingStrategy::scope(&doc);
        assert_eq!(scope.value().name(), "main");
    }
}
