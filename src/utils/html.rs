// src/utils/html.rs

//! HTML helpers built on `scraper`.
//!
//! `scraper` trees are read-only, so rewriting is done by serialising the
//! tree again while a visitor decides, element by element, whether to keep,
//! drop, or re-attribute it.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};

/// Parse a CSS selector, mapping failures into [`AppError::Selector`].
pub fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Decision for one element during [`render_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Emit the element unchanged.
    Keep,
    /// Skip the element and its subtree.
    Drop,
    /// Emit the element with these attributes instead of its own.
    Attributes(Vec<(String, String)>),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Serialise the children of `root`, consulting `visit` for every element.
pub fn render_children<F>(root: ElementRef<'_>, visit: &mut F) -> String
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    let mut out = String::new();
    for child in root.children() {
        write_node(child, visit, &mut out, false);
    }
    out
}

/// Serialise the `<body>` of a document (or the whole tree when there is none).
pub fn render_body<F>(document: &Html, visit: &mut F) -> String
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    let body = selector("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());

    match body {
        Some(body) => render_children(body, visit),
        None => {
            let mut out = String::new();
            for child in document.tree.root().children() {
                write_node(child, visit, &mut out, false);
            }
            out
        }
    }
}

fn write_node<F>(node: NodeRef<'_, Node>, visit: &mut F, out: &mut String, raw: bool)
where
    F: FnMut(ElementRef<'_>) -> NodeAction,
{
    match node.value() {
        Node::Text(text) => {
            if raw {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Doctype(doctype) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(doctype.name());
            out.push('>');
        }
        Node::Element(_) => {
            let Some(element) = ElementRef::wrap(node) else {
                return;
            };
            let attrs: Vec<(String, String)> = match visit(element) {
                NodeAction::Drop => return,
                NodeAction::Keep => element
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                NodeAction::Attributes(attrs) => attrs,
            };

            let name = element.value().name();
            out.push('<');
            out.push_str(name);
            for (key, value) in &attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }

            let raw = RAW_TEXT_ELEMENTS.contains(&name);
            for child in node.children() {
                write_node(child, visit, out, raw);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {
            for child in node.children() {
                write_node(child, visit, out, raw);
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Collapse whitespace in an element's text content.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keeps_markup() {
        let doc = Html::parse_document(
            r#"<html><body><p class="a">Tom &amp; Jerry</p><br><img src="x.png"></body></html>"#,
        );
        let out = render_body(&doc, &mut |_| NodeAction::Keep);
        assert_eq!(
            out,
            r#"<p class="a">Tom &amp; Jerry</p><br><img src="x.png">"#
        );
    }

    #[test]
    fn test_render_drops_and_rewrites() {
        let doc = Html::parse_document(
            r#"<body><div id="gone"><p>hidden</p></div><a href="old.html">link</a></body>"#,
        );
        let out = render_body(&doc, &mut |el| match el.value().name() {
            "div" => NodeAction::Drop,
            "a" => NodeAction::Attributes(vec![("href".into(), "/new".into())]),
            _ => NodeAction::Keep,
        });
        assert_eq!(out, r#"<a href="/new">link</a>"#);
    }

    #[test]
    fn test_script_is_not_escaped() {
        let doc = Html::parse_document("<body><script>if (a < b) {}</script></body>");
        let out = render_body(&doc, &mut |_| NodeAction::Keep);
        assert_eq!(out, "<script>if (a < b) {}</script>");
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let doc = Html::parse_fragment("<span>  Space \n  Home </span>");
        let sel = selector("span").unwrap();
        let span = doc.select(&sel).next().unwrap();
        assert_eq!(element_text(span), "Space Home");
    }
}
