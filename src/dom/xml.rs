//! Structure-preserving XHTML parser built on quick-xml.
//!
//! Unlike an HTML5 tree builder this never inserts implied elements or drops
//! whitespace, so positional addresses computed against the source markup
//! stay valid. Returns an error for markup that is not well-formed; callers
//! fall back to [`super::parse_html`].

use html5ever::{LocalName, QualName, ns};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Attribute, Document, NodeId};
use crate::error::{Error, Result};

/// Parse well-formed XHTML into a [`Document`].
pub fn parse_xhtml(content: &str) -> Result<Document> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut dom = Document::new();
    let mut stack: Vec<NodeId> = vec![dom.document()];

    loop {
        let parent = *stack.last().unwrap_or(&dom.document());
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let element = create_element(&mut dom, &e);
                dom.append(parent, element);
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = create_element(&mut dom, &e);
                dom.append(parent, element);
            }
            Ok(Event::End(_)) => {
                if stack.len() <= 1 {
                    return Err(Error::InvalidEpub("unbalanced end tag".into()));
                }
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                let text = String::from_utf8_lossy(e.as_ref());
                if parent != dom.document() {
                    dom.append_text(parent, &text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                let resolved = resolve_entity(&entity).unwrap_or_else(|| format!("&{entity};"));
                dom.append_text(parent, &resolved);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref());
                dom.append_text(parent, &text);
            }
            Ok(Event::Comment(e)) => {
                let comment = dom.create_comment(String::from_utf8_lossy(e.as_ref()).into_owned());
                dom.append(parent, comment);
            }
            Ok(Event::PI(e)) => {
                let pi = dom.create_pi(String::from_utf8_lossy(e.as_ref()).into_owned());
                dom.append(parent, pi);
            }
            Ok(Event::Decl(e)) => {
                let pi = dom.create_pi(String::from_utf8_lossy(e.as_ref()).into_owned());
                dom.append(parent, pi);
            }
            Ok(Event::DocType(e)) => {
                let raw = String::from_utf8_lossy(e.as_ref());
                let name = raw.split_whitespace().next().unwrap_or_default().to_string();
                let doctype = dom.create_doctype(name);
                dom.append(parent, doctype);
            }
            Ok(Event::Eof) => break,
            #[allow(unreachable_patterns)]
            Ok(_) => {}
            Err(e) => return Err(Error::Xml(e)),
        }
    }

    if stack.len() > 1 {
        return Err(Error::InvalidEpub("unclosed element at end of document".into()));
    }
    if dom.root_element().is_none() {
        return Err(Error::InvalidEpub("no root element".into()));
    }

    Ok(dom)
}

fn create_element(dom: &mut Document, e: &BytesStart<'_>) -> NodeId {
    let local = String::from_utf8_lossy(local_name(e.name().as_ref())).to_ascii_lowercase();
    let name = QualName::new(None, ns!(html), LocalName::from(local.as_str()));

    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(local_name(attr.key.as_ref())).into_owned();
            let raw = String::from_utf8_lossy(attr.value.as_ref());
            Attribute {
                name: QualName::new(None, ns!(), LocalName::from(key.as_str())),
                value: unescape(&raw),
            }
        })
        .collect();

    dom.create_element(name, attrs)
}

/// Extract local name from namespaced XML name (e.g., "epub:type" -> "type").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve entity references inside an attribute value.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) => match resolve_entity(&after[..semi]) {
                Some(resolved) => {
                    out.push_str(&resolved);
                    rest = &after[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = after;
                }
            },
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve XML and common XHTML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => "\u{a0}",
        "shy" => "\u{ad}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "copy" => "\u{a9}",
        _ => "",
    };
    if !named.is_empty() {
        return Some(named.to_string());
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>One</title></head>
<body>
  <p id="p1">Don&apos;t&#160;stop &amp; <em>go</em>.</p>
  <!-- comment -->
  <table><tr><td>cell</td></tr></table>
</body>
</html>"#;

    #[test]
    fn test_preserves_structure() {
        let dom = parse_xhtml(CHAPTER).unwrap();

        let doc_children: Vec<_> = dom.children(dom.document()).collect();
        // xml decl, doctype, html; whitespace outside the root is dropped
        assert_eq!(doc_children.len(), 3);
        assert_eq!(
            dom.element_name(dom.root_element().unwrap()).unwrap().as_ref(),
            "html"
        );

        // No implied tbody is inserted
        let tr = dom.find_by_tag("tr").unwrap();
        let table = dom.find_by_tag("table").unwrap();
        assert_eq!(dom.parent(tr), Some(table));
        assert!(dom.find_by_tag("tbody").is_none());

        // Whitespace text nodes survive between body children
        let body = dom.body().unwrap();
        let first = dom.children(body).next().unwrap();
        assert_eq!(dom.text_content(first), Some("\n  "));
    }

    #[test]
    fn test_entities_merge_into_one_text_node() {
        let dom = parse_xhtml(CHAPTER).unwrap();
        let p = dom.find_by_tag("p").unwrap();
        let text = dom.children(p).next().unwrap();
        assert_eq!(dom.text_content(text), Some("Don't\u{a0}stop & "));
        assert_eq!(dom.element_id(p), Some("p1"));
    }

    #[test]
    fn test_malformed_is_rejected() {
        assert!(parse_xhtml("<html><body><p>open</body></html>").is_err());
        assert!(parse_xhtml("<html><body><p>open").is_err());
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("#8217"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("#x41"), Some("A".to_string()));
        assert_eq!(resolve_entity("hellip"), Some("\u{2026}".to_string()));
        assert_eq!(resolve_entity("bogus"), None);
    }

    #[test]
    fn test_unescape_attribute() {
        assert_eq!(unescape("a&amp;b"), "a&b");
        assert_eq!(unescape("5 &lt 6"), "5 &lt 6");
        assert_eq!(unescape("x&unknown;y"), "x&unknown;y");
    }
}
