//! Canonical Fragment Identifiers, as the desktop viewer stores them.
//!
//! A CFI here is the in-document part of an EPUB CFI: a run of steps
//! selecting element children from the document node down, then a terminal
//! `/<index>:<offset>` naming a text child (1-based over elements and text)
//! and a character offset inside it.
//!
//! ```
//! use kobo2calibre::cfi::Cfi;
//!
//! let cfi: Cfi = "epubcfi(/6/4!/2/4[chap01]/2/1:13)".parse().unwrap();
//! assert_eq!(cfi.steps, vec![2, 4, 2]);
//! assert_eq!((cfi.terminal, cfi.offset), (1, 13));
//! assert_eq!(cfi.to_string(), "/2/4/2/1:13");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::dom::{
    Document, NodeId, TextPosition, addressable_children, ancestors, element_children,
};
use crate::error::{Error, Result};

/// A parsed in-document CFI. Assertions are not retained.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cfi {
    /// Element steps, outermost first. The first selects the root element.
    pub steps: Vec<usize>,
    /// 1-based position of the target among element and text children.
    pub terminal: usize,
    /// Character offset inside the target.
    pub offset: usize,
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        write!(f, "/{}:{}", self.terminal, self.offset)
    }
}

impl FromStr for Cfi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedCfi {
            cfi: s.to_string(),
            reason: reason.to_string(),
        };

        let mut body = s.trim();
        if let Some(inner) = body
            .strip_prefix("epubcfi(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            body = inner;
        }
        // Spine indirection: keep only the in-document part
        if let Some(bang) = body.rfind('!') {
            body = &body[bang + 1..];
        }
        if body.contains(',') {
            return Err(malformed("ranges are not supported"));
        }
        let body = body
            .strip_prefix('/')
            .ok_or_else(|| malformed("must start with '/'"))?;

        let segments: Vec<&str> = body.split('/').collect();
        let Some((last, intermediate)) = segments.split_last() else {
            return Err(malformed("empty path"));
        };

        let steps = intermediate
            .iter()
            .map(|segment| parse_index(strip_assertion(segment)).ok_or_else(|| malformed("bad step")))
            .collect::<Result<Vec<_>>>()?;
        if steps.is_empty() {
            return Err(malformed("no element steps"));
        }

        let (index, offset) = last
            .split_once(':')
            .ok_or_else(|| malformed("final step has no ':<offset>'"))?;
        let terminal =
            parse_index(strip_assertion(index)).ok_or_else(|| malformed("bad final step"))?;
        let offset = strip_assertion(offset)
            .parse::<usize>()
            .map_err(|_| malformed("bad character offset"))?;

        Ok(Cfi {
            steps,
            terminal,
            offset,
        })
    }
}

/// Drop a trailing `[...]` assertion from a step.
fn strip_assertion(segment: &str) -> &str {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => &segment[..open],
        _ => segment,
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    segment.parse::<usize>().ok().filter(|&n| n > 0)
}

/// Resolve a CFI to a text node and offset.
///
/// Element steps descend through element-only children; the first must be
/// `/2`, the root element. The terminal counts element and text children
/// (comments and processing instructions are invisible) and must land on
/// text. Any out-of-range step is a [`Error::StepOutOfRange`].
pub fn decode_cfi(dom: &Document, cfi: &str) -> Result<TextPosition> {
    let parsed: Cfi = cfi.parse()?;
    resolve(dom, &parsed, cfi)
}

/// [`decode_cfi`] for an already parsed value.
pub fn resolve(dom: &Document, cfi: &Cfi, source: &str) -> Result<TextPosition> {
    if cfi.steps.first() != Some(&2) {
        return Err(Error::MalformedCfi {
            cfi: source.to_string(),
            reason: "first step must be /2".into(),
        });
    }

    let mut current = dom.document();
    for (step_number, &step) in cfi.steps.iter().enumerate() {
        if step % 2 != 0 {
            return Err(Error::MalformedCfi {
                cfi: source.to_string(),
                reason: format!("element step {step} is odd"),
            });
        }
        let index = step / 2 - 1;
        let parent = current;
        current = element_children(dom, parent)
            .nth(index)
            .ok_or_else(|| Error::StepOutOfRange {
                cfi: source.to_string(),
                step: step_number + 1,
                index: index + 1,
                available: element_children(dom, parent).count(),
            })?;
    }

    let target = addressable_children(dom, current)
        .nth(cfi.terminal - 1)
        .ok_or_else(|| Error::StepOutOfRange {
            cfi: source.to_string(),
            step: cfi.steps.len() + 1,
            index: cfi.terminal,
            available: addressable_children(dom, current).count(),
        })?;

    if !dom.is_text(target) {
        return Err(Error::MalformedTarget {
            cfi: source.to_string(),
            index: cfi.terminal,
        });
    }

    Ok(TextPosition::new(target, cfi.offset))
}

/// Build the CFI addressing `position`.
///
/// Each ancestor below the document contributes twice its 1-based position
/// among its parent's element children. The target contributes its 1-based
/// position among element and text siblings. An element target is followed
/// by `/1:<offset>`; that sibling position is not doubled, so the result is
/// not decodable back to the element.
pub fn encode_cfi(dom: &Document, position: TextPosition) -> Result<Cfi> {
    let node = position.node;
    let parent = dom.parent(node).ok_or(Error::Unaddressable(node))?;

    let mut steps = Vec::new();
    for ancestor in ancestors(dom, node).into_iter().skip(1) {
        steps.push(2 * element_position(dom, ancestor)?);
    }

    let sibling = addressable_children(dom, parent)
        .position(|child| child == node)
        .ok_or(Error::Unaddressable(node))?
        + 1;
    let terminal = if dom.is_element(node) {
        steps.push(sibling);
        1
    } else {
        sibling
    };

    Ok(Cfi {
        steps,
        terminal,
        offset: position.offset,
    })
}

fn element_position(dom: &Document, node: NodeId) -> Result<usize> {
    let parent = dom.parent(node).ok_or(Error::Unaddressable(node))?;
    element_children(dom, parent)
        .position(|child| child == node)
        .map(|p| p + 1)
        .ok_or(Error::Unaddressable(node))
}
