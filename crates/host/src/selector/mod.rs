//! A small selector engine for in-memory documents.
//!
//! Supported grammar:
//! - type (`div`), universal (`*`), class (`.item`), id (`#main`)
//! - attribute presence and equality (`[data-role]`, `[data-role="menu"]`)
//! - descendant, child (`>`), next-sibling (`+`) and subsequent-sibling (`~`) combinators
//! - comma-separated selector lists
//!
//! Matching is right-to-left with backtracking over combinators.

mod matcher;
mod parser;

use core::fmt;

pub use matcher::{matches_complex, matches_compound, matches_list};
pub use parser::{parse_complex, parse_list};

/// Tree access needed to match selectors. Implement this for a DOM view.
pub trait ElementAdapter {
    type Handle: Copy + Eq;

    /// Parent node, if any. May be a non-element (the document node).
    fn parent(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Previous sibling element, skipping non-elements.
    fn previous_sibling_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// False for the document node and other non-elements; they never match.
    fn is_element(&self, element: Self::Handle) -> bool;

    /// Tag name, ASCII lowercase.
    fn tag_name(&self, element: Self::Handle) -> &str;

    /// Attribute value, if present.
    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;

    /// True if the whitespace-separated `class` attribute contains `class`.
    fn has_class(&self, element: Self::Handle, class: &str) -> bool {
        self.attr(element, "class")
            .is_some_and(|list| list.split_ascii_whitespace().any(|token| token == class))
    }
}

/// One simple selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Universal,
    Type(String),
    Class(String),
    Id(String),
    Attribute { name: String, value: Option<String> },
}

/// Simple selectors that must all match the same element.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

/// Relationship between two compounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

/// A subject compound plus the chain of compounds to its left.
///
/// `ancestry` is stored right-to-left: `ancestry[0]` relates the subject to
/// the compound immediately left of it.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub subject: CompoundSelector,
    pub ancestry: Vec<(Combinator, CompoundSelector)>,
}

/// Comma-separated complex selectors.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

/// A selector that could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorError {
    pub selector: String,
    pub position: usize,
    pub reason: &'static str,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "invalid selector {:?} at byte {}: {}",
            self.selector, self.position, self.reason
        )
    }
}

impl std::error::Error for SelectorError {}

/// True if `selector` is a single complex selector this engine understands.
///
/// Plain selectors can be joined into one combined query and the results
/// partitioned again with `matches`.
pub fn is_plain(selector: &str) -> bool {
    parse_list(selector).is_ok_and(|list| list.selectors.len() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_selectors() {
        assert!(is_plain("div"));
        assert!(is_plain("ul > li.item"));
        assert!(is_plain("[data-role='menu'] .entry"));
        assert!(!is_plain("li, a"));
        assert!(!is_plain(""));
        assert!(!is_plain("a:hover"));
    }

    #[test]
    fn errors_point_at_the_offending_byte() {
        let err = parse_list("div > ").err();
        assert!(err.is_some_and(|error| error.position == 6));
    }
}
