//! Right-to-left selector matching.

use super::{Combinator, ComplexSelector, CompoundSelector, ElementAdapter, SelectorList, SimpleSelector};

/// True if every simple selector in `compound` matches `element`.
pub fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    if !adapter.is_element(element) {
        return false;
    }
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(tag) => adapter.tag_name(element) == tag,
        SimpleSelector::Class(class) => adapter.has_class(element, class),
        SimpleSelector::Id(id) => adapter.attr(element, "id") == Some(id.as_str()),
        SimpleSelector::Attribute { name, value } => match (adapter.attr(element, name), value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        },
    })
}

/// True if `element` is the subject of `selector`.
pub fn matches_complex<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    selector: &ComplexSelector,
) -> bool {
    matches_compound(adapter, element, &selector.subject)
        && matches_ancestry(adapter, element, &selector.ancestry)
}

/// True if `element` matches any selector of the list.
pub fn matches_list<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector| matches_complex(adapter, element, selector))
}

/// Match the remaining `(combinator, compound)` chain starting from an
/// element that already matched the compound to the right.
fn matches_ancestry<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    chain: &[(Combinator, CompoundSelector)],
) -> bool {
    let Some(((combinator, compound), rest)) = chain.split_first() else {
        return true;
    };
    match combinator {
        Combinator::Child => adapter.parent(element).is_some_and(|parent| {
            matches_compound(adapter, parent, compound) && matches_ancestry(adapter, parent, rest)
        }),
        Combinator::Descendant => {
            let mut cursor = adapter.parent(element);
            while let Some(ancestor) = cursor {
                if matches_compound(adapter, ancestor, compound)
                    && matches_ancestry(adapter, ancestor, rest)
                {
                    return true;
                }
                cursor = adapter.parent(ancestor);
            }
            false
        }
        Combinator::NextSibling => {
            adapter
                .previous_sibling_element(element)
                .is_some_and(|sibling| {
                    matches_compound(adapter, sibling, compound)
                        && matches_ancestry(adapter, sibling, rest)
                })
        }
        Combinator::SubsequentSibling => {
            let mut cursor = adapter.previous_sibling_element(element);
            while let Some(sibling) = cursor {
                if matches_compound(adapter, sibling, compound)
                    && matches_ancestry(adapter, sibling, rest)
                {
                    return true;
                }
                cursor = adapter.previous_sibling_element(sibling);
            }
            false
        }
    }
}
