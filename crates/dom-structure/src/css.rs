//! CSS selector matching over the arena, backed by the `selectors` crate.
//!
//! Parsing and matching follow the browser engine; only pseudo-classes that
//! depend on user state (`:hover`, `:focus`, ...) are rejected.

use std::fmt;

use cssparser::ToCss;
use precomputed_hash::PrecomputedHash;
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{
    self, ElementSelectorFlags, MatchingContext, MatchingForInvalidation, MatchingMode,
    NeedsSelectorFlags, QuirksMode, SelectorCaches,
};
use selectors::parser::{self, ParseRelative, SelectorParseErrorKind};
use selectors::{Element, OpaqueElement, SelectorList};
use waypoint_core_types::NodeId;

use crate::errors::QueryError;
use crate::tree::{Arena, NodeData};

/// A parsed, comma-separated selector list.
pub(crate) struct CssSelector {
    source: String,
    list: SelectorList<Simple>,
}

impl fmt::Debug for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CssSelector").field(&self.source).finish()
    }
}

pub(crate) fn parse(input: &str) -> Result<CssSelector, QueryError> {
    let mut parser_input = cssparser::ParserInput::new(input);
    let mut css = cssparser::Parser::new(&mut parser_input);
    SelectorList::parse(&Parser, &mut css, ParseRelative::No)
        .map(|list| CssSelector {
            source: input.to_string(),
            list,
        })
        .map_err(|err| {
            QueryError::css(
                input,
                format!("{:?} at column {}", err.kind, err.location.column),
            )
        })
}

impl CssSelector {
    /// Whether `node` matches; `scope` is the element `:scope` refers to.
    pub fn matches(&self, arena: &Arena, node: NodeId, scope: Option<NodeId>) -> bool {
        let Some(element) = ArenaElement::new(arena, node) else {
            return false;
        };
        let mut caches = SelectorCaches::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut caches,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            MatchingForInvalidation::No,
        );
        context.scope_element = scope
            .and_then(|id| ArenaElement::new(arena, id))
            .map(|scope| scope.opaque());
        self.list
            .slice()
            .iter()
            .any(|selector| matching::matches_selector(selector, 0, None, &element, &mut context))
    }
}

#[derive(Clone, Copy, Debug)]
struct Parser;

impl<'i> parser::Parser<'i> for Parser {
    type Impl = Simple;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_is_and_where(&self) -> bool {
        true
    }

    fn parse_has(&self) -> bool {
        true
    }

    fn parse_nth_child_of(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Simple;

impl parser::SelectorImpl for Simple {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssString;
    type Identifier = CssName;
    type LocalName = CssName;
    type NamespacePrefix = CssName;
    type NamespaceUrl = CssNamespace;
    type BorrowedNamespaceUrl = CssNamespace;
    type BorrowedLocalName = CssName;
    type NonTSPseudoClass = NonTSPseudoClass;
    type PseudoElement = PseudoElement;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CssString(String);

impl From<&str> for CssString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssString {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_string(&self.0, dest)
    }
}

/// Tag names, ids, classes and attribute names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CssName(String);

impl From<&str> for CssName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl ToCss for CssName {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_identifier(&self.0, dest)
    }
}

impl PrecomputedHash for CssName {
    fn precomputed_hash(&self) -> u32 {
        fnv1a(&self.0)
    }
}

/// Every arena element lives in the empty namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CssNamespace(String);

impl PrecomputedHash for CssNamespace {
    fn precomputed_hash(&self) -> u32 {
        fnv1a(&self.0)
    }
}

fn fnv1a(value: &str) -> u32 {
    value.bytes().fold(0x811c_9dc5, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NonTSPseudoClass {}

impl parser::NonTSPseudoClass for NonTSPseudoClass {
    type Impl = Simple;

    fn is_active_or_hover(&self) -> bool {
        false
    }

    fn is_user_action_state(&self) -> bool {
        false
    }
}

impl ToCss for NonTSPseudoClass {
    fn to_css<W: fmt::Write>(&self, _dest: &mut W) -> fmt::Result {
        match *self {}
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PseudoElement {}

impl parser::PseudoElement for PseudoElement {
    type Impl = Simple;
}

impl ToCss for PseudoElement {
    fn to_css<W: fmt::Write>(&self, _dest: &mut W) -> fmt::Result {
        match *self {}
    }
}

/// Borrowed view of one arena node, as the matcher sees it.
#[derive(Clone, Copy)]
struct ArenaElement<'a> {
    arena: &'a Arena,
    id: NodeId,
    data: &'a NodeData,
}

impl fmt::Debug for ArenaElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.data.tag, self.id)
    }
}

impl<'a> ArenaElement<'a> {
    fn new(arena: &'a Arena, id: NodeId) -> Option<Self> {
        arena.get(id).map(|data| Self { arena, id, data })
    }

    fn sibling(&self, offset: isize) -> Option<Self> {
        let parent = self.data.parent?;
        let siblings = self.arena.children(parent);
        let index = siblings.iter().position(|child| *child == self.id)?;
        let target = index.checked_add_signed(offset)?;
        siblings
            .get(target)
            .and_then(|id| ArenaElement::new(self.arena, *id))
    }
}

impl Element for ArenaElement<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.data)
    }

    fn parent_element(&self) -> Option<Self> {
        self.data
            .parent
            .and_then(|parent| ArenaElement::new(self.arena, parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.sibling(-1)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.sibling(1)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.data
            .children
            .first()
            .and_then(|child| ArenaElement::new(self.arena, *child))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &CssName) -> bool {
        self.data.tag == name.0
    }

    fn has_namespace(&self, namespace: &CssNamespace) -> bool {
        namespace.0.is_empty()
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.data.tag == other.data.tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssNamespace>,
        local_name: &CssName,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if matches!(*ns, NamespaceConstraint::Specific(url) if !url.0.is_empty()) {
            return false;
        }
        self.data
            .attributes
            .iter()
            .any(|(name, value)| *name == local_name.0 && operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        match *pc {}
    }

    fn match_pseudo_element(
        &self,
        pe: &PseudoElement,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        match *pe {}
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        self.data.tag == "a" && self.data.attr("href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &CssName, case_sensitivity: CaseSensitivity) -> bool {
        self.data
            .attr("id")
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssName, case_sensitivity: CaseSensitivity) -> bool {
        self.data.attr("class").is_some_and(|value| {
            value
                .split_whitespace()
                .any(|token| case_sensitivity.eq(name.0.as_bytes(), token.as_bytes()))
        })
    }

    fn has_custom_state(&self, _name: &CssName) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssName) -> Option<CssName> {
        None
    }

    fn is_part(&self, _name: &CssName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.data.children.is_empty() && self.data.text.is_empty()
    }

    fn is_root(&self) -> bool {
        self.id == self.arena.root()
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}
