//! Locator intermediate representation.
//!
//! The sandboxed side of the protocol never holds a live element handle.
//! Instead it builds a [`LocatorIr`]: an immutable, serializable description
//! of "find an element" - an ordered list of steps the host later folds
//! against the real automation provider.
//!
//! Every builder operation returns a *new* IR value with one appended step
//! and leaves the receiver untouched, so an IR can be reused as a nested
//! `has`/`and`/`or` operand without aliasing hazards.

use serde::{Deserialize, Serialize};

/// A text argument crossing the boundary.
///
/// Live regular-expression objects are never sent over the wire; a pattern
/// travels as its `source`/`flags` pair and is reconstructed on the host
/// side immediately before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextArg {
    /// A literal string, matched exactly or by substring per the consuming
    /// step's `exact` option.
    String { value: String },
    /// A regular expression in source/flags form.
    Regexp { source: String, flags: String },
}

impl TextArg {
    /// Literal string text.
    pub fn string(value: impl Into<String>) -> Self {
        TextArg::String {
            value: value.into(),
        }
    }

    /// Regular expression text.
    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        TextArg::Regexp {
            source: source.into(),
            flags: flags.into(),
        }
    }
}

/// One step of a locator chain.
///
/// Steps are append-only and order-significant: root queries narrow from the
/// page root, refinements and positional steps narrow the current handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LocatorStep {
    /// CSS/engine selector query.
    Locator { selector: String },
    /// ARIA role query with an optional accessible-name filter.
    GetByRole {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<TextArg>,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Visible-text query.
    GetByText {
        text: TextArg,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Form-label query.
    GetByLabel {
        text: TextArg,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Input-placeholder query.
    GetByPlaceholder {
        text: TextArg,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Image alt-text query.
    GetByAltText {
        text: TextArg,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Title-attribute query.
    GetByTitle {
        text: TextArg,
        #[serde(skip_serializing_if = "Option::is_none")]
        exact: Option<bool>,
    },
    /// Test-id attribute query.
    GetByTestId { test_id: TextArg },
    /// Refinement: keep matches containing the given text and/or a match of
    /// the nested IR.
    Filter {
        #[serde(skip_serializing_if = "Option::is_none")]
        has_text: Option<TextArg>,
        #[serde(skip_serializing_if = "Option::is_none")]
        has: Option<LocatorIr>,
    },
    /// Intersection with another locator chain.
    And { locator: LocatorIr },
    /// Union with another locator chain.
    Or { locator: LocatorIr },
    /// Positional narrowing to the n-th match (0-based, negative from end).
    Nth { index: i64 },
    /// Positional narrowing to the first match.
    First,
    /// Positional narrowing to the last match.
    Last,
}

/// An immutable locator chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorIr {
    steps: Vec<LocatorStep>,
}

impl LocatorIr {
    /// Starts a chain from a selector query.
    pub fn locator(selector: impl Into<String>) -> Self {
        Self::root(LocatorStep::Locator {
            selector: selector.into(),
        })
    }

    /// Starts a chain from an ARIA role query.
    pub fn get_by_role(role: impl Into<String>, name: Option<TextArg>, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByRole {
            role: role.into(),
            name,
            exact,
        })
    }

    /// Starts a chain from a visible-text query.
    pub fn get_by_text(text: TextArg, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByText { text, exact })
    }

    /// Starts a chain from a form-label query.
    pub fn get_by_label(text: TextArg, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByLabel { text, exact })
    }

    /// Starts a chain from an input-placeholder query.
    pub fn get_by_placeholder(text: TextArg, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByPlaceholder { text, exact })
    }

    /// Starts a chain from an image alt-text query.
    pub fn get_by_alt_text(text: TextArg, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByAltText { text, exact })
    }

    /// Starts a chain from a title-attribute query.
    pub fn get_by_title(text: TextArg, exact: Option<bool>) -> Self {
        Self::root(LocatorStep::GetByTitle { text, exact })
    }

    /// Starts a chain from a test-id query.
    pub fn get_by_test_id(test_id: TextArg) -> Self {
        Self::root(LocatorStep::GetByTestId { test_id })
    }

    fn root(step: LocatorStep) -> Self {
        Self { steps: vec![step] }
    }

    /// The ordered steps of this chain.
    pub fn steps(&self) -> &[LocatorStep] {
        &self.steps
    }

    /// Returns a new chain with `step` appended; `self` is unchanged.
    pub fn append(&self, step: LocatorStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// Appends a nested selector query.
    pub fn then_locator(&self, selector: impl Into<String>) -> Self {
        self.append(LocatorStep::Locator {
            selector: selector.into(),
        })
    }

    /// Appends a text/containment refinement.
    pub fn filter(&self, has_text: Option<TextArg>, has: Option<LocatorIr>) -> Self {
        self.append(LocatorStep::Filter { has_text, has })
    }

    /// Appends an intersection with another chain.
    pub fn and(&self, locator: LocatorIr) -> Self {
        self.append(LocatorStep::And { locator })
    }

    /// Appends a union with another chain.
    pub fn or(&self, locator: LocatorIr) -> Self {
        self.append(LocatorStep::Or { locator })
    }

    /// Appends positional narrowing to the n-th match.
    pub fn nth(&self, index: i64) -> Self {
        self.append(LocatorStep::Nth { index })
    }

    /// Appends positional narrowing to the first match.
    pub fn first(&self) -> Self {
        self.append(LocatorStep::First)
    }

    /// Appends positional narrowing to the last match.
    pub fn last(&self) -> Self {
        self.append(LocatorStep::Last)
    }
}
