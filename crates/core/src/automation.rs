//! Automation provider abstraction.
//!
//! The orchestration logic never touches a concrete browser driver. It
//! talks to these traits, which expose exactly the primitives the core
//! calls: context/page lifecycle, lazy element-query narrowing, a generic
//! action invocation, and an assertion primitive returning
//! `{matches, errorMessage?, log?}`. A second provider can be substituted
//! without touching orchestration code.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;

/// Host-side reconstruction of a wire [`TextArg`].
///
/// [`TextArg`]: wtr_protocol::TextArg
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Substring containment (default string semantics).
    Substring(String),
    /// Whole-string equality (`exact: true`).
    Exact(String),
    /// Compiled regular expression, rebuilt from source/flags immediately
    /// before use.
    Pattern(regex::Regex),
}

/// Outcome of the provider's assertion primitive.
#[derive(Debug, Clone, Default)]
pub struct MatcherResult {
    /// Raw matcher outcome, before `isNot` inversion is applied.
    pub matches: bool,
    /// Provider-rendered failure message, when available.
    pub error_message: Option<String>,
    /// Diagnostic log lines describing what the matcher observed.
    pub log: Vec<String>,
}

/// Console listener: `(level, text)` per captured message.
pub type ConsoleListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// A lazy element query handle.
///
/// Narrowing methods are synchronous and side-effect free, mirroring the
/// provider's lazy locators: no query executes until an action or
/// assertion runs. The `Display` impl renders the query for diagnostics
/// ("most specific information available" in error reports).
pub trait AutomationHandle: Send + Sync + fmt::Display {
    /// Narrows by CSS/engine selector.
    fn locator(&self, selector: &str) -> Arc<dyn AutomationHandle>;
    /// Narrows by ARIA role with an optional accessible-name filter.
    fn get_by_role(&self, role: &str, name: Option<TextMatch>) -> Arc<dyn AutomationHandle>;
    /// Narrows by visible text.
    fn get_by_text(&self, text: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Narrows by form label.
    fn get_by_label(&self, text: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Narrows by input placeholder.
    fn get_by_placeholder(&self, text: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Narrows by image alt text.
    fn get_by_alt_text(&self, text: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Narrows by title attribute.
    fn get_by_title(&self, text: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Narrows by test-id attribute.
    fn get_by_test_id(&self, test_id: TextMatch) -> Arc<dyn AutomationHandle>;
    /// Keeps matches containing the given text and/or a match of `has`.
    fn filter(
        &self,
        has_text: Option<TextMatch>,
        has: Option<Arc<dyn AutomationHandle>>,
    ) -> Arc<dyn AutomationHandle>;
    /// Intersection with a sibling handle.
    fn and(&self, other: Arc<dyn AutomationHandle>) -> Arc<dyn AutomationHandle>;
    /// Union with a sibling handle.
    fn or(&self, other: Arc<dyn AutomationHandle>) -> Arc<dyn AutomationHandle>;
    /// The n-th match (0-based; negative indexes from the end).
    fn nth(&self, index: i64) -> Arc<dyn AutomationHandle>;
    /// The first match.
    fn first(&self) -> Arc<dyn AutomationHandle>;
    /// The last match.
    fn last(&self) -> Arc<dyn AutomationHandle>;

    /// Executes one allowlisted mutating action against the resolved
    /// element. The method name has already been validated by the caller.
    fn perform(
        &self,
        method: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, Result<Value>>;

    /// Executes one normalized matcher against the resolved element.
    ///
    /// `is_not` is forwarded so the provider can stop polling early; the
    /// returned [`MatcherResult::matches`] is still the raw outcome.
    fn assert_matcher(
        &self,
        matcher: &str,
        args: &[Value],
        is_not: bool,
        timeout: Option<Duration>,
    ) -> BoxFuture<'static, Result<MatcherResult>>;
}

/// An isolated page hosting one runner session.
pub trait AutomationPage: Send + Sync {
    /// The page-root query handle.
    fn root(&self) -> Arc<dyn AutomationHandle>;
    /// Navigates the page.
    fn goto(&self, url: &str) -> BoxFuture<'static, Result<()>>;
    /// Subscribes to the page's console-event stream.
    fn on_console(&self, listener: ConsoleListener);
    /// Closes the page.
    fn close(&self) -> BoxFuture<'static, Result<()>>;
}

/// An isolated browser context owning one or more pages.
pub trait AutomationContext: Send + Sync {
    /// Opens a new page in this context.
    fn new_page(&self) -> BoxFuture<'static, Result<Arc<dyn AutomationPage>>>;
    /// Closes the context and all its pages.
    fn close(&self) -> BoxFuture<'static, Result<()>>;
}

/// A launched automation provider.
pub trait AutomationProvider: Send + Sync {
    /// Creates a new isolated context.
    fn new_context(&self) -> BoxFuture<'static, Result<Arc<dyn AutomationContext>>>;
}
