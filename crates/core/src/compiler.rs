//! Host-side locator compiler and remote-control execution.
//!
//! The sandboxed side describes element work as pure data (a [`LocatorIr`]
//! plus a [`BrowserRpcRequest`]); this module folds that description
//! against a live [`AutomationHandle`] and executes it. Nested `has`,
//! `and`, and `or` operands compile recursively into independent handles.
//! Method names are checked against the shared allowlists before anything
//! touches the provider: an unsupported method fails fast with a named
//! error rather than silently doing nothing.

use std::sync::Arc;
use std::time::Duration;

use regex::RegexBuilder;
use serde_json::Value;
use tracing::debug;

use wtr_protocol::rpc::{is_expect_method, is_locator_method};
use wtr_protocol::{BrowserRpcRequest, LocatorIr, LocatorStep, RpcKind, TextArg};

use crate::automation::{AutomationHandle, AutomationPage, TextMatch};
use crate::error::{Error, Result};

/// Reconstructs a wire text argument host-side.
///
/// Regexp sources were serialized as `source`/`flags`; they are rebuilt
/// here, immediately before use. JavaScript flags without an equivalent
/// (`g`, `u`, `y`) only affect iteration semantics and are ignored.
fn text_match(arg: &TextArg, exact: Option<bool>) -> Result<TextMatch> {
    match arg {
        TextArg::String { value } => {
            if exact == Some(true) {
                Ok(TextMatch::Exact(value.clone()))
            } else {
                Ok(TextMatch::Substring(value.clone()))
            }
        }
        TextArg::Regexp { source, flags } => {
            let regex = RegexBuilder::new(source)
                .case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .dot_matches_new_line(flags.contains('s'))
                .build()?;
            Ok(TextMatch::Pattern(regex))
        }
    }
}

fn apply_step(
    step: &LocatorStep,
    current: &Arc<dyn AutomationHandle>,
    root: &Arc<dyn AutomationHandle>,
) -> Result<Arc<dyn AutomationHandle>> {
    let next = match step {
        LocatorStep::Locator { selector } => current.locator(selector),
        LocatorStep::GetByRole { role, name, exact } => {
            let name = match name {
                Some(arg) => Some(text_match(arg, *exact)?),
                None => None,
            };
            current.get_by_role(role, name)
        }
        LocatorStep::GetByText { text, exact } => current.get_by_text(text_match(text, *exact)?),
        LocatorStep::GetByLabel { text, exact } => current.get_by_label(text_match(text, *exact)?),
        LocatorStep::GetByPlaceholder { text, exact } => {
            current.get_by_placeholder(text_match(text, *exact)?)
        }
        LocatorStep::GetByAltText { text, exact } => {
            current.get_by_alt_text(text_match(text, *exact)?)
        }
        LocatorStep::GetByTitle { text, exact } => current.get_by_title(text_match(text, *exact)?),
        LocatorStep::GetByTestId { test_id } => {
            current.get_by_test_id(text_match(test_id, Some(true))?)
        }
        LocatorStep::Filter { has_text, has } => {
            let has_text = match has_text {
                Some(arg) => Some(text_match(arg, None)?),
                None => None,
            };
            // The `has` operand is an independent chain anchored at the
            // page root, not at the current handle.
            let has = match has {
                Some(ir) => Some(compile_locator(ir, root)?),
                None => None,
            };
            current.filter(has_text, has)
        }
        LocatorStep::And { locator } => current.and(compile_locator(locator, root)?),
        LocatorStep::Or { locator } => current.or(compile_locator(locator, root)?),
        LocatorStep::Nth { index } => current.nth(*index),
        LocatorStep::First => current.first(),
        LocatorStep::Last => current.last(),
    };
    Ok(next)
}

/// Folds a locator chain against `root`, returning the narrowed handle.
pub fn compile_locator(
    ir: &LocatorIr,
    root: &Arc<dyn AutomationHandle>,
) -> Result<Arc<dyn AutomationHandle>> {
    let mut handle = Arc::clone(root);
    for step in ir.steps() {
        handle = apply_step(step, &handle, root)?;
    }
    Ok(handle)
}

/// Executes one remote-control request against the session's page.
///
/// For `expect` requests a mismatch is reported as an error carrying the
/// provider's diagnostics, never as a silent false return - the caller
/// could not otherwise distinguish "matcher ran and failed" from "matcher
/// crashed".
pub async fn execute_rpc(
    request: &BrowserRpcRequest,
    page: &Arc<dyn AutomationPage>,
) -> Result<Value> {
    let timeout = request.timeout.map(Duration::from_millis);
    let root = page.root();

    match request.kind {
        RpcKind::Locator => {
            if !is_locator_method(&request.method) {
                return Err(Error::UnsupportedMethod {
                    kind: "locator",
                    method: request.method.clone(),
                });
            }
            let handle = compile_locator(&request.locator, &root)?;
            debug!(id = %request.id, method = %request.method, "performing locator action");
            handle.perform(&request.method, &request.args, timeout).await
        }
        RpcKind::Expect => {
            if !is_expect_method(&request.method) {
                return Err(Error::UnsupportedMethod {
                    kind: "expect",
                    method: request.method.clone(),
                });
            }
            let handle = compile_locator(&request.locator, &root)?;
            let is_not = request.is_not.unwrap_or(false);
            let outcome = handle
                .assert_matcher(&request.method, &request.args, is_not, timeout)
                .await?;

            // `matches` is the raw matcher outcome; the expectation fails
            // when it coincides with the inversion flag.
            if outcome.matches == is_not {
                let message = outcome.error_message.unwrap_or_else(|| {
                    format!(
                        "expect{}.{} failed",
                        if is_not { ".not" } else { "" },
                        request.method
                    )
                });
                return Err(Error::ExpectFailed {
                    message,
                    log: outcome.log,
                });
            }
            Ok(Value::Null)
        }
    }
}
