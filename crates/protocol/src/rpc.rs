//! Remote-control RPC request shape and method allowlists.
//!
//! The sandboxed side issues [`BrowserRpcRequest`]s to act on or assert
//! about elements it can only describe as a [`LocatorIr`]. The allowlists
//! below are shared verbatim between both sides: a method not on the list
//! fails fast with a named "not supported" error rather than silently
//! doing nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locator::LocatorIr;

/// Mutating locator actions the host will execute.
pub const LOCATOR_METHODS: &[&str] = &[
    "click",
    "dblclick",
    "fill",
    "clear",
    "hover",
    "press",
    "check",
    "uncheck",
    "focus",
    "blur",
    "scrollIntoViewIfNeeded",
    "waitFor",
    "dispatchEvent",
    "selectOption",
    "setInputFiles",
];

/// Read-only element assertions the host will execute.
pub const EXPECT_METHODS: &[&str] = &[
    "toBeVisible",
    "toBeHidden",
    "toBeEnabled",
    "toBeDisabled",
    "toBeChecked",
    "toBeAttached",
    "toBeEditable",
    "toBeFocused",
    "toBeEmpty",
    "toBeInViewport",
    "toHaveText",
    "toContainText",
    "toHaveValue",
    "toHaveId",
    "toHaveClass",
    "toContainClass",
    "toHaveAttribute",
    "toHaveCSS",
    "toHaveJSProperty",
    "toHaveCount",
];

/// Returns `true` if `method` is an allowlisted locator action.
pub fn is_locator_method(method: &str) -> bool {
    LOCATOR_METHODS.contains(&method)
}

/// Returns `true` if `method` is an allowlisted element assertion.
pub fn is_expect_method(method: &str) -> bool {
    EXPECT_METHODS.contains(&method)
}

/// Which family of remote control a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcKind {
    /// A mutating element action.
    Locator,
    /// A read-only element assertion.
    Expect,
}

/// A remote-control request from a sandboxed runner.
///
/// `testPath` and `runId` identify which isolated session must service the
/// request and let the host reject requests from an already-superseded run.
/// `testPath` is mandatory on the wire; it is modeled as an `Option` so its
/// absence surfaces as a protocol-level error instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserRpcRequest {
    /// Opaque request id.
    pub id: String,
    /// Test file whose session must service the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_path: Option<String>,
    /// Execution epoch the issuing run belongs to.
    pub run_id: u64,
    /// Locator action or expect assertion.
    pub kind: RpcKind,
    /// Element description to compile against the live provider.
    pub locator: LocatorIr,
    /// Allowlisted method name.
    pub method: String,
    /// Method arguments as free-form JSON.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Inverts the expected truth value of an `expect` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_not: Option<bool>,
    /// Per-request budget in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}
