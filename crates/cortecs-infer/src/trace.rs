//! Tracing types for inference observability.
//!
//! These capture step-by-step traces of unification and environment
//! generation so tools can show how a type was reached. Tracing is opt-in
//! via `Unifier::enable_tracing()` / `GeneratorOptions::tracing`; nothing is
//! recorded when it is disabled.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Unification trace
// ---------------------------------------------------------------------------

/// A single step in a unification trace.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyStep {
    pub step: usize,
    pub action: UnifyAction,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// What action was taken during a unification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyAction {
    /// Types are already structurally equal.
    Identity,
    /// A free variable was bound to a non-variable type.
    Bind,
    /// A free variable was redirected to another free variable.
    Redirect,
    /// Arrow or product decomposed into component pairs.
    Decompose,
    /// An `Invalid` side absorbed the pair without binding anything.
    Absorb,
    /// Unification failed.
    Error,
}

// ---------------------------------------------------------------------------
// Generation trace
// ---------------------------------------------------------------------------

/// A single environment produced during generation.
#[derive(Debug, Clone, Serialize)]
pub struct InferStep {
    pub rule: InferRule,
    #[serde(rename = "type")]
    pub ty: String,
    pub detail: String,
    pub requirements: usize,
    pub errors: usize,
}

/// Which generation rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferRule {
    Atomic,
    Empty,
    Grouping,
    Unary,
    Binary,
    Call,
    Let,
    Return,
}
