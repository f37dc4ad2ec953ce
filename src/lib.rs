//! # tracegram - Grammar Compression for Execution Traces
//!
//! An online grammar-induction engine for dynamic trace collection: an
//! arbitrarily long stream of observed invocation events is compressed, one
//! event at a time, into a compact hierarchical grammar.
//!
//! Two structural constraints hold after every single append:
//! 1. **Digram Uniqueness**: no pair of adjacent symbols occurs at more than
//!    one location in the grammar
//! 2. **Rule Utility**: every rule is referenced at least twice
//!
//! On top of rule induction, consecutive identical events are folded into
//! per-position occurrence counts, so tight loops never manufacture rules.
//!
//! ## Example
//!
//! ```
//! use tracegram::{TraceEvent, TraceGrammar};
//!
//! # fn main() -> Result<(), tracegram::MalformedEvent> {
//! let mut grammar = TraceGrammar::new();
//! for member in ["login", "loadCart", "login", "loadCart"] {
//!     grammar.append(TraceEvent::new("shop.CheckoutController", member, vec![]))?;
//! }
//!
//! // The repeated pair became a rule...
//! assert_eq!(grammar.rule_count(), 1);
//!
//! // ...and expansion reproduces the original sequence.
//! let replayed: Vec<&str> = grammar.iter().map(|e| e.member_name.as_str()).collect();
//! assert_eq!(replayed, ["login", "loadCart", "login", "loadCart"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Performance
//!
//! - Amortized O(1) work per appended event
//! - Grammar size grows sub-linearly for repetitive traces
//! - Arena storage with generational indices (SlotMap), no pointer graphs

mod error;
mod event;
mod grammar;
mod id_gen;
mod iter;
mod rules;
mod snapshot;
mod symbol;
mod trace;
mod validate;

#[cfg(test)]
mod tests;

pub use error::{InvariantViolation, MalformedEvent, SnapshotError};
pub use event::TraceEvent;
pub use iter::TraceIter;
pub use snapshot::{CompressedTrace, Content, ReducedTraceElement, SnapshotIter};
pub use trace::{CompressionStats, TraceGrammar};
pub use validate::validate;
