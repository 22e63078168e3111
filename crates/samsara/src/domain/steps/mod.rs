//! Steps - Records, Contexts, and the Values Between Them
//!
//! # The Step Lifecycle
//!
//! ```text
//!            bind              user fn returns
//!   Record ────────▶ running ─────────────────▶ Context
//!   (mutable,          │  ▲                     (persisted on the
//!    on the stack)     │  │ tailcall             timeline, indexed
//!                      ▼  │                      by the pool)
//!                   suspended
//!              (a nested bind runs)
//! ```
//!
//! A [`Record`](record::Record) is the mutable state of a step in flight; it
//! lives on the engine's record stack. When the user function returns, the
//! record completes into a [`ContextNode`](context::ContextNode): the
//! persisted recipe (function + inputs) and bookkeeping (ticks, times, bytes)
//! needed to evict and later replay the step's value.
//!
//! Values themselves live in [`ValueCell`](handle::ValueCell)s: shells whose
//! byte payload can be taken away and restored without disturbing the
//! [`Handle`](handle::Handle)s that point at them.
//!
//! Both sums are closed; per-variant behaviour is pattern-matched, not
//! dispatched through open polymorphism.

mod context;
mod handle;
mod record;

pub use context::{Context, ContextNode, FullContext, Phantom, RootContext};
pub use handle::{Handle, ValueCell};
pub use record::{BindFn, HeadRecord, HeadState, Record, ValueRecord, Yield};
