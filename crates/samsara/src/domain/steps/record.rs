//! Records - Steps In Flight
//!
//! # State Machine
//!
//! ```text
//!            push_record            user fn returns
//!    INIT ───────────────▶ RUNNING ────────────────▶ COMPLETED
//!                      │         │
//!                      │ nested  │ tailcall
//!                      ▼ bind    ▼
//!                  SUSPENDED   RUNNING (same frame)
//! ```
//!
//! INIT is a record that has been constructed but not pushed; COMPLETED is a
//! record that has been popped. Only RUNNING and SUSPENDED are observable on
//! the stack, so those are the states a record carries. SUSPENDED is entered
//! when a nested bind starts and left exactly once, when that child
//! completes.
//!
//! Completing the root, resuming a record that is not suspended, and
//! tailcalling anything but a running head are logic faults and panic.

use std::fmt;
use std::rc::Rc;

use crate::domain::clock::Time;
use crate::domain::timeline::Tock;

use super::handle::{Handle, ValueCell};

/// A recorded step body: pure function from input payloads to an outcome.
pub type BindFn = Rc<dyn Fn(&[&[u8]]) -> Yield>;

/// What a step body hands back to the engine.
pub enum Yield {
    /// A plain output value; the step completes.
    Value(Vec<u8>),

    /// Continue this same step with a new body and inputs, without nesting.
    Tailcall {
        /// Replacement body.
        f: BindFn,
        /// Replacement inputs.
        inputs: Vec<Handle>,
    },
}

impl fmt::Debug for Yield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yield::Value(v) => f.debug_tuple("Value").field(&v.len()).finish(),
            Yield::Tailcall { inputs, .. } => f
                .debug_struct("Tailcall")
                .field("inputs", &inputs.len())
                .finish(),
        }
    }
}

/// Observable state of a head record on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadState {
    /// The step body is executing (or about to).
    Running,
    /// A nested bind is executing; resumed exactly once on its completion.
    Suspended,
}

/// A normal in-progress bind.
pub struct HeadRecord {
    /// Step body; replaced in place by a tailcall.
    pub(crate) f: BindFn,

    /// Current inputs; replaced in place by a tailcall.
    pub(crate) inputs: Vec<Handle>,

    /// Start tick. Survives tailcalls: the whole chain is one step.
    pub(crate) t: Tock,

    /// Raw clock reading when the record was pushed. Inclusive time; the
    /// nested clock owns the exclusive measurement.
    pub(crate) started: Time,

    /// Whether this record is re-executing a recorded step.
    pub(crate) played: bool,

    pub(crate) state: HeadState,
}

/// A leaf holding an already-materialized value.
///
/// Pushed when replay can satisfy a step from a still-resident recording
/// instead of running its body again; completes immediately.
pub struct ValueRecord {
    pub(crate) t: Tock,
    pub(crate) cell: Rc<ValueCell>,
}

/// Mutable state of a step on the record stack.
pub enum Record {
    /// The implicit outermost step at tick 0. Cannot complete.
    Root,
    /// A normal in-progress bind.
    Head(HeadRecord),
    /// A leaf reusing a materialized value during replay.
    Value(ValueRecord),
}

impl Record {
    /// Start tick of this record.
    pub fn tock(&self) -> Tock {
        match self {
            Record::Root => Tock::ROOT,
            Record::Head(h) => h.t,
            Record::Value(v) => v.t,
        }
    }

    /// A nested bind is starting below this record.
    pub fn on_suspended(&mut self) {
        match self {
            Record::Root => {}
            Record::Head(h) => {
                assert_eq!(
                    h.state,
                    HeadState::Running,
                    "suspended a head record that was not running"
                );
                h.state = HeadState::Suspended;
            }
            Record::Value(_) => panic!("suspended a value record"),
        }
    }

    /// The nested bind below this record completed.
    pub fn on_resumed(&mut self) {
        match self {
            Record::Root => {}
            Record::Head(h) => {
                assert_eq!(
                    h.state,
                    HeadState::Suspended,
                    "resumed a head record that was not suspended"
                );
                h.state = HeadState::Running;
            }
            Record::Value(_) => panic!("resumed a value record"),
        }
    }

    /// Replace this running head's body and inputs in place.
    pub fn tailcall(&mut self, f: BindFn, inputs: Vec<Handle>) {
        match self {
            Record::Head(h) => {
                assert_eq!(
                    h.state,
                    HeadState::Running,
                    "tailcall from a head record that was not running"
                );
                h.f = f;
                h.inputs = inputs;
            }
            _ => panic!("tailcall outside a running head record"),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Root => write!(f, "Root"),
            Record::Head(h) => f
                .debug_struct("Head")
                .field("t", &h.t)
                .field("state", &h.state)
                .field("played", &h.played)
                .finish(),
            Record::Value(v) => f.debug_struct("Value").field("t", &v.t).finish(),
        }
    }
}
