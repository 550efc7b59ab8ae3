//! Run-state module root.

pub mod machine;

pub use machine::{RunEvent, RunState, RunStateMachine, TransitionRecord, TransitionResult};
