//! Building blocks for control programs.
//!
//! All blocks are plain values updated once per scan by the program that
//! owns them; none of them touches I/O.

pub mod counters;
pub mod memory;
pub mod switches;
pub mod timers;

pub use counters::{DownCounter, UpCounter, UpDownCounter};
pub use memory::MemoryVariable;
pub use switches::ToggleSoftSwitch;
pub use timers::{OffDelayTimer, OnDelayTimer, SingleScanTimer};
