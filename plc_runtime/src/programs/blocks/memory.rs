//! Variable with previous-scan state.

/// Current and previous-scan value of a program variable.
///
/// Call [`MemoryVariable::update`] exactly once per scan; the edge helpers
/// compare against the value of the previous scan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryVariable<T> {
    curr: T,
    prev: T,
}

impl<T: Copy + PartialEq> MemoryVariable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            curr: initial,
            prev: initial,
        }
    }

    /// Shift the current value into `prev` and store `value`.
    #[inline]
    pub fn update(&mut self, value: T) {
        self.prev = self.curr;
        self.curr = value;
    }

    #[inline]
    pub fn current(&self) -> T {
        self.curr
    }

    #[inline]
    pub fn previous(&self) -> T {
        self.prev
    }

    #[inline]
    pub fn changed(&self) -> bool {
        self.curr != self.prev
    }
}

impl MemoryVariable<bool> {
    #[inline]
    pub fn active(&self) -> bool {
        self.curr
    }

    /// false → true since the previous scan.
    #[inline]
    pub fn rising_edge(&self) -> bool {
        self.curr && !self.prev
    }

    /// true → false since the previous scan.
    #[inline]
    pub fn falling_edge(&self) -> bool {
        !self.curr && self.prev
    }
}
