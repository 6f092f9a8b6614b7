//! Two-phase scalar storage.

/// A value with a committed reading and a staged replacement.
///
/// Writers stage with [`Staged::set_next`]; readers only ever see the
/// committed value until [`Staged::commit`] promotes the staged one. A
/// `None` reading means "never computed", which is not the same as zero.
///
/// The staged value is kept after a commit so that an element nobody
/// touches this step keeps its previous setting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Staged<T> {
    current: Option<T>,
    next: Option<T>,
    baseline: Option<T>,
}

impl<T: Copy> Staged<T> {
    /// Nothing committed, nothing staged.
    pub fn unset() -> Self {
        Self {
            current: None,
            next: None,
            baseline: None,
        }
    }

    /// Start with `value` committed and staged; `clear` returns here.
    pub fn with_baseline(value: T) -> Self {
        Self {
            current: Some(value),
            next: Some(value),
            baseline: Some(value),
        }
    }

    /// Last committed value.
    pub fn get(&self) -> Option<T> {
        self.current
    }

    /// Whether a value was ever committed.
    pub fn has(&self) -> bool {
        self.current.is_some()
    }

    /// Staged value, if any.
    pub fn next(&self) -> Option<T> {
        self.next
    }

    /// Staged value, falling back to the committed one.
    pub fn next_or_current(&self) -> Option<T> {
        self.next.or(self.current)
    }

    pub fn set_next(&mut self, value: T) {
        self.next = Some(value);
    }

    /// Promote the staged value.
    pub fn commit(&mut self) {
        if self.next.is_some() {
            self.current = self.next;
        }
    }

    /// Overwrite both readings, bypassing staging. Used when restoring state.
    pub fn force(&mut self, value: Option<T>) {
        self.current = value;
        self.next = value;
    }

    /// Return to the configured baseline (or unset when there is none).
    pub fn clear(&mut self) {
        self.current = self.baseline;
        self.next = self.baseline;
    }
}
