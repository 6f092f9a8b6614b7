//! Derived values tied to the engine's state generation.

/// A value computed for a specific state generation.
///
/// `Engine::state_change` bumps the generation; the next reader sees the
/// cache as stale and recomputes.
#[derive(Clone, Debug)]
pub struct GenerationCache<T> {
    generation: Option<u64>,
    value: Option<T>,
}

impl<T> Default for GenerationCache<T> {
    fn default() -> Self {
        Self {
            generation: None,
            value: None,
        }
    }
}

impl<T> GenerationCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale(&self, generation: u64) -> bool {
        self.generation != Some(generation)
    }

    /// Last computed value, if it is still current or no recompute failed.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Return the cached value, recomputing it first if `generation` moved.
    pub fn get_or_try_update<E>(
        &mut self,
        generation: u64,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        if self.is_stale(generation) {
            self.value = None;
        }
        let value = match self.value.take() {
            Some(v) => v,
            None => compute()?,
        };
        self.generation = Some(generation);
        Ok(self.value.insert(value))
    }

    pub fn invalidate(&mut self) {
        self.generation = None;
    }
}
