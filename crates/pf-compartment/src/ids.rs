//! Identifiers scoped to one compartment graph.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use pf_core::Id;

static NEXT_GRAPH: AtomicU32 = AtomicU32::new(0);

/// Distinguishes one graph's identifiers from another's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphKey(u32);

impl GraphKey {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_GRAPH.fetch_add(1, Ordering::Relaxed))
    }
}

/// A compartment within a specific graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompartmentId {
    pub(crate) graph: GraphKey,
    pub(crate) id: Id,
}

/// A link within a specific graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId {
    pub(crate) graph: GraphKey,
    pub(crate) id: Id,
}

impl CompartmentId {
    pub fn graph(self) -> GraphKey {
        self.graph
    }

    pub fn slot(self) -> usize {
        self.id.slot()
    }
}

impl LinkId {
    pub fn graph(self) -> GraphKey {
        self.graph
    }

    pub fn slot(self) -> usize {
        self.id.slot()
    }
}

impl fmt::Debug for CompartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompartmentId({}:{})", self.graph.0, self.id)
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({}:{})", self.graph.0, self.id)
    }
}
