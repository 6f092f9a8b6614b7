use core::fmt;
use core::num::NonZeroU32;

/// Arena slot handle shared by circuits, compartment graphs and the
/// substance registry.
///
/// Stored as slot + 1 in a `NonZeroU32`, so `Option<Id>` costs nothing
/// extra and a zeroed value never names a real element.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(NonZeroU32);

impl Id {
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    pub fn index(self) -> u32 {
        self.0.get() - 1
    }

    /// Position in the owning arena.
    pub fn slot(self) -> usize {
        self.index() as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.index(), f)
    }
}

/// Node within one circuit.
pub type NodeId = Id;
/// Path within one circuit.
pub type PathId = Id;
/// Entry in a `SubstanceRegistry`.
pub type SubstanceId = Id;
