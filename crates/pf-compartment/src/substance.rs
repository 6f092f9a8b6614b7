//! Substance definitions and the run-wide active set.

use std::collections::HashMap;

use pf_core::SubstanceId;

use crate::error::{CompartmentError, CompartmentResult};

/// Which kind of compartment graph a substance travels through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Gas,
    Liquid,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Gas => "gas",
            Phase::Liquid => "liquid",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Substance {
    pub id: SubstanceId,
    pub name: String,
    pub phase: Phase,
}

/// Every substance the run knows about, and which of them are active.
///
/// Quantity records only exist for active substances.
#[derive(Clone, Debug, Default)]
pub struct SubstanceRegistry {
    substances: Vec<Substance>,
    by_name: HashMap<String, SubstanceId>,
    active: Vec<SubstanceId>,
}

impl SubstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
    ) -> CompartmentResult<SubstanceId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(CompartmentError::DuplicateName {
                graph: "substances".to_string(),
                what: "substance",
                name,
            });
        }
        let id = SubstanceId::from_index(self.substances.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.substances.push(Substance { id, name, phase });
        Ok(id)
    }

    pub fn get(&self, id: SubstanceId) -> Option<&Substance> {
        self.substances.get(id.slot())
    }

    pub fn by_name(&self, name: &str) -> Option<&Substance> {
        self.by_name.get(name).and_then(|&id| self.get(id))
    }

    pub fn substances(&self) -> &[Substance] {
        &self.substances
    }

    /// Mark a substance active. Returns `true` the first time.
    pub fn activate(&mut self, id: SubstanceId) -> CompartmentResult<bool> {
        if self.get(id).is_none() {
            return Err(CompartmentError::NotFound {
                graph: "substances".to_string(),
                what: "substance",
                name: id.to_string(),
            });
        }
        if self.active.contains(&id) {
            return Ok(false);
        }
        self.active.push(id);
        Ok(true)
    }

    pub fn is_active(&self, id: SubstanceId) -> bool {
        self.active.contains(&id)
    }

    /// Active substances in activation order.
    pub fn active(&self) -> impl Iterator<Item = &Substance> + '_ {
        self.active.iter().filter_map(|&id| self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_activate() {
        let mut reg = SubstanceRegistry::new();
        let o2 = reg.register("Oxygen", Phase::Gas).unwrap();
        let glucose = reg.register("Glucose", Phase::Liquid).unwrap();
        assert!(reg.register("Oxygen", Phase::Gas).is_err());

        assert!(!reg.is_active(o2));
        assert!(reg.activate(o2).unwrap());
        assert!(!reg.activate(o2).unwrap());
        assert_eq!(reg.active().count(), 1);
        assert_eq!(reg.by_name("Glucose").unwrap().id, glucose);
    }
}
