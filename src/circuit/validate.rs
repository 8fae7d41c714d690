//! Circuit validation.

use log::warn;

use crate::error::{Result, SimError};

use super::nodemap::{wire_nets, UnionFind};
use super::{Circuit, ComponentId};

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component
/// - No loop of ideal voltage constraints (DC view, inductors shorted)
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.components().is_empty() {
        return Err(SimError::EmptyCircuit);
    }
    check_short_circuit(circuit, true)
}

/// Fail with [`SimError::ShortCircuit`] if fixed-voltage constraints conflict.
pub fn check_short_circuit(circuit: &Circuit, dc: bool) -> Result<()> {
    match find_short_circuit(circuit, dc) {
        Some(components) => {
            warn!("short circuit through {} voltage constraints", components.len());
            Err(SimError::ShortCircuit { components })
        }
        None => Ok(()),
    }
}

/// Find a loop of ideal voltage constraints (sources, wires and, at DC,
/// inductors).
///
/// Each constraint joins the two nets it pins together. A constraint whose
/// nets are already joined closes a loop; it is reported together with the
/// other constraints in the same group, sorted by id.
pub fn find_short_circuit(circuit: &Circuit, dc: bool) -> Option<Vec<ComponentId>> {
    let nets = wire_nets(circuit);
    let mut uf = UnionFind::new(circuit.num_nodes());
    let mut placed: Vec<(ComponentId, usize)> = Vec::new();

    for component in circuit.components() {
        if !component.is_voltage_constraint(dc) {
            continue;
        }
        let terminals = component.nodes();
        let (a, b) = (nets[terminals[0].0], nets[terminals[1].0]);

        if !uf.union(a, b) {
            let root = uf.find(a);
            let mut involved: Vec<ComponentId> = placed
                .iter()
                .filter(|&&(_, net)| uf.find(net) == root)
                .map(|&(id, _)| id)
                .collect();
            involved.push(component.id());
            involved.sort();
            involved.dedup();
            return Some(involved);
        }
        placed.push((component.id(), a));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeId;
    use crate::components::{Inductor, Resistor, VoltageSource};

    #[test]
    fn test_empty_circuit() {
        assert!(matches!(validate_circuit(&Circuit::new()), Err(SimError::EmptyCircuit)));
    }

    #[test]
    fn test_parallel_sources_are_a_short() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let v1 = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 5.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, NodeId::GROUND], 1e3)).unwrap();
        let v2 = c.add(|id| VoltageSource::new(id, "V2", [a, NodeId::GROUND], 3.0)).unwrap();

        assert_eq!(find_short_circuit(&c, true), Some(vec![v1, v2]));
        let err = validate_circuit(&c).unwrap_err();
        assert!(matches!(err, SimError::ShortCircuit { .. }));
    }

    #[test]
    fn test_wire_across_source() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let v1 = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 5.0)).unwrap();
        c.add_wire(a, NodeId::GROUND).unwrap();
        assert_eq!(find_short_circuit(&c, false), Some(vec![v1]));
    }

    #[test]
    fn test_inductor_shorts_only_at_dc() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let v1 = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 1.0)).unwrap();
        let l1 = c.add(|id| Inductor::new(id, "L1", [a, NodeId::GROUND], 1e-3)).unwrap();

        assert_eq!(find_short_circuit(&c, true), Some(vec![v1, l1]));
        assert_eq!(find_short_circuit(&c, false), None);
    }

    #[test]
    fn test_series_sources_are_fine() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 1.0)).unwrap();
        c.add(|id| VoltageSource::new(id, "V2", [b, a], 1.0)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [b, NodeId::GROUND], 1e3)).unwrap();
        assert!(validate_circuit(&c).is_ok());
    }
}
