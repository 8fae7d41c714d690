//! Layout of the MNA unknown vector.
//!
//! Wires collapse nodes into nets (union-find). Each net that some
//! component terminal touches gets one voltage unknown, except the ground
//! net. Components that need an explicit branch get one extra unknown each,
//! after all voltages.

use std::collections::HashMap;

use super::{Circuit, ComponentId, NodeId};
use crate::error::{Result, SimError};
use crate::solver::MAX_UNKNOWNS;

/// Disjoint-set forest with path halving.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge two sets; false if they were already one.
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        // Keep the smaller root so ground (0) stays a root
        if ra < rb {
            self.parent[rb] = ra;
        } else {
            self.parent[ra] = rb;
        }
        true
    }
}

/// Collapse wired nodes into nets; returns each node's net representative.
pub(crate) fn wire_nets(circuit: &Circuit) -> Vec<usize> {
    let mut uf = UnionFind::new(circuit.num_nodes());
    for wire in circuit.wires() {
        uf.union(wire.nodes[0].0, wire.nodes[1].0);
    }
    (0..circuit.num_nodes()).map(|i| uf.find(i)).collect()
}

/// Mapping from nodes and branch-owning components to unknown indices.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    /// Unknown index per node (None for ground and untouched nets)
    node_index: Vec<Option<usize>>,
    branches: HashMap<ComponentId, usize>,
    num_voltages: usize,
    /// Human-readable name of each unknown
    labels: Vec<String>,
}

impl NodeMap {
    /// Build the layout for the circuit's present topology.
    pub fn build(circuit: &Circuit) -> Result<Self> {
        let nets = wire_nets(circuit);
        let ground_net = nets[NodeId::GROUND.0];

        let mut touched = vec![false; circuit.num_nodes()];
        for component in circuit.components() {
            for node in component.nodes() {
                touched[nets[node.0]] = true;
            }
        }

        let mut net_index: HashMap<usize, usize> = HashMap::new();
        let mut labels = Vec::new();
        let mut node_index = vec![None; circuit.num_nodes()];
        for node in circuit.nodes() {
            let net = nets[node.id.0];
            if net == ground_net || !touched[net] {
                continue;
            }
            let index = *net_index.entry(net).or_insert_with(|| {
                labels.push(format!("node '{}'", node.name));
                labels.len() - 1
            });
            node_index[node.id.0] = Some(index);
        }
        let num_voltages = labels.len();

        let mut branches = HashMap::new();
        for component in circuit.components().iter().filter(|c| c.needs_branch()) {
            branches.insert(component.id(), labels.len());
            labels.push(format!("branch of {}", component.name()));
        }

        if labels.len() > MAX_UNKNOWNS {
            return Err(SimError::CircuitTooLarge {
                size: labels.len(),
                max: MAX_UNKNOWNS,
            });
        }

        Ok(Self {
            node_index,
            branches,
            num_voltages,
            labels,
        })
    }

    /// Total number of unknowns.
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn num_voltages(&self) -> usize {
        self.num_voltages
    }

    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    /// Matrix index of a node (None for ground or a node no terminal touches).
    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.node_index.get(node.0).copied().flatten()
    }

    /// Matrix index of a component's branch unknown.
    pub fn branch(&self, id: ComponentId) -> Option<usize> {
        self.branches.get(&id).copied()
    }

    /// Voltage of a node in a solution vector.
    pub fn voltage(&self, x: &[f64], node: NodeId) -> f64 {
        self.index(node).and_then(|i| x.get(i)).copied().unwrap_or(0.0)
    }

    /// Name of an unknown for error messages.
    pub fn describe(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("unknown #{index}"))
    }

    /// True when the branch assignment still matches the components.
    pub fn matches(&self, circuit: &Circuit) -> bool {
        circuit.num_nodes() == self.node_index.len()
            && circuit
                .components()
                .iter()
                .all(|c| c.needs_branch() == self.branches.contains_key(&c.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Inductor, Resistor, VoltageSource};

    #[test]
    fn test_wires_merge_nodes() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        let d = c.add_node("dangling");
        c.add_wire(a, b).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, NodeId::GROUND], 1e3)).unwrap();
        c.add(|id| Resistor::new(id, "R2", [b, NodeId::GROUND], 1e3)).unwrap();

        let map = NodeMap::build(&c).unwrap();
        assert_eq!(map.size(), 1);
        assert_eq!(map.index(a), map.index(b));
        assert_eq!(map.index(d), None);
        assert_eq!(map.index(NodeId::GROUND), None);
        assert_eq!(map.describe(0), "node 'a'");
    }

    #[test]
    fn test_wire_to_ground_removes_unknown() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        c.add_wire(a, NodeId::GROUND).unwrap();
        c.add(|id| Resistor::new(id, "R1", [a, NodeId::GROUND], 1e3)).unwrap();
        let map = NodeMap::build(&c).unwrap();
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_branches_follow_voltages() {
        let mut c = Circuit::new();
        let a = c.add_node("a");
        let b = c.add_node("b");
        let v = c.add(|id| VoltageSource::new(id, "V1", [a, NodeId::GROUND], 1.0)).unwrap();
        let l = c.add(|id| Inductor::new(id, "L1", [a, b], 1e-3)).unwrap();
        c.add(|id| Resistor::new(id, "R1", [b, NodeId::GROUND], 1e3)).unwrap();

        let map = NodeMap::build(&c).unwrap();
        assert_eq!(map.num_voltages(), 2);
        assert_eq!(map.num_branches(), 2);
        assert_eq!(map.branch(v), Some(2));
        assert_eq!(map.branch(l), Some(3));
        assert_eq!(map.describe(3), "branch of L1");
        assert!(map.matches(&c));
    }

    #[test]
    fn test_too_many_unknowns() {
        let mut c = Circuit::new();
        let mut prev = NodeId::GROUND;
        for i in 0..=MAX_UNKNOWNS {
            let n = c.add_node(&format!("n{i}"));
            c.add(|id| Resistor::new(id, format!("R{i}"), [prev, n], 1.0)).unwrap();
            prev = n;
        }
        let err = NodeMap::build(&c).unwrap_err();
        assert!(matches!(err, SimError::CircuitTooLarge { .. }));
    }
}
