//! Circuit graph structure.

use std::collections::HashMap;

use super::types::{ComponentId, Node, NodeId, Position, Probe, Wire};
use super::NodeMap;
use crate::components::{Component, ParameterKind};
use crate::error::{Result, SimError};

/// A circuit being edited and simulated.
///
/// Node 0 always exists and is ground. Structural edits (nodes,
/// components, wires, probes) bump [`Circuit::revision`], which tells the
/// simulator to rebuild its unknown layout and reset its state.
#[derive(Debug, Clone)]
pub struct Circuit {
    /// All nodes, indexed by `NodeId`
    nodes: Vec<Node>,

    /// Mapping from node names to node IDs
    node_names: HashMap<String, NodeId>,

    /// All components in insertion order
    components: Vec<Component>,

    /// Ideal node-to-node connections
    wires: Vec<Wire>,

    /// Named voltage taps
    probes: Vec<Probe>,

    next_component_id: usize,

    revision: u64,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Create an empty circuit containing only the ground node "0".
    pub fn new() -> Self {
        let ground = Node {
            id: NodeId::GROUND,
            name: "0".to_string(),
            voltage: 0.0,
            position: Position::default(),
        };
        let mut node_names = HashMap::new();
        node_names.insert("0".to_string(), NodeId::GROUND);
        node_names.insert("GND".to_string(), NodeId::GROUND);
        Self {
            nodes: vec![ground],
            node_names,
            components: Vec::new(),
            wires: Vec::new(),
            probes: Vec::new(),
            next_component_id: 0,
            revision: 0,
        }
    }

    /// Topology revision, bumped on every structural edit.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // ============ Nodes ============

    /// Get the node with this name, creating it if needed.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        self.add_node_at(name, Position::default())
    }

    /// Get or create a node, recording its canvas position on creation.
    pub fn add_node_at(&mut self, name: &str, position: Position) -> NodeId {
        if let Some(&id) = self.node_names.get(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            voltage: 0.0,
            position,
        });
        self.node_names.insert(name.to_string(), id);
        self.touch();
        id
    }

    /// Look up a node by name.
    pub fn node_id(&self, name: &str) -> Result<NodeId> {
        self.node_names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::NodeNameNotFound {
                name: name.to_string(),
            })
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(SimError::NodeNotFound { node: id })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes, ground included.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Voltage of a node from the last accepted solution.
    pub fn node_voltage(&self, id: NodeId) -> Result<f64> {
        self.node(id).map(|n| n.voltage)
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(SimError::NodeNotFound { node: id })
        }
    }

    /// Write an accepted solution back to the node voltages.
    pub(crate) fn set_node_voltages(&mut self, map: &NodeMap, x: &[f64]) {
        for node in &mut self.nodes {
            node.voltage = map.voltage(x, node.id);
        }
    }

    pub(crate) fn clear_node_voltages(&mut self) {
        for node in &mut self.nodes {
            node.voltage = 0.0;
        }
    }

    // ============ Components ============

    /// Add a component built by `build` from its freshly assigned id.
    ///
    /// Every terminal must name an existing node and the name must be unique.
    pub fn add<C, F>(&mut self, build: F) -> Result<ComponentId>
    where
        C: Into<Component>,
        F: FnOnce(ComponentId) -> C,
    {
        let id = ComponentId(self.next_component_id);
        let component = build(id).into();

        for &node in component.nodes() {
            self.check_node(node)?;
        }
        if self.components.iter().any(|c| c.name() == component.name()) {
            return Err(SimError::DuplicateComponent {
                name: component.name().to_string(),
            });
        }

        self.next_component_id += 1;
        self.components.push(component);
        self.touch();
        Ok(id)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, id: ComponentId) -> Result<&Component> {
        self.components
            .iter()
            .find(|c| c.id() == id)
            .ok_or(SimError::ComponentNotFound { id })
    }

    /// Mutable access for value edits (wiper position, switch state, ...).
    ///
    /// Edits that change which terminals a component uses or whether it
    /// owns a branch current should go through remove + add instead.
    pub fn component_mut(&mut self, id: ComponentId) -> Result<&mut Component> {
        self.components
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(SimError::ComponentNotFound { id })
    }

    pub(crate) fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    /// Look up a component by name.
    pub fn find_component(&self, name: &str) -> Result<ComponentId> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(Component::id)
            .ok_or_else(|| SimError::ComponentNameNotFound {
                name: name.to_string(),
            })
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Result<Component> {
        let pos = self
            .components
            .iter()
            .position(|c| c.id() == id)
            .ok_or(SimError::ComponentNotFound { id })?;
        let removed = self.components.remove(pos);
        self.touch();
        Ok(removed)
    }

    /// Change a component value without touching the topology.
    pub fn set_parameter(&mut self, id: ComponentId, kind: ParameterKind, value: f64) -> Result<()> {
        self.component_mut(id)?.set_parameter(kind, value)
    }

    pub fn parameter(&self, id: ComponentId, kind: ParameterKind) -> Result<f64> {
        let component = self.component(id)?;
        component
            .parameter(kind)
            .ok_or_else(|| SimError::invalid_parameter(component.name(), kind.to_string(), "not present"))
    }

    /// True when any component needs Newton iteration.
    pub fn has_nonlinear(&self) -> bool {
        self.components.iter().any(Component::is_nonlinear)
    }

    // ============ Wires and probes ============

    /// Short two nodes together.
    pub fn add_wire(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.check_node(a)?;
        self.check_node(b)?;
        self.wires.push(Wire { nodes: [a, b] });
        self.touch();
        Ok(())
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Attach a named probe to a node; returns its index.
    pub fn add_probe(&mut self, name: impl Into<String>, node: NodeId) -> Result<usize> {
        self.check_node(node)?;
        self.probes.push(Probe {
            name: name.into(),
            node,
        });
        self.touch();
        Ok(self.probes.len() - 1)
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probe(&self, index: usize) -> Result<&Probe> {
        self.probes.get(index).ok_or(SimError::ProbeNotFound { index })
    }
}
