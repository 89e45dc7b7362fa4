use super::atom::Atom;
use super::ids::AtomId;
use crate::core::utils::geometry::{bond_angle, dihedral_angle, is_collinear};
use nalgebra::Point3;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("The graph already has an anchor atom")]
    AnchorAlreadySet,

    #[error("The graph has no anchor atom")]
    MissingAnchor,

    #[error("Anchor frame points are collinear with the anchor atom")]
    DegenerateFrame,

    #[error("Atom {0:?} does not exist in the graph")]
    AtomNotFound(AtomId),

    #[error("Parent atom {0:?} does not exist in the graph")]
    ParentNotFound(AtomId),

    #[error("Torsion parameter index {0} does not exist in the graph")]
    ParameterNotFound(usize),

    #[error("Torsion parameter '{0}' is already defined")]
    DuplicateParameter(String),
}

/// A named, rotatable bond whose sampled angle is applied to the atoms placed across it.
#[derive(Debug, Clone, PartialEq)]
pub struct TorsionParameter {
    pub name: String,
    /// Whether the bond lies on the main chain; used when tallying missing torsions.
    pub main_chain: bool,
}

/// Internal coordinates that place an atom relative to its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub parent: AtomId,
    /// Parent to atom distance in Angstroms.
    pub bond_length: f64,
    /// Grandparent, parent, atom angle in degrees.
    pub bond_angle: f64,
    /// Great-grandparent, grandparent, parent, atom dihedral in degrees, before any sampled
    /// delta is applied.
    pub torsion: f64,
    /// Index of the torsion parameter whose delta rotates this atom, if any.
    pub parameter: Option<usize>,
}

/// The anchor of the graph: a fixed atom plus two virtual reference points that stand in
/// for its missing parent and grandparent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorFrame {
    pub anchor: AtomId,
    /// `[virtual parent, virtual grandparent]` of the anchor atom.
    pub reference: [Point3<f64>; 2],
}

/// A directed bond graph rooted at an anchor atom.
///
/// Atoms live in a slot map; all relationships are stored as ids so the graph can be cloned
/// freely into every bond sequence that materializes it.
#[derive(Debug, Clone, Default)]
pub struct BondGraph {
    atoms: SlotMap<AtomId, Atom>,
    placements: SecondaryMap<AtomId, Placement>,
    children: SecondaryMap<AtomId, Vec<AtomId>>,
    parameters: Vec<TorsionParameter>,
    parameter_names: HashMap<String, usize>,
    frame: Option<AnchorFrame>,
}

impl BondGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the anchor atom with its virtual frame.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::AnchorAlreadySet`] for a second anchor and
    /// [`GraphError::DegenerateFrame`] when the frame does not define a plane.
    pub fn add_anchor(
        &mut self,
        atom: Atom,
        reference: [Point3<f64>; 2],
    ) -> Result<AtomId, GraphError> {
        if self.frame.is_some() {
            return Err(GraphError::AnchorAlreadySet);
        }
        if is_collinear(&reference[1], &reference[0], &atom.position) {
            return Err(GraphError::DegenerateFrame);
        }
        let id = self.atoms.insert(atom);
        self.children.insert(id, Vec::new());
        self.frame = Some(AnchorFrame {
            anchor: id,
            reference,
        });
        Ok(id)
    }

    /// Registers a named torsion parameter and returns its index.
    pub fn add_parameter(&mut self, name: &str, main_chain: bool) -> Result<usize, GraphError> {
        if self.parameter_names.contains_key(name) {
            return Err(GraphError::DuplicateParameter(name.to_string()));
        }
        let index = self.parameters.len();
        self.parameters.push(TorsionParameter {
            name: name.to_string(),
            main_chain,
        });
        self.parameter_names.insert(name.to_string(), index);
        Ok(index)
    }

    /// Adds an atom placed by explicit internal coordinates.
    pub fn add_atom(&mut self, atom: Atom, placement: Placement) -> Result<AtomId, GraphError> {
        if !self.atoms.contains_key(placement.parent) {
            return Err(GraphError::ParentNotFound(placement.parent));
        }
        if let Some(idx) = placement.parameter {
            if idx >= self.parameters.len() {
                return Err(GraphError::ParameterNotFound(idx));
            }
        }
        let parent = placement.parent;
        let id = self.atoms.insert(atom);
        self.placements.insert(id, placement);
        self.children.insert(id, Vec::new());
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.push(id);
        }
        Ok(id)
    }

    /// Adds an atom whose internal coordinates are measured from the reference positions of
    /// the atom and its ancestors.
    pub fn add_atom_from_reference(
        &mut self,
        atom: Atom,
        parent: AtomId,
        parameter: Option<usize>,
    ) -> Result<AtomId, GraphError> {
        let [a, b, c] = self.ancestor_positions(parent)?;
        let placement = Placement {
            parent,
            bond_length: (atom.position - c).norm(),
            bond_angle: bond_angle(&b, &c, &atom.position),
            torsion: dihedral_angle(&a, &b, &c, &atom.position),
            parameter,
        };
        self.add_atom(atom, placement)
    }

    /// Reference positions of the great-grandparent, grandparent and parent of a child of
    /// `parent`, substituting the anchor frame where real ancestors run out.
    fn ancestor_positions(&self, parent: AtomId) -> Result<[Point3<f64>; 3], GraphError> {
        let frame = self.frame.ok_or(GraphError::MissingAnchor)?;
        let parent_atom = self
            .atoms
            .get(parent)
            .ok_or(GraphError::ParentNotFound(parent))?;

        let mut chain = vec![parent_atom.position];
        let mut cursor = parent;
        while chain.len() < 3 {
            match self.placements.get(cursor) {
                Some(placement) => {
                    cursor = placement.parent;
                    chain.push(self.atoms[cursor].position);
                }
                None => break,
            }
        }
        let mut virtual_points = frame.reference.iter();
        while chain.len() < 3 {
            match virtual_points.next() {
                Some(point) => chain.push(*point),
                None => return Err(GraphError::MissingAnchor),
            }
        }
        Ok([chain[2], chain[1], chain[0]])
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter()
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn placement(&self, id: AtomId) -> Option<&Placement> {
        self.placements.get(id)
    }

    pub fn children(&self, id: AtomId) -> &[AtomId] {
        self.children.get(id).map_or(&[], |c| c.as_slice())
    }

    pub fn frame(&self) -> Option<&AnchorFrame> {
        self.frame.as_ref()
    }

    pub fn anchor(&self) -> Option<AtomId> {
        self.frame.map(|f| f.anchor)
    }

    pub fn parameters(&self) -> &[TorsionParameter] {
        &self.parameters
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.get(name).copied()
    }

    /// Counts atoms per element symbol, sorted by symbol.
    pub fn element_list(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for atom in self.atoms.values() {
            *counts.entry(atom.element.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Atoms reachable from the anchor in breadth-first order, so every atom comes after
    /// its parent.
    pub fn breadth_first(&self) -> Vec<AtomId> {
        let Some(anchor) = self.anchor() else {
            return Vec::new();
        };
        let mut order = Vec::with_capacity(self.atoms.len());
        let mut queue = VecDeque::from([anchor]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id).iter().copied());
        }
        order
    }

    /// Unordered atom pairs separated by at most `max_bonds` bonds.
    pub fn pairs_within(&self, max_bonds: usize) -> HashSet<(AtomId, AtomId)> {
        let mut neighbours: HashMap<AtomId, Vec<AtomId>> = HashMap::new();
        for (child, placement) in self.placements.iter() {
            neighbours.entry(child).or_default().push(placement.parent);
            neighbours.entry(placement.parent).or_default().push(child);
        }

        let mut pairs = HashSet::new();
        for start in self.atoms.keys() {
            let mut seen = HashSet::from([start]);
            let mut frontier = vec![start];
            for _ in 0..max_bonds {
                let mut next = Vec::new();
                for id in frontier {
                    for &n in neighbours.get(&id).map_or(&[][..], |v| v.as_slice()) {
                        if seen.insert(n) {
                            next.push(n);
                            pairs.insert(ordered_pair(start, n));
                        }
                    }
                }
                frontier = next;
            }
        }
        pairs
    }

    /// Whether the atom sits on a side chain, for depth bookkeeping.
    pub fn is_side_chain(&self, id: AtomId) -> bool {
        self.atoms
            .get(id)
            .is_some_and(|atom| atom.role.is_side_chain())
    }
}

pub fn ordered_pair(a: AtomId, b: AtomId) -> (AtomId, AtomId) {
    if a < b { (a, b) } else { (b, a) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::atom::AtomRole;
    use crate::core::utils::geometry::place_atom;

    pub(crate) fn frame() -> [Point3<f64>; 2] {
        [Point3::new(-1.0, 0.0, 0.0), Point3::new(-1.5, 1.0, 0.0)]
    }

    /// N-CA-C main chain with a CB-CG side chain on CA; phi rotates CA's children,
    /// chi1 rotates CG.
    pub(crate) fn small_graph() -> (BondGraph, HashMap<&'static str, AtomId>) {
        let mut graph = BondGraph::new();
        let phi = graph.add_parameter("phi", true).unwrap();
        let chi1 = graph.add_parameter("chi1", false).unwrap();

        let n = graph
            .add_anchor(
                Atom::new("N", "N", Point3::origin()).with_role(AtomRole::MainChain),
                frame(),
            )
            .unwrap();
        let ca = graph
            .add_atom(
                Atom::new("CA", "C", Point3::origin()).with_role(AtomRole::MainChain),
                Placement {
                    parent: n,
                    bond_length: 1.46,
                    bond_angle: 121.0,
                    torsion: 180.0,
                    parameter: None,
                },
            )
            .unwrap();
        let c = graph
            .add_atom(
                Atom::new("C", "C", Point3::origin()).with_role(AtomRole::MainChain),
                Placement {
                    parent: ca,
                    bond_length: 1.52,
                    bond_angle: 110.0,
                    torsion: -60.0,
                    parameter: Some(phi),
                },
            )
            .unwrap();
        let cb = graph
            .add_atom(
                Atom::new("CB", "C", Point3::origin()).with_role(AtomRole::SideChain),
                Placement {
                    parent: ca,
                    bond_length: 1.53,
                    bond_angle: 110.0,
                    torsion: 180.0,
                    parameter: Some(phi),
                },
            )
            .unwrap();
        let sg = graph
            .add_atom(
                Atom::new("SG", "S", Point3::origin()).with_role(AtomRole::SideChain),
                Placement {
                    parent: cb,
                    bond_length: 1.81,
                    bond_angle: 114.0,
                    torsion: 60.0,
                    parameter: Some(chi1),
                },
            )
            .unwrap();
        let o = graph
            .add_atom(
                Atom::new("O", "O", Point3::origin()).with_role(AtomRole::MainChain),
                Placement {
                    parent: c,
                    bond_length: 1.23,
                    bond_angle: 121.0,
                    torsion: 0.0,
                    parameter: None,
                },
            )
            .unwrap();

        let ids = HashMap::from([
            ("N", n),
            ("CA", ca),
            ("C", c),
            ("CB", cb),
            ("SG", sg),
            ("O", o),
        ]);
        (graph, ids)
    }

    #[test]
    fn second_anchor_is_rejected() {
        let (mut graph, _) = small_graph();
        let result = graph.add_anchor(Atom::new("X", "C", Point3::origin()), frame());
        assert_eq!(result, Err(GraphError::AnchorAlreadySet));
    }

    #[test]
    fn collinear_frame_is_rejected() {
        let mut graph = BondGraph::new();
        let result = graph.add_anchor(
            Atom::new("N", "N", Point3::origin()),
            [Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
        );
        assert_eq!(result, Err(GraphError::DegenerateFrame));
    }

    #[test]
    fn unknown_parent_and_parameter_are_rejected() {
        let (mut graph, ids) = small_graph();
        let result = graph.add_atom(
            Atom::new("X", "C", Point3::origin()),
            Placement {
                parent: ids["CA"],
                bond_length: 1.0,
                bond_angle: 100.0,
                torsion: 0.0,
                parameter: Some(42),
            },
        );
        assert_eq!(result, Err(GraphError::ParameterNotFound(42)));
    }

    #[test]
    fn missing_atom_is_reported_as_itself_not_as_a_parent() {
        let (_, ids) = small_graph();
        let missing = GraphError::AtomNotFound(ids["SG"]);
        assert_ne!(missing, GraphError::ParentNotFound(ids["SG"]));
        assert!(missing.to_string().starts_with("Atom "));
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let (mut graph, _) = small_graph();
        assert_eq!(
            graph.add_parameter("phi", true),
            Err(GraphError::DuplicateParameter("phi".to_string()))
        );
        assert_eq!(graph.parameter_index("chi1"), Some(1));
    }

    #[test]
    fn breadth_first_puts_parents_before_children() {
        let (graph, ids) = small_graph();
        let order = graph.breadth_first();
        assert_eq!(order.len(), 6);
        assert_eq!(order[0], ids["N"]);

        let position = |id: AtomId| order.iter().position(|&x| x == id).unwrap();
        for (id, placement) in graph.placements.iter() {
            assert!(position(placement.parent) < position(id));
        }
    }

    #[test]
    fn element_list_counts_atoms_per_element() {
        let (graph, _) = small_graph();
        let elements = graph.element_list();
        assert_eq!(elements.get("C"), Some(&3));
        assert_eq!(elements.get("N"), Some(&1));
        assert_eq!(elements.get("O"), Some(&1));
        assert_eq!(elements.get("S"), Some(&1));
    }

    #[test]
    fn pairs_within_three_bonds_follow_topology() {
        let (graph, ids) = small_graph();
        let pairs = graph.pairs_within(3);
        assert!(pairs.contains(&ordered_pair(ids["N"], ids["CA"])));
        assert!(pairs.contains(&ordered_pair(ids["N"], ids["SG"])));
        assert!(pairs.contains(&ordered_pair(ids["O"], ids["CB"])));
        assert!(!pairs.contains(&ordered_pair(ids["O"], ids["SG"])));
    }

    #[test]
    fn add_atom_from_reference_measures_internal_coordinates() {
        let mut graph = BondGraph::new();
        let anchor_pos = Point3::new(0.0, 0.0, 0.0);
        let n = graph
            .add_anchor(Atom::new("N", "N", anchor_pos), frame())
            .unwrap();
        let [f0, f1] = frame();
        let ca_pos = place_atom(&f1, &f0, &anchor_pos, 1.46, 118.0, 75.0);
        let ca = graph
            .add_atom_from_reference(Atom::new("CA", "C", ca_pos), n, None)
            .unwrap();

        let placement = graph.placement(ca).unwrap();
        assert!((placement.bond_length - 1.46).abs() < 1e-9);
        assert!((placement.bond_angle - 118.0).abs() < 1e-6);
        assert!((placement.torsion - 75.0).abs() < 1e-6);
    }
}
