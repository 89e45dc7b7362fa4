use crate::core::models::graph::{BondGraph, GraphError};
use crate::core::models::ids::AtomId;
use nalgebra::Point3;
use std::collections::HashMap;
use std::sync::Arc;

/// Where an ancestor position is read from during placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    /// Another block of the same sequence.
    Block(usize),
    /// A virtual point of the anchor frame.
    Fixed(Point3<f64>),
}

/// Internal coordinates of a non-anchor block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGeometry {
    /// `[great-grandparent, grandparent, parent]`.
    pub ancestors: [Reference; 3],
    pub bond_length: f64,
    pub bond_angle: f64,
    /// Reference torsion in degrees; the basis delta is added on top.
    pub torsion: f64,
    pub parameter: Option<usize>,
}

/// One atom of a materialized conformation.
#[derive(Debug, Clone)]
pub struct AtomBlock {
    pub atom: AtomId,
    pub element: Arc<str>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// `None` for the anchor, which never moves.
    pub geometry: Option<BlockGeometry>,
    pub reference: Point3<f64>,
    pub position: Point3<f64>,
    /// Bonds from the anchor.
    pub depth: usize,
    /// Bonds from the point where the side chain leaves the main chain; zero off side chains.
    pub side_depth: usize,
    pub computed: bool,
    pub extracted: bool,
}

/// Lays the graph out as blocks in breadth-first order, so every block follows its parent.
pub(crate) fn build_blocks(graph: &BondGraph) -> Result<Vec<AtomBlock>, GraphError> {
    let frame = graph.frame().ok_or(GraphError::MissingAnchor)?;
    let order = graph.breadth_first();
    let index: HashMap<AtomId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut blocks: Vec<AtomBlock> = Vec::with_capacity(order.len());
    for &id in &order {
        let atom = graph.atom(id).ok_or(GraphError::AtomNotFound(id))?;
        let side_chain = graph.is_side_chain(id);

        let (parent, geometry, depth, side_depth) = match graph.placement(id) {
            None => (None, None, 0, usize::from(side_chain)),
            Some(placement) => {
                let p = *index
                    .get(&placement.parent)
                    .ok_or(GraphError::ParentNotFound(placement.parent))?;

                let mut chain = vec![Reference::Block(p)];
                let mut cursor = blocks[p].parent;
                while chain.len() < 3 {
                    match cursor {
                        Some(c) => {
                            chain.push(Reference::Block(c));
                            cursor = blocks[c].parent;
                        }
                        None => break,
                    }
                }
                for point in frame.reference {
                    if chain.len() < 3 {
                        chain.push(Reference::Fixed(point));
                    }
                }

                let side_depth = match (side_chain, graph.is_side_chain(placement.parent)) {
                    (false, _) => 0,
                    (true, true) => blocks[p].side_depth + 1,
                    (true, false) => 1,
                };

                let geometry = BlockGeometry {
                    ancestors: [chain[2], chain[1], chain[0]],
                    bond_length: placement.bond_length,
                    bond_angle: placement.bond_angle,
                    torsion: placement.torsion,
                    parameter: placement.parameter,
                };
                (Some(p), Some(geometry), blocks[p].depth + 1, side_depth)
            }
        };

        if let Some(p) = parent {
            let next = blocks.len();
            blocks[p].children.push(next);
        }
        blocks.push(AtomBlock {
            atom: id,
            element: Arc::from(atom.element.as_str()),
            parent,
            children: Vec::new(),
            geometry,
            reference: atom.position,
            position: atom.position,
            depth,
            side_depth,
            computed: true,
            extracted: true,
        });
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::graph::tests::{frame, small_graph};

    #[test]
    fn blocks_follow_breadth_first_order_with_index_links() {
        let (graph, ids) = small_graph();
        let blocks = build_blocks(&graph).unwrap();
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0].atom, ids["N"]);
        assert!(blocks[0].geometry.is_none());

        for (i, block) in blocks.iter().enumerate() {
            if let Some(p) = block.parent {
                assert!(p < i);
                assert!(blocks[p].children.contains(&i));
                assert_eq!(block.depth, blocks[p].depth + 1);
            }
        }
        let links: usize = blocks.iter().map(|b| b.children.len()).sum();
        assert_eq!(links, blocks.len() - 1);
    }

    #[test]
    fn shallow_blocks_borrow_the_anchor_frame() {
        let (graph, _) = small_graph();
        let blocks = build_blocks(&graph).unwrap();
        let [virtual_parent, virtual_grandparent] = frame();

        let ca = blocks[1].geometry.as_ref().unwrap();
        assert_eq!(
            ca.ancestors,
            [
                Reference::Fixed(virtual_grandparent),
                Reference::Fixed(virtual_parent),
                Reference::Block(0)
            ]
        );

        let c = blocks[2].geometry.as_ref().unwrap();
        assert_eq!(
            c.ancestors,
            [
                Reference::Fixed(virtual_parent),
                Reference::Block(0),
                Reference::Block(1)
            ]
        );
    }

    #[test]
    fn side_depth_counts_from_the_branch_point() {
        let (graph, ids) = small_graph();
        let blocks = build_blocks(&graph).unwrap();
        let depth_of = |id| blocks.iter().find(|b| b.atom == id).unwrap().side_depth;
        assert_eq!(depth_of(ids["CA"]), 0);
        assert_eq!(depth_of(ids["CB"]), 1);
        assert_eq!(depth_of(ids["SG"]), 2);
    }

    #[test]
    fn graph_without_anchor_is_rejected() {
        let result = build_blocks(&BondGraph::new());
        assert!(matches!(result, Err(GraphError::MissingAnchor)));
    }
}
