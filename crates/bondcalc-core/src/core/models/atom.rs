use nalgebra::Point3;
use std::str::FromStr;

/// Represents the role of an atom within the bond graph.
///
/// The role decides how depth control treats the atom: main-chain atoms are bounded only by
/// the overall depth limit, while side-chain atoms are additionally truncated by their
/// distance from the branch point where they leave the main chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AtomRole {
    /// Main-chain atom (e.g. N, CA, C of a polypeptide).
    MainChain,
    /// Side-chain atom, hanging off a main-chain branch point.
    SideChain,
    /// Ligand atom, part of a small molecule attached to the graph.
    Ligand,
    /// Unknown or unclassified atom role.
    #[default]
    Other,
}

impl AtomRole {
    /// Whether atoms of this role are truncated by side-chain depth control.
    #[inline]
    pub fn is_side_chain(&self) -> bool {
        matches!(self, AtomRole::SideChain)
    }
}

/// An atom of the bond graph.
///
/// The `position` is the reference coordinate the atom had in the input model; sampled
/// conformations are compared against it when deviations are requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "CA", "N", "O").
    pub name: String,
    /// Uppercase element symbol (e.g., "C", "N", "FE").
    pub element: String,
    /// The role of the atom in the graph.
    pub role: AtomRole,
    /// Reference coordinates in Angstroms.
    pub position: Point3<f64>,
}

impl Atom {
    /// Creates a new `Atom` with the default role.
    ///
    /// The element symbol is normalized to uppercase so that lookups in the element table
    /// and per-element map splitting agree on a single spelling.
    pub fn new(name: &str, element: &str, position: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            element: element.trim().to_ascii_uppercase(),
            role: AtomRole::default(),
            position,
        }
    }

    pub fn with_role(mut self, role: AtomRole) -> Self {
        self.role = role;
        self
    }
}

impl FromStr for AtomRole {
    type Err = ();

    /// Parses a role name, case-insensitively, accepting the common spellings of
    /// "main-chain" and "side-chain".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainchain" | "main-chain" | "main_chain" | "backbone" => Ok(AtomRole::MainChain),
            "sidechain" | "side-chain" | "side_chain" => Ok(AtomRole::SideChain),
            "ligand" => Ok(AtomRole::Ligand),
            "other" | "unknown" => Ok(AtomRole::Other),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_atom_normalizes_element_and_uses_default_role() {
        let atom = Atom::new("CA", " c ", Point3::new(1.0, 2.0, 3.0));

        assert_eq!(atom.name, "CA");
        assert_eq!(atom.element, "C");
        assert_eq!(atom.role, AtomRole::Other);
        assert_eq!(atom.position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn with_role_overrides_role() {
        let atom = Atom::new("CB", "C", Point3::origin()).with_role(AtomRole::SideChain);
        assert_eq!(atom.role, AtomRole::SideChain);
        assert!(atom.role.is_side_chain());
        assert!(!AtomRole::MainChain.is_side_chain());
    }

    #[test]
    fn from_str_parses_valid_roles() {
        assert_eq!(AtomRole::from_str("main-chain"), Ok(AtomRole::MainChain));
        assert_eq!(AtomRole::from_str("backbone"), Ok(AtomRole::MainChain));
        assert_eq!(AtomRole::from_str("SideChain"), Ok(AtomRole::SideChain));
        assert_eq!(AtomRole::from_str("side_chain"), Ok(AtomRole::SideChain));
        assert_eq!(AtomRole::from_str("LIGAND"), Ok(AtomRole::Ligand));
        assert_eq!(AtomRole::from_str("unknown"), Ok(AtomRole::Other));
    }

    #[test]
    fn from_str_returns_err_for_invalid_role() {
        assert_eq!(AtomRole::from_str("foo"), Err(()));
        assert_eq!(AtomRole::from_str(""), Err(()));
        assert_eq!(AtomRole::from_str("side chainz"), Err(()));
    }
}
