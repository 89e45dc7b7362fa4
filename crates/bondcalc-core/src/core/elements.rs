use phf::phf_map;

/// Per-element constants used by the scoring, surface and density stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    /// Van der Waals radius in Angstroms.
    pub vdw_radius: f64,
    /// Lennard-Jones well depth in kcal/mol.
    pub well_depth: f64,
    /// Electron count, the scattering weight of the element in density maps.
    pub electrons: f64,
}

const FALLBACK: ElementData = ElementData {
    vdw_radius: 1.8,
    well_depth: 0.1,
    electrons: 6.0,
};

static ELEMENTS: phf::Map<&'static str, ElementData> = phf_map! {
    "H" => ElementData { vdw_radius: 1.20, well_depth: 0.015, electrons: 1.0 },
    "D" => ElementData { vdw_radius: 1.20, well_depth: 0.015, electrons: 1.0 },
    "C" => ElementData { vdw_radius: 1.70, well_depth: 0.086, electrons: 6.0 },
    "N" => ElementData { vdw_radius: 1.55, well_depth: 0.170, electrons: 7.0 },
    "O" => ElementData { vdw_radius: 1.52, well_depth: 0.210, electrons: 8.0 },
    "P" => ElementData { vdw_radius: 1.80, well_depth: 0.200, electrons: 15.0 },
    "S" => ElementData { vdw_radius: 1.80, well_depth: 0.250, electrons: 16.0 },
    "SE" => ElementData { vdw_radius: 1.90, well_depth: 0.291, electrons: 34.0 },
    "MG" => ElementData { vdw_radius: 1.73, well_depth: 0.875, electrons: 12.0 },
    "ZN" => ElementData { vdw_radius: 1.39, well_depth: 0.250, electrons: 30.0 },
    "FE" => ElementData { vdw_radius: 1.94, well_depth: 0.013, electrons: 26.0 },
    "CA" => ElementData { vdw_radius: 2.31, well_depth: 0.460, electrons: 20.0 },
    "CL" => ElementData { vdw_radius: 1.75, well_depth: 0.265, electrons: 17.0 },
};

/// Looks up an element by its uppercase symbol.
pub fn lookup(symbol: &str) -> Option<&'static ElementData> {
    ELEMENTS.get(symbol)
}

/// Looks up an element, falling back to carbon-like values for unknown symbols.
pub fn lookup_or_default(symbol: &str) -> &'static ElementData {
    lookup(symbol).unwrap_or(&FALLBACK)
}
