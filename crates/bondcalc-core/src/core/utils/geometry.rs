use nalgebra::{Point3, Rotation3, Unit, Vector3};

const DEGENERATE_NORM: f64 = 1e-8;

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle_degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_degrees.to_radians())
}

/// Angle `a-b-c` at vertex `b`, in degrees.
pub fn bond_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ba = a - b;
    let bc = c - b;
    let denom = ba.norm() * bc.norm();
    if denom < DEGENERATE_NORM {
        return 0.0;
    }
    (ba.dot(&bc) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Dihedral angle `a-b-c-d` in degrees, in `(-180, 180]`. Zero is the eclipsed (cis)
/// arrangement.
pub fn dihedral_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let b2_norm = b2.norm();
    if b2_norm < DEGENERATE_NORM {
        return 0.0;
    }

    let x = n1.dot(&n2);
    let y = n1.cross(&n2).dot(&b2) / b2_norm;
    y.atan2(x).to_degrees()
}

/// Places an atom `d` bonded to `c` from the positions of its three nearest ancestors.
///
/// `bond_length` is the `c-d` distance, `bond_angle` the `b-c-d` angle and `torsion` the
/// `a-b-c-d` dihedral (both in degrees). When `a`, `b` and `c` are collinear an arbitrary
/// perpendicular is chosen so placement never produces NaN coordinates.
pub fn place_atom(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    bond_length: f64,
    bond_angle: f64,
    torsion: f64,
) -> Point3<f64> {
    let bc = (c - b).normalize();
    let mut normal = (b - a).cross(&bc);
    if normal.norm() < DEGENERATE_NORM {
        let helper = if bc.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        normal = helper.cross(&bc);
    }
    let normal = normal.normalize();
    let in_plane = normal.cross(&bc);

    let theta = bond_angle.to_radians();
    let phi = torsion.to_radians();

    let local = Vector3::new(
        -bond_length * theta.cos(),
        bond_length * theta.sin() * phi.cos(),
        bond_length * theta.sin() * phi.sin(),
    );

    c + bc * local.x + in_plane * local.y + normal * local.z
}

/// Whether three points are close enough to a line that no plane is defined through them.
pub fn is_collinear(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    (b - a).cross(&(c - b)).norm() < DEGENERATE_NORM
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}
