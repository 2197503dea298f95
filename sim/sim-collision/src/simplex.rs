//! Voronoi-region simplex solver for GJK.
//!
//! Holds up to four points `w = p - q` of the Minkowski difference together
//! with their witnesses `p` (on shape A) and `q` (on shape B). After each new
//! vertex the solver finds the point of the simplex closest to the origin by
//! testing the Voronoi regions of its features, keeps only the vertices that
//! support that point, and reconstructs the witness points from the
//! barycentric coordinates.
//!
//! # References
//!
//! - Ericson: "Real-Time Collision Detection" (2004), sections 5.1.5 and 5.1.6
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)

use nalgebra::{Point3, Vector3};

/// Two vertices closer than this (squared) are the same vertex.
const EQUAL_VERTEX_THRESHOLD: f64 = 1e-4;

/// A tetrahedron thinner than this (squared signed volume term) is degenerate.
const DEGENERATE_TETRAHEDRON_EPSILON: f64 = 1e-8 * 1e-8;

/// Maximum number of vertices.
pub const MAX_SIMPLEX_VERTICES: usize = 4;

/// Closest point of a sub-simplex with its barycentric coordinates.
#[derive(Debug, Clone, Copy, Default)]
struct SubSimplexClosest {
    point: Vector3<f64>,
    used: [bool; 4],
    barycentric: [f64; 4],
    degenerate: bool,
}

impl SubSimplexClosest {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn set_barycentric(&mut self, a: f64, b: f64, c: f64, d: f64) {
        self.barycentric = [a, b, c, d];
    }

    fn is_valid(&self) -> bool {
        self.barycentric.iter().all(|&u| u >= 0.0)
    }
}

/// Simplex of Minkowski-difference points with witness tracking.
#[derive(Debug, Clone)]
pub struct VoronoiSimplex {
    num_vertices: usize,
    w: [Vector3<f64>; MAX_SIMPLEX_VERTICES],
    p: [Point3<f64>; MAX_SIMPLEX_VERTICES],
    q: [Point3<f64>; MAX_SIMPLEX_VERTICES],
    cached_p: Point3<f64>,
    cached_q: Point3<f64>,
    cached_v: Vector3<f64>,
    last_w: Vector3<f64>,
    cached_valid: bool,
    cached: SubSimplexClosest,
    needs_update: bool,
}

impl Default for VoronoiSimplex {
    fn default() -> Self {
        Self::new()
    }
}

impl VoronoiSimplex {
    /// Create an empty simplex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_vertices: 0,
            w: [Vector3::zeros(); MAX_SIMPLEX_VERTICES],
            p: [Point3::origin(); MAX_SIMPLEX_VERTICES],
            q: [Point3::origin(); MAX_SIMPLEX_VERTICES],
            cached_p: Point3::origin(),
            cached_q: Point3::origin(),
            cached_v: Vector3::zeros(),
            last_w: Vector3::repeat(1e18),
            cached_valid: false,
            cached: SubSimplexClosest::default(),
            needs_update: true,
        }
    }

    /// Drop every vertex.
    pub fn reset(&mut self) {
        self.cached_valid = false;
        self.num_vertices = 0;
        self.needs_update = true;
        self.last_w = Vector3::repeat(1e18);
        self.cached.reset();
    }

    /// Append the support point `w = p - q`.
    pub fn add_vertex(&mut self, w: Vector3<f64>, p: Point3<f64>, q: Point3<f64>) {
        debug_assert!(self.num_vertices < MAX_SIMPLEX_VERTICES, "simplex overflow");
        self.last_w = w;
        self.needs_update = true;
        let i = self.num_vertices;
        self.w[i] = w;
        self.p[i] = p;
        self.q[i] = q;
        self.num_vertices += 1;
    }

    /// Number of vertices currently held.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Whether the simplex is a tetrahedron.
    #[must_use]
    pub fn full_simplex(&self) -> bool {
        self.num_vertices == MAX_SIMPLEX_VERTICES
    }

    /// Largest squared length among the vertices.
    #[must_use]
    pub fn max_vertex(&self) -> f64 {
        self.w[..self.num_vertices]
            .iter()
            .map(Vector3::norm_squared)
            .fold(0.0, f64::max)
    }

    /// Vertices currently held.
    #[must_use]
    pub fn vertices(&self) -> &[Vector3<f64>] {
        &self.w[..self.num_vertices]
    }

    /// Whether `w` is already part of the simplex, or was the last vertex
    /// added.
    #[must_use]
    pub fn in_simplex(&self, w: &Vector3<f64>) -> bool {
        if *w == self.last_w {
            return true;
        }
        self.w[..self.num_vertices]
            .iter()
            .any(|v| (v - w).norm_squared() <= EQUAL_VERTEX_THRESHOLD)
    }

    /// Point of the simplex closest to the origin, reducing the simplex to
    /// the vertices that support it.
    ///
    /// Returns `None` when the closest point could not be determined (a
    /// degenerate tetrahedron or negative barycentric coordinates).
    pub fn closest(&mut self) -> Option<Vector3<f64>> {
        self.update_closest_vectors().then_some(self.cached_v)
    }

    /// Last computed closest point, whether or not it was valid.
    #[must_use]
    pub fn backup_closest(&self) -> Vector3<f64> {
        self.cached_v
    }

    /// Witness points on A and B of the current closest point.
    pub fn compute_points(&mut self) -> (Point3<f64>, Point3<f64>) {
        self.update_closest_vectors();
        (self.cached_p, self.cached_q)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn remove_vertex(&mut self, index: usize) {
        debug_assert!(self.num_vertices > 0);
        self.num_vertices -= 1;
        let last = self.num_vertices;
        self.w[index] = self.w[last];
        self.p[index] = self.p[last];
        self.q[index] = self.q[last];
    }

    fn reduce_vertices(&mut self, used: [bool; 4]) {
        for i in (0..MAX_SIMPLEX_VERTICES).rev() {
            if self.num_vertices > i && !used[i] {
                self.remove_vertex(i);
            }
        }
    }

    fn witnesses(&self, barycentric: &[f64; 4], count: usize) -> (Point3<f64>, Point3<f64>) {
        let mut p = Vector3::zeros();
        let mut q = Vector3::zeros();
        for i in 0..count {
            p += self.p[i].coords * barycentric[i];
            q += self.q[i].coords * barycentric[i];
        }
        (Point3::from(p), Point3::from(q))
    }

    fn update_closest_vectors(&mut self) -> bool {
        if !self.needs_update {
            return self.cached_valid;
        }
        self.cached.reset();
        self.needs_update = false;

        match self.num_vertices {
            0 => self.cached_valid = false,
            1 => {
                self.cached_p = self.p[0];
                self.cached_q = self.q[0];
                self.cached_v = self.cached_p - self.cached_q;
                self.cached.set_barycentric(1.0, 0.0, 0.0, 0.0);
                self.cached.used[0] = true;
                self.cached_valid = self.cached.is_valid();
            }
            2 => {
                let from = self.w[0];
                let to = self.w[1];
                let segment = to - from;
                let mut t = segment.dot(&-from);
                if t > 0.0 {
                    let length_sq = segment.norm_squared();
                    if t < length_sq {
                        t /= length_sq;
                        self.cached.used[0] = true;
                        self.cached.used[1] = true;
                    } else {
                        t = 1.0;
                        self.cached.used[1] = true;
                    }
                } else {
                    t = 0.0;
                    self.cached.used[0] = true;
                }
                self.cached.set_barycentric(1.0 - t, t, 0.0, 0.0);
                self.cached.point = from + segment * t;

                self.cached_p = self.p[0] + (self.p[1] - self.p[0]) * t;
                self.cached_q = self.q[0] + (self.q[1] - self.q[0]) * t;
                self.cached_v = self.cached_p - self.cached_q;
                self.reduce_vertices(self.cached.used);
                self.cached_valid = self.cached.is_valid();
            }
            3 => {
                self.cached = closest_on_triangle(&self.w[0], &self.w[1], &self.w[2]);
                let (p, q) = self.witnesses(&self.cached.barycentric, 3);
                self.cached_p = p;
                self.cached_q = q;
                self.cached_v = p - q;
                self.reduce_vertices(self.cached.used);
                self.cached_valid = self.cached.is_valid();
            }
            _ => match closest_on_tetrahedron(&self.w[0], &self.w[1], &self.w[2], &self.w[3]) {
                TetrahedronClosest::Outside(result) => {
                    self.cached = result;
                    let (p, q) = self.witnesses(&self.cached.barycentric, 4);
                    self.cached_p = p;
                    self.cached_q = q;
                    self.cached_v = p - q;
                    self.reduce_vertices(self.cached.used);
                    self.cached_valid = self.cached.is_valid();
                }
                TetrahedronClosest::Degenerate => {
                    self.cached.degenerate = true;
                    self.cached_valid = false;
                }
                TetrahedronClosest::ContainsOrigin => {
                    // Witness points keep their previous values.
                    self.cached_v = Vector3::zeros();
                    self.cached_valid = true;
                }
            },
        }
        self.cached_valid
    }
}

// =============================================================================
// Closest-point geometry
// =============================================================================

/// Closest point to the origin on triangle `abc`.
fn closest_on_triangle(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> SubSimplexClosest {
    let mut result = SubSimplexClosest::default();
    let ab = b - a;
    let ac = c - a;

    // Vertex region A
    let ap = -a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        result.point = *a;
        result.used[0] = true;
        result.set_barycentric(1.0, 0.0, 0.0, 0.0);
        return result;
    }

    // Vertex region B
    let bp = -b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        result.point = *b;
        result.used[1] = true;
        result.set_barycentric(0.0, 1.0, 0.0, 0.0);
        return result;
    }

    // Edge region AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        result.point = a + ab * v;
        result.used[0] = true;
        result.used[1] = true;
        result.set_barycentric(1.0 - v, v, 0.0, 0.0);
        return result;
    }

    // Vertex region C
    let cp = -c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        result.point = *c;
        result.used[2] = true;
        result.set_barycentric(0.0, 0.0, 1.0, 0.0);
        return result;
    }

    // Edge region AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        result.point = a + ac * w;
        result.used[0] = true;
        result.used[2] = true;
        result.set_barycentric(1.0 - w, 0.0, w, 0.0);
        return result;
    }

    // Edge region BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        result.point = b + (c - b) * w;
        result.used[1] = true;
        result.used[2] = true;
        result.set_barycentric(0.0, 1.0 - w, w, 0.0);
        return result;
    }

    // Face region
    let sum = va + vb + vc;
    if sum == 0.0 {
        // Zero-area triangle that slipped past the edge tests.
        result.point = *a;
        result.used[0] = true;
        result.set_barycentric(1.0, 0.0, 0.0, 0.0);
        result.degenerate = true;
        return result;
    }
    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    result.point = a + ab * v + ac * w;
    result.used[0] = true;
    result.used[1] = true;
    result.used[2] = true;
    result.set_barycentric(1.0 - v - w, v, w, 0.0);
    result
}

/// Which side of plane `abc` the origin lies on, relative to `d`.
///
/// `Some(true)` when the origin and `d` are on opposite sides, `None` when
/// `d` lies (almost) in the plane.
fn origin_outside_of_plane(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
) -> Option<bool> {
    let normal = (b - a).cross(&(c - a));
    let sign_origin = (-a).dot(&normal);
    let sign_d = (d - a).dot(&normal);
    if sign_d * sign_d < DEGENERATE_TETRAHEDRON_EPSILON {
        return None;
    }
    Some(sign_origin * sign_d < 0.0)
}

enum TetrahedronClosest {
    Outside(SubSimplexClosest),
    ContainsOrigin,
    Degenerate,
}

/// Closest point to the origin on tetrahedron `abcd`.
fn closest_on_tetrahedron(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
) -> TetrahedronClosest {
    let faces = (
        origin_outside_of_plane(a, b, c, d),
        origin_outside_of_plane(a, c, d, b),
        origin_outside_of_plane(a, d, b, c),
        origin_outside_of_plane(b, d, c, a),
    );
    let (Some(abc), Some(acd), Some(adb), Some(bdc)) = faces else {
        return TetrahedronClosest::Degenerate;
    };
    if !(abc || acd || adb || bdc) {
        return TetrahedronClosest::ContainsOrigin;
    }

    let mut best = SubSimplexClosest::default();
    let mut best_sq = f64::MAX;
    let mut consider = |tri: SubSimplexClosest, map: [usize; 3]| {
        let sq = tri.point.norm_squared();
        if sq < best_sq {
            best_sq = sq;
            best = SubSimplexClosest::default();
            best.point = tri.point;
            for (k, &slot) in map.iter().enumerate() {
                best.used[slot] = tri.used[k];
                best.barycentric[slot] = tri.barycentric[k];
            }
        }
    };

    if abc {
        consider(closest_on_triangle(a, b, c), [0, 1, 2]);
    }
    if acd {
        consider(closest_on_triangle(a, c, d), [0, 2, 3]);
    }
    if adb {
        consider(closest_on_triangle(a, d, b), [0, 3, 1]);
    }
    if bdc {
        consider(closest_on_triangle(b, d, c), [1, 3, 2]);
    }
    TetrahedronClosest::Outside(best)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn add(simplex: &mut VoronoiSimplex, w: Vector3<f64>) {
        simplex.add_vertex(w, Point3::from(w), Point3::origin());
    }

    #[test]
    fn test_single_vertex() {
        let mut s = VoronoiSimplex::new();
        assert!(s.closest().is_none());
        add(&mut s, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(s.closest().unwrap(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(s.num_vertices(), 1);
    }

    #[test]
    fn test_segment_interior() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(-1.0, 1.0, 0.0));
        add(&mut s, Vector3::new(1.0, 1.0, 0.0));
        let v = s.closest().unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_eq!(s.num_vertices(), 2);
    }

    #[test]
    fn test_segment_reduces_to_vertex() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(3.0, 0.0, 0.0));
        add(&mut s, Vector3::new(1.0, 0.0, 0.0));
        let v = s.closest().unwrap();
        assert_relative_eq!(v, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(s.num_vertices(), 1);
        assert_eq!(s.vertices()[0], Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_triangle_face() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(-1.0, -1.0, 2.0));
        add(&mut s, Vector3::new(2.0, -1.0, 2.0));
        add(&mut s, Vector3::new(-1.0, 2.0, 2.0));
        let v = s.closest().unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
        assert_eq!(s.num_vertices(), 3);
    }

    #[test]
    fn test_triangle_edge_region() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(-1.0, 1.0, 0.0));
        add(&mut s, Vector3::new(1.0, 1.0, 0.0));
        add(&mut s, Vector3::new(0.0, 3.0, 0.0));
        let v = s.closest().unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_eq!(s.num_vertices(), 2);
    }

    #[test]
    fn test_tetrahedron_containing_origin() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(1.0, 0.0, -1.0));
        add(&mut s, Vector3::new(-1.0, 1.0, -1.0));
        add(&mut s, Vector3::new(-1.0, -1.0, -1.0));
        add(&mut s, Vector3::new(0.0, 0.0, 1.0));
        assert!(s.full_simplex());
        let v = s.closest().unwrap();
        assert_eq!(v, Vector3::zeros());
    }

    #[test]
    fn test_tetrahedron_outside() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(1.0, 0.0, 1.0));
        add(&mut s, Vector3::new(-1.0, 1.0, 1.0));
        add(&mut s, Vector3::new(-1.0, -1.0, 1.0));
        add(&mut s, Vector3::new(0.0, 0.0, 3.0));
        let v = s.closest().unwrap();
        assert_relative_eq!(v, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_eq!(s.num_vertices(), 3);
    }

    #[test]
    fn test_flat_tetrahedron_is_degenerate() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(1.0, 0.0, 1.0));
        add(&mut s, Vector3::new(-1.0, 1.0, 1.0));
        add(&mut s, Vector3::new(-1.0, -1.0, 1.0));
        add(&mut s, Vector3::new(0.0, 0.5, 1.0));
        assert!(s.closest().is_none());
    }

    #[test]
    fn test_in_simplex() {
        let mut s = VoronoiSimplex::new();
        add(&mut s, Vector3::new(1.0, 0.0, 0.0));
        assert!(s.in_simplex(&Vector3::new(1.0, 0.005, 0.0)));
        assert!(!s.in_simplex(&Vector3::new(1.0, 0.5, 0.0)));
        s.reset();
        assert_eq!(s.num_vertices(), 0);
        assert!(!s.in_simplex(&Vector3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_witness_points_follow_barycentrics() {
        let mut s = VoronoiSimplex::new();
        s.add_vertex(
            Vector3::new(-1.0, 1.0, 0.0),
            Point3::new(-1.0, 2.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        s.add_vertex(
            Vector3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let (p, q) = s.compute_points();
        assert_relative_eq!(p, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(q, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(s.max_vertex(), 2.0);
    }
}
