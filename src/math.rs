//! Vector and geometry primitives shared by every pipeline stage (C1).

use glam::{IVec3, IVec4, Vec3, Vec3A};

/// Barycentric-height tolerance used when a point must lie exactly on a
/// triangle's plane (detail mesh sampling, closest-point queries).
pub const HEIGHT_EPSILON: f32 = 1e-4;
/// Distance under which two funnel points are treated as coincident.
pub const FUNNEL_EPSILON: f32 = 0.001;
/// Horizontal slab tolerance used by raycasts and portal overlap tests.
pub const SLAB_EPSILON: f32 = 0.01;

/// Axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Aabb::new(first, first);
        for point in iter {
            aabb.min = aabb.min.min(point);
            aabb.max = aabb.max.max(point);
        }
        Some(aabb)
    }

    pub fn expand(&self, amount: f32) -> Self {
        Aabb::new(self.min - Vec3::splat(amount), self.max + Vec3::splat(amount))
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point_xz(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

/// 2D cross product sign test (z of `(b-a) x (c-a)`), used throughout the
/// contour/polygon stages on integer cell coordinates taken as `(x, z)`.
#[inline]
pub fn triangle_area_2d_ivec(a: IVec3, b: IVec3, c: IVec3) -> i32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    abx * acz - acx * abz
}

/// Same as [`triangle_area_2d_ivec`] but over the `(x, z)` components of an
/// `IVec4` (used by the mesher, whose vertices carry a region tag in `w`).
#[inline]
pub fn triangle_area_2d_ivec4(a: IVec4, b: IVec4, c: IVec4) -> i32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    abx * acz - acx * abz
}

/// Signed area of the triangle `(a, b, c)` in the xz-plane, in world units.
/// Used by the funnel algorithm during straight-path extraction.
#[inline]
pub fn triangle_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    abx * acz - acx * abz
}

/// True if `c` lies strictly to the left of the directed line `a -> b`.
#[inline]
pub fn left(a: IVec4, b: IVec4, c: IVec4) -> bool {
    triangle_area_2d_ivec4(a, b, c) < 0
}

/// True if `c` lies to the left of or on the directed line `a -> b`.
#[inline]
pub fn left_on(a: IVec4, b: IVec4, c: IVec4) -> bool {
    triangle_area_2d_ivec4(a, b, c) <= 0
}

/// True if `c` lies collinear with `a -> b`.
#[inline]
pub fn collinear(a: IVec4, b: IVec4, c: IVec4) -> bool {
    triangle_area_2d_ivec4(a, b, c) == 0
}

/// Proper segment intersection test (`ab` crosses `cd`, endpoints excluded).
pub fn intersect_prop(a: IVec4, b: IVec4, c: IVec4, d: IVec4) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }

    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

fn between(a: IVec4, b: IVec4, c: IVec4) -> bool {
    if !collinear(a, b, c) {
        return false;
    }

    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

/// Segment intersection including touching endpoints/collinear overlap.
pub fn intersect(a: IVec4, b: IVec4, c: IVec4, d: IVec4) -> bool {
    if intersect_prop(a, b, c, d) {
        return true;
    }

    between(a, b, c) || between(a, b, d) || between(c, d, a) || between(c, d, b)
}

/// True if `point` lies inside the cone formed at vertex `i` of `vertices`
/// by its two neighbours `i-1` and `i+1`. Used by ear-clipping (C6) and
/// contour-hole merging (C5) to test whether a candidate diagonal stays
/// inside the polygon at the vertex it starts from.
pub fn in_cone(i: usize, vertices: &[IVec4], point: IVec4) -> bool {
    let n = vertices.len();
    let pi = vertices[i];
    let pi1 = vertices[(i + 1) % n];
    let pin1 = vertices[(i + n - 1) % n];

    if left_on(pin1, pi, pi1) {
        left(pi, point, pin1) && left(point, pi, pi1)
    } else {
        !(left_on(pi, point, pi1) && left_on(point, pi, pin1))
    }
}

/// Linear barycentric height of `point` (xz only) above the triangle
/// `(a, b, c)`, returning `None` when `point` is outside the triangle in xz.
pub fn closest_height_in_triangle(point: Vec3A, a: Vec3A, b: Vec3A, c: Vec3A) -> Option<f32> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = point - a;

    let dot00 = v0.x * v0.x + v0.z * v0.z;
    let dot01 = v0.x * v1.x + v0.z * v1.z;
    let dot02 = v0.x * v2.x + v0.z * v2.z;
    let dot11 = v1.x * v1.x + v1.z * v1.z;
    let dot12 = v1.x * v2.x + v1.z * v2.z;

    let denom = dot00 * dot11 - dot01 * dot01;
    const EPS: f32 = HEIGHT_EPSILON;
    if denom.abs() < EPS {
        return None;
    }

    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        Some(a.y + v0.y * u + v1.y * v)
    } else {
        None
    }
}

/// Closest point on the closed segment `[a, b]` to `point`, xz-plane only.
pub fn closest_point_on_segment_2d(point: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let t = if ab.x.abs() < f32::EPSILON && ab.z.abs() < f32::EPSILON {
        0.0
    } else {
        let t = ((point.x - a.x) * ab.x + (point.z - a.z) * ab.z) / (ab.x * ab.x + ab.z * ab.z);
        t.clamp(0.0, 1.0)
    };
    a + ab * t
}

/// Squared 2D distance between `a` and `b` in the xz-plane.
pub fn distance_squared_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_overlap_symmetric() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let b = Aabb::new(Vec3::splat(1.0), Vec3::splat(3.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        let c = Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn left_turn_detection() {
        let a = IVec4::new(0, 0, 0, 0);
        let b = IVec4::new(10, 0, 0, 0);
        let c = IVec4::new(10, 0, 10, 0);
        assert!(left(a, b, c));
        assert!(!left(a, c, b));
    }

    #[test]
    fn barycentric_height_inside_triangle() {
        let a = Vec3A::new(0.0, 0.0, 0.0);
        let b = Vec3A::new(10.0, 0.0, 0.0);
        let c = Vec3A::new(0.0, 10.0, 10.0);
        let point = Vec3A::new(2.0, 0.0, 2.0);
        let height = closest_height_in_triangle(point, a, b, c).unwrap();
        assert!((height - 2.0).abs() < 1e-3);
    }

    #[test]
    fn barycentric_height_outside_triangle() {
        let a = Vec3A::new(0.0, 0.0, 0.0);
        let b = Vec3A::new(1.0, 0.0, 0.0);
        let c = Vec3A::new(0.0, 0.0, 1.0);
        let point = Vec3A::new(5.0, 0.0, 5.0);
        assert!(closest_height_in_triangle(point, a, b, c).is_none());
    }
}
