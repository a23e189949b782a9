use nalgebra::{Point2, Point3};
use relief_types::Aabb;

/// Uniform XY bucket grid over triangle bounding boxes.
#[derive(Debug, Clone)]
pub(crate) struct BucketIndex {
    min: Point2<f64>,
    cell: f64,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<u32>>,
}

impl BucketIndex {
    pub(crate) fn build(bounds: &Aabb, triangles: &[[Point3<f64>; 3]]) -> Self {
        let ext = bounds.extent();
        let area = (ext.x * ext.y).max(f64::MIN_POSITIVE);
        let target = (triangles.len() as f64 / 2.0).max(1.0);
        let mut cell = (area / target).sqrt();
        if !(cell.is_finite() && cell > 0.0) {
            cell = ext.x.max(ext.y).max(1.0);
        }
        let cols = ((ext.x / cell).floor() as usize + 1).clamp(1, 4096);
        let rows = ((ext.y / cell).floor() as usize + 1).clamp(1, 4096);
        let cell = cell.max(ext.x / cols as f64).max(ext.y / rows as f64);
        let mut index = Self {
            min: Point2::new(bounds.min.x, bounds.min.y),
            cell,
            cols,
            rows,
            buckets: vec![Vec::new(); cols * rows],
        };
        for (ti, tri) in triangles.iter().enumerate() {
            let lo_x = tri.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
            let hi_x = tri.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
            let lo_y = tri.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
            let hi_y = tri.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
            let (c0, r0) = index.cell_of(lo_x, lo_y);
            let (c1, r1) = index.cell_of(hi_x, hi_y);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    index.buckets[r * cols + c].push(ti as u32);
                }
            }
        }
        index
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let c = ((x - self.min.x) / self.cell).floor().max(0.0) as usize;
        let r = ((y - self.min.y) / self.cell).floor().max(0.0) as usize;
        (c.min(self.cols - 1), r.min(self.rows - 1))
    }

    pub(crate) fn candidates(&self, x: f64, y: f64) -> &[u32] {
        let (c, r) = self.cell_of(x, y);
        &self.buckets[r * self.cols + c]
    }
}
