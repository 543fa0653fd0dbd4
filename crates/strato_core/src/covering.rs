//! Maps footprints onto a Cell Union at one fixed level.
//!
//! Edges are walked at a fine spacing and the interior is filled by
//! scanlines, so every cell touched by the boundary or containing an
//! interior sample ends up in the union. Cells are never merged into
//! coarser parents.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cell::{CellId, DEFAULT_LEVEL, MAX_LEVEL};
use crate::geo::{
    Footprint, GeoCircle, GeoPolygon, LatLng, loop_area_km2, normalize_lng,
};
use crate::{DssError, DssResult};

pub const DEFAULT_MAX_AREA_KM2: f64 = 2500.0;

const EDGE_STEP_M: f64 = 50.0;
const INTERIOR_STEP_M: f64 = 250.0;
const METERS_PER_DEGREE_LAT: f64 = 111_195.0;
const CIRCLE_VERTICES: usize = 32;
const DEGENERATE_AREA_DEG2: f64 = 1e-12;

/// Sorted, duplicate-free set of cells at one level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellUnion(Vec<CellId>);

impl CellUnion {
    pub fn from_cells(cells: impl IntoIterator<Item = CellId>) -> Self {
        let mut cells: Vec<CellId> = cells.into_iter().collect();
        cells.sort_unstable();
        cells.dedup();
        Self(cells)
    }

    pub fn cells(&self) -> &[CellId] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.0.binary_search(&cell).is_ok()
    }

    pub fn intersects(&self, other: &CellUnion) -> bool {
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.cmp(y) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    pub fn contains_all(&self, other: &CellUnion) -> bool {
        other.0.iter().all(|cell| self.contains(*cell))
    }

    pub fn union(&self, other: &CellUnion) -> CellUnion {
        Self::from_cells(self.0.iter().chain(other.0.iter()).copied())
    }

    pub fn as_i64s(&self) -> Vec<i64> {
        self.0.iter().map(|cell| cell.as_i64()).collect()
    }
}

impl FromIterator<CellId> for CellUnion {
    fn from_iter<I: IntoIterator<Item = CellId>>(iter: I) -> Self {
        Self::from_cells(iter)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Coverer {
    level: u8,
    max_area_km2: f64,
}

impl Default for Coverer {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL, DEFAULT_MAX_AREA_KM2)
    }
}

impl Coverer {
    pub fn new(level: u8, max_area_km2: f64) -> Self {
        Self {
            level: level.min(MAX_LEVEL),
            max_area_km2,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn max_area_km2(&self) -> f64 {
        self.max_area_km2
    }

    pub fn cover(&self, footprint: &Footprint) -> DssResult<CellUnion> {
        match footprint {
            Footprint::Polygon(polygon) => self.cover_polygon(polygon),
            Footprint::Circle(circle) => self.cover_circle(circle),
        }
    }

    pub fn cover_polygon(&self, polygon: &GeoPolygon) -> DssResult<CellUnion> {
        let mut vertices = polygon
            .vertices
            .iter()
            .map(|vertex| vertex.validate())
            .collect::<DssResult<Vec<_>>>()?;
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        let distinct = vertices
            .iter()
            .map(|vertex| (vertex.lat.to_bits(), vertex.lng.to_bits()))
            .collect::<BTreeSet<_>>();
        if distinct.len() < 3 {
            return Err(DssError::bad_request(
                "polygon requires at least 3 distinct vertices",
            ));
        }

        if loop_area_km2(&vertices) > self.max_area_km2 {
            let reversed = vertices.iter().rev().copied().collect::<Vec<_>>();
            if loop_area_km2(&reversed) > self.max_area_km2 {
                return Err(DssError::bad_request(format!(
                    "area too large: exceeds {} km2",
                    self.max_area_km2
                )));
            }
        }
        Ok(self.cover_loop(&vertices))
    }

    pub fn cover_circle(&self, circle: &GeoCircle) -> DssResult<CellUnion> {
        let center = circle.center.validate()?;
        if !circle.radius_m.is_finite() || circle.radius_m <= 0.0 {
            return Err(DssError::bad_request("circle radius must be positive"));
        }
        let radius_km = circle.radius_m / 1000.0;
        if std::f64::consts::PI * radius_km * radius_km > self.max_area_km2 {
            return Err(DssError::bad_request(format!(
                "area too large: exceeds {} km2",
                self.max_area_km2
            )));
        }
        let vertices = (0..CIRCLE_VERTICES)
            .map(|idx| {
                let bearing = 360.0 * idx as f64 / CIRCLE_VERTICES as f64;
                center.destination(bearing, circle.radius_m)
            })
            .collect::<Vec<_>>();
        let mut union = self.cover_loop(&vertices);
        if !union.contains(self.cell_at(center.lat, center.lng)) {
            union = union.union(&CellUnion::from_cells([self.cell_at(center.lat, center.lng)]));
        }
        Ok(union)
    }

    fn cover_loop(&self, vertices: &[LatLng]) -> CellUnion {
        let points = unwrap_longitudes(vertices);
        let mut cells = BTreeSet::new();
        for (idx, a) in points.iter().enumerate() {
            let b = points[(idx + 1) % points.len()];
            self.sample_edge(*a, b, &mut cells);
        }
        if planar_area_deg2(&points).abs() > DEGENERATE_AREA_DEG2 {
            self.sample_interior(&points, &mut cells);
        }
        cells.into_iter().collect()
    }

    fn sample_edge(&self, a: (f64, f64), b: (f64, f64), cells: &mut BTreeSet<CellId>) {
        let length_m = LatLng::new(a.1, normalize_lng(a.0))
            .distance_m(LatLng::new(b.1, normalize_lng(b.0)));
        let steps = (length_m / EDGE_STEP_M).ceil().max(1.0) as usize;
        for step in 0..=steps {
            let t = step as f64 / steps as f64;
            let lng = a.0 + (b.0 - a.0) * t;
            let lat = a.1 + (b.1 - a.1) * t;
            cells.insert(self.cell_at(lat, lng));
        }
    }

    fn sample_interior(&self, points: &[(f64, f64)], cells: &mut BTreeSet<CellId>) {
        let lat_step = INTERIOR_STEP_M / METERS_PER_DEGREE_LAT;
        let lat_min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let lat_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let rows = ((lat_max - lat_min) / lat_step).ceil() as usize;
        for row in 0..=rows {
            let lat = (lat_min + row as f64 * lat_step).min(lat_max);
            let mut crossings = scanline_crossings(points, lat);
            crossings.sort_by(f64::total_cmp);
            let lng_step = lat_step / lat.to_radians().cos().max(0.01);
            for pair in crossings.chunks_exact(2) {
                let (from, to) = (pair[0], pair[1]);
                let mut lng = from;
                while lng < to {
                    cells.insert(self.cell_at(lat, lng));
                    lng += lng_step;
                }
                cells.insert(self.cell_at(lat, to));
            }
        }
    }

    fn cell_at(&self, lat: f64, lng: f64) -> CellId {
        CellId::from_lat_lng(LatLng::new(lat.clamp(-90.0, 90.0), normalize_lng(lng)))
            .parent(self.level)
    }
}

/// Vertices as planar `(lng, lat)` with longitudes made continuous across the
/// antimeridian.
fn unwrap_longitudes(vertices: &[LatLng]) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(vertices.len());
    let mut previous: Option<(f64, LatLng)> = None;
    for vertex in vertices {
        let lng = match previous {
            Some((unwrapped, prior)) => unwrapped + normalize_lng(vertex.lng - prior.lng),
            None => vertex.lng,
        };
        points.push((lng, vertex.lat));
        previous = Some((lng, *vertex));
    }
    points
}

fn planar_area_deg2(points: &[(f64, f64)]) -> f64 {
    let mut sum = 0.0;
    for (idx, a) in points.iter().enumerate() {
        let b = points[(idx + 1) % points.len()];
        sum += a.0 * b.1 - b.0 * a.1;
    }
    sum / 2.0
}

fn scanline_crossings(points: &[(f64, f64)], lat: f64) -> Vec<f64> {
    let mut crossings = Vec::new();
    for (idx, a) in points.iter().enumerate() {
        let b = points[(idx + 1) % points.len()];
        let (lo, hi) = if a.1 <= b.1 { (*a, b) } else { (b, *a) };
        if lo.1 <= lat && lat < hi.1 {
            let t = (lat - lo.1) / (hi.1 - lo.1);
            crossings.push(lo.0 + (hi.0 - lo.0) * t);
        }
    }
    crossings
}
