use serde::{Deserialize, Serialize};

use crate::{DssError, DssResult};

pub const EARTH_RADIUS_KM: f64 = 6371.01;
const METERS_PER_KM: f64 = 1000.0;
/// Signed areas within this band are treated as a degenerate loop.
const AREA_EPSILON_KM2: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(self) -> DssResult<Self> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(DssError::bad_request("coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(DssError::bad_request(format!(
                "latitude {} is out of range",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(DssError::bad_request(format!(
                "longitude {} is out of range",
                self.lng
            )));
        }
        Ok(self)
    }

    pub fn to_xyz(self) -> (f64, f64, f64) {
        let (lat, lng) = (self.lat.to_radians(), self.lng.to_radians());
        (lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin())
    }

    /// Great-circle distance in meters.
    pub fn distance_m(self, other: LatLng) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * METERS_PER_KM * h.sqrt().min(1.0).asin()
    }

    /// Point reached travelling `distance_m` from here along `bearing_deg`.
    pub fn destination(self, bearing_deg: f64, distance_m: f64) -> LatLng {
        let delta = distance_m / (EARTH_RADIUS_KM * METERS_PER_KM);
        let theta = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lng1 = self.lng.to_radians();
        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lng2 = lng1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());
        LatLng::new(lat2.to_degrees(), normalize_lng(lng2.to_degrees()))
    }
}

pub fn normalize_lng(lng: f64) -> f64 {
    let mut value = (lng + 180.0) % 360.0;
    if value < 0.0 {
        value += 360.0;
    }
    value - 180.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub vertices: Vec<LatLng>,
}

impl GeoPolygon {
    pub fn new(vertices: Vec<LatLng>) -> Self {
        Self { vertices }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCircle {
    pub center: LatLng,
    pub radius_m: f64,
}

/// A horizontal area, either a closed loop of vertices or a circle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Footprint {
    Polygon(GeoPolygon),
    Circle(GeoCircle),
}

/// Signed spherical area of a loop in km², positive when counter-clockwise.
pub fn signed_loop_area_km2(vertices: &[LatLng]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (idx, a) in vertices.iter().enumerate() {
        let b = vertices[(idx + 1) % vertices.len()];
        let mut dlng = (b.lng - a.lng).to_radians();
        if dlng > std::f64::consts::PI {
            dlng -= 2.0 * std::f64::consts::PI;
        } else if dlng < -std::f64::consts::PI {
            dlng += 2.0 * std::f64::consts::PI;
        }
        sum += dlng * (2.0 + a.lat.to_radians().sin() + b.lat.to_radians().sin());
    }
    -0.5 * sum * EARTH_RADIUS_KM * EARTH_RADIUS_KM
}

/// Area enclosed by a loop read counter-clockwise. A clockwise loop encloses
/// the complement, i.e. nearly the whole sphere.
pub fn loop_area_km2(vertices: &[LatLng]) -> f64 {
    let signed = signed_loop_area_km2(vertices);
    if signed.abs() < AREA_EPSILON_KM2 {
        0.0
    } else if signed > 0.0 {
        signed
    } else {
        sphere_area_km2() + signed
    }
}

pub fn sphere_area_km2() -> f64 {
    4.0 * std::f64::consts::PI * EARTH_RADIUS_KM * EARTH_RADIUS_KM
}

/// Parses a flattened `lat,lng,lat,lng,...` string into polygon vertices.
pub fn parse_area(raw: &str) -> DssResult<GeoPolygon> {
    let coords = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| DssError::bad_request(format!("invalid coordinate '{part}'")))
        })
        .collect::<DssResult<Vec<f64>>>()?;
    if coords.len() % 2 != 0 {
        return Err(DssError::bad_request(
            "area requires an even number of coordinates",
        ));
    }
    if coords.len() < 6 {
        return Err(DssError::bad_request("area requires at least 3 points"));
    }
    let vertices = coords
        .chunks_exact(2)
        .map(|pair| LatLng::new(pair[0], pair[1]).validate())
        .collect::<DssResult<Vec<_>>>()?;
    Ok(GeoPolygon::new(vertices))
}

#[cfg(test)]
mod tests {
    use super::{LatLng, loop_area_km2, parse_area, signed_loop_area_km2, sphere_area_km2};
    use crate::ErrorKind;

    fn square(size_deg: f64) -> Vec<LatLng> {
        vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, size_deg),
            LatLng::new(size_deg, size_deg),
            LatLng::new(size_deg, 0.0),
        ]
    }

    #[test]
    fn counter_clockwise_square_has_positive_area() {
        let area = signed_loop_area_km2(&square(0.1));
        // 0.1 deg at the equator is ~11.1 km.
        assert!((area - 123.6).abs() < 1.0, "area={area}");
    }

    #[test]
    fn clockwise_loop_encloses_complement() {
        let mut vertices = square(0.1);
        vertices.reverse();
        let area = loop_area_km2(&vertices);
        assert!(area > sphere_area_km2() - 200.0);
    }

    #[test]
    fn distance_and_destination_agree() {
        let origin = LatLng::new(46.0, 7.0);
        let dest = origin.destination(45.0, 1_500.0);
        assert!((origin.distance_m(dest) - 1_500.0).abs() < 1.0);
    }

    #[test]
    fn parse_area_rejects_malformed_input() {
        assert!(parse_area("1,2,3,4,5,6").is_ok());
        let odd = parse_area("1,2,3,4,5").expect_err("odd");
        assert_eq!(odd.kind(), ErrorKind::BadRequest);
        assert!(parse_area("1,2,3,4").is_err());
        assert!(parse_area("1,2,3,x,5,6").is_err());
        assert!(parse_area("91,2,3,4,5,6").is_err());
    }
}
