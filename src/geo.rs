use serde_json::{json, Value as JsonValue};


/// Mean earth radius in meters.
const EARTH_RADIUS: f64 = 6_371_008.8;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Coordinates { lat, lng }
    }

    pub fn offset(&self, d_lat: f64, d_lng: f64) -> Self {
        Coordinates::new(self.lat + d_lat, self.lng + d_lng)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
            && self.lat >= -90.0 && self.lat <= 90.0
            && self.lng >= -180.0 && self.lng <= 180.0
    }

    pub fn to_pair(&self) -> JsonValue {
        json!([self.lat, self.lng])
    }
}


/// Great-circle distance in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS * h.sqrt().min(1.0).asin()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let p = Coordinates::new(17.537348, 78.384515);
        assert!(haversine_distance(p, p).abs() < 1e-6);
    }

    #[test]
    fn new_york_to_london() {
        let ny = Coordinates::new(40.7128, -74.0060);
        let london = Coordinates::new(51.5074, -0.1278);

        let km = haversine_distance(ny, london) / 1000.0;
        assert!((km - 5570.0).abs() < 15.0, "{}", km);
    }

    #[test]
    fn hundredth_degree_of_latitude() {
        let p = Coordinates::new(0.0, 0.0);
        let d = haversine_distance(p, p.offset(0.01, 0.0));
        assert!((d - 1112.0).abs() < 2.0, "{}", d);
    }

    #[test]
    fn validity() {
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, std::f64::NAN).is_valid());
    }
}
