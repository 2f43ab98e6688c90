/// Roughly how many degrees of latitude are spanned by one kilometre.  Used to
/// convert walking-distance cutoffs to degree windows when sampling.
pub static DEGREES_PER_KM: f64 = 0.009;

#[derive(PartialEq, Debug, Clone)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint{lat, lon}
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.lat, self.lon]
    }

    /// Great-circle distance in km between two points on a sphere of the
    /// given radius.
    pub fn haversine_distance(&self, other: &GeoPoint, radius_km: f64) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let aa = (dlat / 2.).sin().powi(2) +
                 lat1.cos() * lat2.cos() * (dlon / 2.).sin().powi(2);
        let cc = 2. * aa.sqrt().atan2((1. - aa).sqrt());
        return radius_km * cc;
    }

    /// Arithmetic mean of the two coordinate pairs.
    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        GeoPoint::new((self.lat + other.lat) / 2., (self.lon + other.lon) / 2.)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// The tightest box around a set of points.
    pub fn around(points: &Vec<GeoPoint>) -> BoundingBox {
        let mut bbox = BoundingBox{
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        };
        for point in points {
            bbox.min_lat = bbox.min_lat.min(point.lat);
            bbox.max_lat = bbox.max_lat.max(point.lat);
            bbox.min_lon = bbox.min_lon.min(point.lon);
            bbox.max_lon = bbox.max_lon.max(point.lon);
        }
        return bbox;
    }

    /// Grow the box on all sides by a margin given in km.
    pub fn expand_by_km(&mut self, margin_km: f64) {
        let margin_deg = margin_km * DEGREES_PER_KM;
        self.min_lat -= margin_deg;
        self.max_lat += margin_deg;
        self.min_lon -= margin_deg;
        self.max_lon += margin_deg;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    static EARTH_RADIUS_KM: f64 = 6371.;

    #[test]
    fn test_haversine_symmetry() {
        let points = vec![
            GeoPoint::new(43.6532, -79.3832),
            GeoPoint::new(43.7, -79.4),
            GeoPoint::new(0., 0.),
            GeoPoint::new(-33.8688, 151.2093),
        ];
        for p1 in &points {
            for p2 in &points {
                let d12 = p1.haversine_distance(p2, EARTH_RADIUS_KM);
                let d21 = p2.haversine_distance(p1, EARTH_RADIUS_KM);
                assert_relative_eq!(d12, d21, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_haversine_small_separation() {
        // two stops 0.0003 degrees of longitude apart on the equator are
        // about 33 metres apart
        let aa = GeoPoint::new(0., 0.);
        let bb = GeoPoint::new(0., 0.0003);
        let dist = aa.haversine_distance(&bb, EARTH_RADIUS_KM);
        assert_relative_eq!(dist, 0.03336, epsilon = 1e-4);
    }

    #[test]
    fn test_midpoint() {
        let aa = GeoPoint::new(10., 20.);
        let bb = GeoPoint::new(20., 40.);
        assert_eq!(aa.midpoint(&bb), GeoPoint::new(15., 30.));
    }

    #[test]
    fn test_bounding_box() {
        let points = vec![
            GeoPoint::new(1., 5.),
            GeoPoint::new(-2., 7.),
            GeoPoint::new(0.5, 6.),
        ];
        let mut bbox = BoundingBox::around(&points);
        assert_eq!(bbox.min_lat, -2.);
        assert_eq!(bbox.max_lat, 1.);
        assert_eq!(bbox.min_lon, 5.);
        assert_eq!(bbox.max_lon, 7.);

        bbox.expand_by_km(1.);
        assert_relative_eq!(bbox.min_lat, -2. - DEGREES_PER_KM);
        assert_relative_eq!(bbox.max_lon, 7. + DEGREES_PER_KM);
    }
}
