// Boundary to the agency feed and the road-routing service.  The HTTP
// transport lives outside this crate; callers hand us payload text or
// implement the traits directly.
use std::error::Error;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use xml::attribute::OwnedAttribute;
use xml::reader::EventReader;
use xml::reader::XmlEvent;

use super::geometry::GeoPoint;

/// A stop element exactly as the feed lists it, direction suffixes included.
#[derive(PartialEq, Debug, Clone)]
pub struct RawStop {
    pub tag: String,
    pub title: String,
    pub lat: f64,
    pub lon: f64,
}

/// One route's topology: its stop list plus the ordered stop-tag sequence of
/// each direction the route runs in.
#[derive(PartialEq, Debug, Clone)]
pub struct RawRoute {
    pub tag: String,
    pub stops: Vec<RawStop>,
    pub directions: Vec<Vec<String>>,
}

/// One scheduled arrival of a vehicle at a stop.
#[derive(PartialEq, Debug, Clone)]
pub struct TripArrival {
    pub trip_id: String,
    pub minutes: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DirectionPredictions {
    pub direction: String,
    pub trips: Vec<TripArrival>,
}

/// Live arrival predictions at one stop, grouped by direction.
#[derive(PartialEq, Debug, Clone)]
pub struct StopPredictions {
    pub stop_tag: String,
    pub directions: Vec<DirectionPredictions>,
}

/// The agency feed: route topology and live arrival predictions.
pub trait TransitFeed {
    fn route_list(&self) -> Result<Vec<String>, Box<dyn Error>>;
    fn route_config(&self, route_tag: &str) -> Result<RawRoute, Box<dyn Error>>;
    fn predictions(&self, route_tag: &str, stop_tags: &[String])
                   -> Result<Vec<StopPredictions>, Box<dyn Error>>;
}

/// The routing service: road distances in km for parallel origin/destination
/// lists, returned in the same order.  Callers chunk their requests to the
/// service's per-request pair limit.
pub trait RoadDistanceService {
    fn road_distances(&self, origins: &[GeoPoint], destinations: &[GeoPoint])
                      -> Result<Vec<f64>, Box<dyn Error>>;
}

fn get_attribute(attributes: &Vec<OwnedAttribute>, attr_name: &str) -> Option<String> {
    match attributes.iter().find(|attr| attr.name.local_name == attr_name) {
        Some(attr) => Some(attr.value.clone()),
        None => None,
    }
}

fn require_attribute(attributes: &Vec<OwnedAttribute>, attr_name: &str, elem_name: &str)
                     -> Result<String, Box<dyn Error>> {
    match get_attribute(attributes, attr_name) {
        Some(value) => Ok(value),
        None => Err(format!("{} element has no {} attribute", elem_name, attr_name).into()),
    }
}

/// Parse a routeList payload into the list of route tags.
pub fn parse_route_list_xml(payload: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let mut parser = EventReader::new(payload.as_bytes());
    let mut route_tags = vec![];
    loop {
        match parser.next()? {
            XmlEvent::EndDocument => break,
            XmlEvent::StartElement{ name, attributes, .. } if name.local_name == "route" => {
                route_tags.push(require_attribute(&attributes, "tag", "route")?);
            }
            _ => (),
        }
    }

    Ok(route_tags)
}

/// Parse a routeConfig payload into the route's stop list and direction
/// paths.  All stop elements are kept verbatim here; filtering out
/// direction-suffixed duplicates is the extractor's job.
pub fn parse_route_config_xml(payload: &str) -> Result<RawRoute, Box<dyn Error>> {
    let mut parser = EventReader::new(payload.as_bytes());
    let mut route_tag = None;
    let mut stops = vec![];
    let mut directions: Vec<Vec<String>> = vec![];
    let mut in_direction = false;
    loop {
        match parser.next()? {
            XmlEvent::EndDocument => break,
            XmlEvent::StartElement{ name, attributes, .. } => {
                match name.local_name.as_str() {
                    "route" => {
                        route_tag = Some(require_attribute(&attributes, "tag", "route")?);
                    }
                    "direction" => {
                        in_direction = true;
                        directions.push(vec![]);
                    }
                    "stop" if in_direction => {
                        let tag = require_attribute(&attributes, "tag", "stop")?;
                        directions.last_mut().unwrap().push(tag);
                    }
                    "stop" => {
                        let tag = require_attribute(&attributes, "tag", "stop")?;
                        let title = get_attribute(&attributes, "title").unwrap_or_default();
                        let lat = require_attribute(&attributes, "lat", "stop")?.parse()?;
                        let lon = require_attribute(&attributes, "lon", "stop")?.parse()?;
                        stops.push(RawStop{tag, title, lat, lon});
                    }
                    _ => (),
                }
            }
            XmlEvent::EndElement{ name } if name.local_name == "direction" => {
                in_direction = false;
            }
            _ => (),
        }
    }

    match route_tag {
        Some(tag) => Ok(RawRoute{tag, stops, directions}),
        None => Err("routeConfig payload has no route element".into()),
    }
}

/// Parse a predictions payload into per-stop, per-direction arrival lists.
pub fn parse_predictions_xml(payload: &str) -> Result<Vec<StopPredictions>, Box<dyn Error>> {
    let mut parser = EventReader::new(payload.as_bytes());
    let mut all_predictions: Vec<StopPredictions> = vec![];
    loop {
        match parser.next()? {
            XmlEvent::EndDocument => break,
            XmlEvent::StartElement{ name, attributes, .. } => {
                match name.local_name.as_str() {
                    "predictions" => {
                        let stop_tag = require_attribute(&attributes, "stopTag", "predictions")?;
                        all_predictions.push(StopPredictions{stop_tag, directions: vec![]});
                    }
                    "direction" => {
                        let title = get_attribute(&attributes, "title").unwrap_or_default();
                        match all_predictions.last_mut() {
                            Some(sp) => sp.directions.push(
                                DirectionPredictions{direction: title, trips: vec![]}),
                            None => return Err(
                                "direction element outside a predictions element".into()),
                        }
                    }
                    "prediction" => {
                        let trip_id = require_attribute(&attributes, "tripTag", "prediction")?;
                        let minutes = require_attribute(&attributes, "minutes", "prediction")?
                            .parse()?;
                        let direction = all_predictions.last_mut()
                            .and_then(|sp| sp.directions.last_mut());
                        match direction {
                            Some(dd) => dd.trips.push(TripArrival{trip_id, minutes}),
                            None => return Err(
                                "prediction element outside a direction element".into()),
                        }
                    }
                    _ => (),
                }
            }
            _ => (),
        }
    }

    Ok(all_predictions)
}

/// A feed that reads previously fetched payloads from a directory:
/// `route_list.xml`, `route_<tag>.xml` and `predictions_<tag>.xml`.
pub struct FileFeed {
    feed_dir: PathBuf,
}

impl FileFeed {
    pub fn new(feed_dir: &Path) -> FileFeed {
        FileFeed{feed_dir: PathBuf::from(feed_dir)}
    }

    fn read_payload(&self, file_name: &str) -> Result<String, Box<dyn Error>> {
        let path = self.feed_dir.join(file_name);
        match fs::read_to_string(&path) {
            Ok(payload) => Ok(payload),
            Err(_) => Err(format!("feed payload missing: {}", path.display()).into()),
        }
    }
}

impl TransitFeed for FileFeed {
    fn route_list(&self) -> Result<Vec<String>, Box<dyn Error>> {
        parse_route_list_xml(&self.read_payload("route_list.xml")?)
    }

    fn route_config(&self, route_tag: &str) -> Result<RawRoute, Box<dyn Error>> {
        parse_route_config_xml(&self.read_payload(&format!("route_{}.xml", route_tag))?)
    }

    // the saved payload is already scoped to the route, so the stop list is
    // not consulted here
    fn predictions(&self, route_tag: &str, _stop_tags: &[String])
                   -> Result<Vec<StopPredictions>, Box<dyn Error>> {
        parse_predictions_xml(&self.read_payload(&format!("predictions_{}.xml", route_tag))?)
    }
}

/// A distance service that approximates road distance as straight-line
/// distance scaled by a fixed beeline factor.  Stands in when no routing
/// backend is wired up.
pub struct BeelineDistances {
    pub radius_km: f64,
    pub beeline_factor: f64,
}

impl RoadDistanceService for BeelineDistances {
    fn road_distances(&self, origins: &[GeoPoint], destinations: &[GeoPoint])
                      -> Result<Vec<f64>, Box<dyn Error>> {
        if origins.len() != destinations.len() {
            return Err("origin and destination lists differ in length".into());
        }
        let distances = origins.iter().zip(destinations.iter())
            .map(|(oo, dd)| oo.haversine_distance(dd, self.radius_km) * self.beeline_factor)
            .collect();
        Ok(distances)
    }
}
