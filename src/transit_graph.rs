use std::collections::HashMap;
use std::collections::HashSet;
use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use super::geometry::GeoPoint;

/// Sentinel for timing fields that have not been estimated yet.
pub static UNKNOWN: f64 = -1.;

/// A physical boarding location, identified by a stable tag.  `merged` holds
/// the tags of all original stops folded into this one, its own included.
#[derive(PartialEq, Debug, Clone)]
pub struct Stop {
    pub tag: String,
    pub title: String,
    pub lat: f64,
    pub lon: f64,
    pub merged: HashSet<String>,
}

impl Stop {
    pub fn new(tag: &str, title: &str, lat: f64, lon: f64) -> Stop {
        let mut merged = HashSet::new();
        merged.insert(String::from(tag));
        Stop {
            tag: String::from(tag),
            title: String::from(title),
            lat,
            lon,
            merged,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// A directed edge between two stops, labelled with every route that
/// traverses it in this direction.
#[derive(PartialEq, Debug, Clone)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub routes: HashSet<String>,
    /// straight-line km between the endpoints
    pub length: f64,
    /// routed km between the endpoints, never less than `length`
    pub road_length: f64,
    /// minutes, or UNKNOWN before estimation
    pub travel_time: f64,
}

impl Connection {
    pub fn new(from: &str, to: &str, route: &str) -> Connection {
        let mut routes = HashSet::new();
        routes.insert(String::from(route));
        Connection {
            from: String::from(from),
            to: String::from(to),
            routes,
            length: 0.,
            road_length: 0.,
            travel_time: UNKNOWN,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Route {
    pub tag: String,
    pub api: String,
    pub stops_count: usize,
    /// minutes; UNKNOWN when the route had no usable predictions
    pub wait_time_mean: f64,
    pub wait_time_std: f64,
}

impl Route {
    pub fn new(tag: &str, api: &str, stops_count: usize) -> Route {
        Route {
            tag: String::from(tag),
            api: String::from(api),
            stops_count,
            wait_time_mean: UNKNOWN,
            wait_time_std: UNKNOWN,
        }
    }
}

/// A census-style sector used only as a weight source when sampling
/// population-weighted trip endpoints.  Externally produced, never written.
#[derive(PartialEq, Debug, Clone)]
pub struct DemographicSector {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub population: f64,
    pub area: f64,
    pub density: f64,
}

// A convenience type for parsing csv data
type Row = HashMap<String, String>;

fn open_network_file(dir: &Path, name: &str) -> Result<File, Box<dyn Error>> {
    let path: PathBuf = [dir, Path::new(name)].iter().collect();
    match File::open(&path) {
        Ok(file) => Ok(file),
        Err(_) => Err(format!("network file missing: {}", path.display()).into()),
    }
}

fn join_sorted(set: &HashSet<String>) -> String {
    let mut items: Vec<&str> = set.iter().map(|ss| ss.as_str()).collect();
    items.sort();
    items.join("|")
}

pub fn read_stops_file(dir: &Path) -> Result<Vec<Stop>, Box<dyn Error>> {
    let file = open_network_file(dir, "stops.csv")?;
    let mut reader = csv::Reader::from_reader(file);
    let mut stops = vec![];
    for result in reader.deserialize() {
        let row: Row = result?;
        let mut stop = Stop::new(&row["tag"], &row["title"], row["lat"].parse()?,
                                 row["lon"].parse()?);
        for tag in row["merged"].split('|') {
            if tag.len() > 0 {
                stop.merged.insert(String::from(tag));
            }
        }
        stops.push(stop);
    }

    Ok(stops)
}

pub fn write_stops_file(dir: &Path, stops: &Vec<Stop>) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let path: PathBuf = [dir, Path::new("stops.csv")].iter().collect();
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(&["tag", "title", "lat", "lon", "merged"])?;
    for stop in stops {
        writer.write_record(&[
            stop.tag.clone(),
            stop.title.clone(),
            stop.lat.to_string(),
            stop.lon.to_string(),
            join_sorted(&stop.merged),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

pub fn read_connections_file(dir: &Path) -> Result<Vec<Connection>, Box<dyn Error>> {
    let file = open_network_file(dir, "connections.csv")?;
    let mut reader = csv::Reader::from_reader(file);
    let mut connections = vec![];
    for result in reader.deserialize() {
        let row: Row = result?;
        let mut connection = Connection::new(&row["from"], &row["to"], "");
        connection.routes.clear();
        for route in row["routes"].split('|') {
            if route.len() > 0 {
                connection.routes.insert(String::from(route));
            }
        }
        connection.length = row["length"].parse()?;
        connection.road_length = row["road_length"].parse()?;
        connection.travel_time = row["travel_time"].parse()?;
        connections.push(connection);
    }

    Ok(connections)
}

pub fn write_connections_file(dir: &Path, connections: &Vec<Connection>)
                              -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let path: PathBuf = [dir, Path::new("connections.csv")].iter().collect();
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(&["from", "to", "routes", "length", "road_length", "travel_time"])?;
    for connection in connections {
        writer.write_record(&[
            connection.from.clone(),
            connection.to.clone(),
            join_sorted(&connection.routes),
            connection.length.to_string(),
            connection.road_length.to_string(),
            connection.travel_time.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

pub fn read_routes_file(dir: &Path) -> Result<Vec<Route>, Box<dyn Error>> {
    let file = open_network_file(dir, "routes.csv")?;
    let mut reader = csv::Reader::from_reader(file);
    let mut routes = vec![];
    for result in reader.deserialize() {
        let row: Row = result?;
        let mut route = Route::new(&row["tag"], &row["api"], row["stops_count"].parse()?);
        route.wait_time_mean = row["wait_time_mean"].parse()?;
        route.wait_time_std = row["wait_time_std"].parse()?;
        routes.push(route);
    }

    Ok(routes)
}

pub fn write_routes_file(dir: &Path, routes: &Vec<Route>) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let path: PathBuf = [dir, Path::new("routes.csv")].iter().collect();
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(&["tag", "api", "stops_count", "wait_time_mean", "wait_time_std"])?;
    for route in routes {
        writer.write_record(&[
            route.tag.clone(),
            route.api.clone(),
            route.stops_count.to_string(),
            route.wait_time_mean.to_string(),
            route.wait_time_std.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

pub fn read_demographics_file(dir: &Path) -> Result<Vec<DemographicSector>, Box<dyn Error>> {
    let file = open_network_file(dir, "demographics.csv")?;
    let mut reader = csv::Reader::from_reader(file);
    let mut sectors = vec![];
    for result in reader.deserialize() {
        let row: Row = result?;
        sectors.push(DemographicSector {
            id: row["id"].clone(),
            lat: row["lat"].parse()?,
            lon: row["lon"].parse()?,
            population: row["population"].parse()?,
            area: row["area"].parse()?,
            density: row["density"].parse()?,
        });
    }

    Ok(sectors)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_stops_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut stops = vec![
            Stop::new("100", "Main St at 1st Ave", 43.65, -79.38),
            Stop::new("200", "Main St at 2nd Ave", 43.66, -79.39),
        ];
        stops[0].merged.insert(String::from("101"));

        write_stops_file(dir.path(), &stops)?;
        let read_back = read_stops_file(dir.path())?;
        assert_eq!(stops, read_back);

        Ok(())
    }

    #[test]
    fn test_connections_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut connection = Connection::new("100", "200", "501");
        connection.routes.insert(String::from("502"));
        connection.length = 1.5;
        connection.road_length = 2.;
        connection.travel_time = 3.5;
        let connections = vec![connection, Connection::new("200", "300", "501")];

        write_connections_file(dir.path(), &connections)?;
        let read_back = read_connections_file(dir.path())?;
        assert_eq!(connections, read_back);

        Ok(())
    }

    #[test]
    fn test_routes_round_trip() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut route = Route::new("501", "ttc", 12);
        route.wait_time_mean = 5.5;
        route.wait_time_std = 1.25;
        // a nighttime-only route keeps its sentinel stats
        let routes = vec![route, Route::new("301", "ttc", 8)];

        write_routes_file(dir.path(), &routes)?;
        let read_back = read_routes_file(dir.path())?;
        assert_eq!(routes, read_back);
        assert_eq!(read_back[1].wait_time_mean, UNKNOWN);

        Ok(())
    }

    #[test]
    fn test_read_demographics() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let csv_text = "id,lat,lon,population,area,density\n\
                        s1,43.6,-79.4,1200,0.5,2400\n\
                        s2,43.7,-79.3,800,0.25,3200\n";
        let path = dir.path().join("demographics.csv");
        {
            let mut file = File::create(&path)?;
            file.write_all(csv_text.as_bytes())?;
        }

        let sectors = read_demographics_file(dir.path())?;
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[0].id, "s1");
        assert_eq!(sectors[1].population, 800.);
        assert_eq!(sectors[1].density, 3200.);

        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_stops_file(dir.path()).is_err());
        assert!(read_connections_file(dir.path()).is_err());
        assert!(read_routes_file(dir.path()).is_err());
        assert!(read_demographics_file(dir.path()).is_err());
    }
}
