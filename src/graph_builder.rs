use std::cmp::Ordering;
use std::collections::hash_map::Entry::{Occupied, Vacant};
use std::collections::HashMap;
use std::collections::HashSet;
use std::error::Error;

use super::config_utils::NetworkConfig;
use super::feed::RawRoute;
use super::feed::RoadDistanceService;
use super::feed::TransitFeed;
use super::geometry::GeoPoint;
use super::transit_graph::Connection;
use super::transit_graph::Route;
use super::transit_graph::Stop;


/// Ordering used everywhere stop tags are sorted: tags that parse as whole
/// numbers compare numerically and come before all other tags, which compare
/// lexicographically.
pub fn tag_order(aa: &str, bb: &str) -> Ordering {
    match (aa.parse::<u64>(), bb.parse::<u64>()) {
        (Ok(na), Ok(nb)) => na.cmp(&nb),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => aa.cmp(bb),
    }
}

fn strip_direction_suffix(tag: &str) -> &str {
    match tag.find('_') {
        Some(idx) => &tag[..idx],
        None => tag,
    }
}

/// Extract this route's stop records.  Only stops listed as plain stop
/// elements count; entries with direction suffixes are duplicates of a base
/// stop, and stops appearing only as direction waypoints are not promoted.
pub fn extract_route_stops(raw_route: &RawRoute) -> Vec<Stop> {
    let mut seen = HashSet::new();
    let mut stops = vec![];
    for raw_stop in &raw_route.stops {
        if raw_stop.tag.contains('_') {
            continue;
        }
        if seen.insert(raw_stop.tag.clone()) {
            stops.push(Stop::new(&raw_stop.tag, &raw_stop.title, raw_stop.lat, raw_stop.lon));
        }
    }

    stops
}

/// Extract one connection per consecutive stop pair in each direction path,
/// tagged with the originating route.
pub fn extract_route_connections(raw_route: &RawRoute) -> Vec<Connection> {
    let mut connections = vec![];
    for direction in &raw_route.directions {
        for pair in direction.windows(2) {
            let from = strip_direction_suffix(&pair[0]);
            let to = strip_direction_suffix(&pair[1]);
            connections.push(Connection::new(from, to, &raw_route.tag));
        }
    }

    connections
}

/// Collapse the stop list to one record per tag.  The last-seen record wins
/// on attribute collisions; `merged` sets are unioned so no absorbed tag is
/// lost.  Output is sorted by `tag_order` for reproducibility.
pub fn consolidate_stops(stops: Vec<Stop>) -> Vec<Stop> {
    let mut by_tag: HashMap<String, Stop> = HashMap::new();
    for mut stop in stops {
        if let Some(existing) = by_tag.get(&stop.tag) {
            for tag in &existing.merged {
                stop.merged.insert(tag.clone());
            }
        }
        by_tag.insert(stop.tag.clone(), stop);
    }

    let mut stops: Vec<Stop> = by_tag.into_iter().map(|(_, ss)| ss).collect();
    stops.sort_by(|s1, s2| tag_order(&s1.tag, &s2.tag));
    return stops;
}

/// Merge connections sharing an ordered (from, to) pair by unioning their
/// route sets, dropping self-loops first.  The numeric fields are taken from
/// the first member of each group; they are filled in later passes anyway.
/// Output is sorted by `tag_order` on (from, to) for reproducibility.
pub fn consolidate_connections(connections: Vec<Connection>) -> Vec<Connection> {
    let mut by_pair: HashMap<(String, String), Connection> = HashMap::new();
    for connection in connections {
        if connection.from == connection.to {
            continue;
        }
        let key = (connection.from.clone(), connection.to.clone());
        match by_pair.entry(key) {
            Occupied(ent) => {
                ent.into_mut().routes.extend(connection.routes);
            }
            Vacant(ent) => {
                ent.insert(connection);
            }
        }
    }

    let mut connections: Vec<Connection> = by_pair.into_iter().map(|(_, cc)| cc).collect();
    connections.sort_by(|c1, c2| tag_order(&c1.from, &c2.from).
                                 then_with(|| tag_order(&c1.to, &c2.to)));
    return connections;
}

/// Drop every stop that no connection touches.
pub fn prune_isolated_stops(stops: Vec<Stop>, connections: &Vec<Connection>) -> Vec<Stop> {
    let mut connected: HashSet<&str> = HashSet::new();
    for connection in connections {
        connected.insert(connection.from.as_str());
        connected.insert(connection.to.as_str());
    }

    let num_before = stops.len();
    let stops: Vec<Stop> = stops.into_iter().
        filter(|ss| connected.contains(ss.tag.as_str())).collect();
    log::info!("Pruned {} isolated stops", num_before - stops.len());
    return stops;
}

/// Fold stops closer than `threshold_km` into one another, unless a direct
/// connection between them exists in either direction (a real transit hop
/// that short is intentional).  One O(n^2) sweep from the end of the list
/// backward; the survivor takes the pair's midpoint and the union of both
/// `merged` sets, and every connection endpoint naming the absorbed stop is
/// rewritten to the survivor.  Positions averaged during the sweep are not
/// re-checked against stops already visited.
///
/// Afterwards the connections must be re-consolidated, since endpoint
/// rewriting can create duplicates and self-loops.
pub fn merge_nearby_stops(mut stops: Vec<Stop>, mut connections: Vec<Connection>,
                          threshold_km: f64, earth_radius_km: f64)
                          -> (Vec<Stop>, Vec<Connection>) {
    // ordered tag pairs with a direct connection, kept current as stops merge
    let mut linked: HashSet<(String, String)> = HashSet::new();
    for connection in &connections {
        linked.insert((connection.from.clone(), connection.to.clone()));
    }

    // stops are tombstoned rather than removed, so indexes stay stable for
    // the whole sweep; endpoints are rewritten once at the end through the
    // owner map
    let mut alive = vec![true; stops.len()];
    let mut owner: HashMap<String, String> = HashMap::new();
    let mut num_merged = 0;

    for jj in (0..stops.len()).rev() {
        if ! alive[jj] {
            continue;
        }
        for ii in 0..jj {
            if ! alive[ii] {
                continue;
            }
            let itag = stops[ii].tag.clone();
            let jtag = stops[jj].tag.clone();
            if linked.contains(&(itag.clone(), jtag.clone())) ||
               linked.contains(&(jtag.clone(), itag.clone())) {
                continue;
            }
            let dist = stops[ii].position().
                haversine_distance(&stops[jj].position(), earth_radius_km);
            if dist >= threshold_km {
                continue;
            }

            // stop i absorbs stop j
            let midpoint = stops[ii].position().midpoint(&stops[jj].position());
            let j_merged: Vec<String> = stops[jj].merged.iter().cloned().collect();
            stops[ii].lat = midpoint.lat;
            stops[ii].lon = midpoint.lon;
            stops[ii].merged.extend(j_merged);
            alive[jj] = false;
            owner.insert(jtag.clone(), itag.clone());

            // links that touched j now touch i, and later pair checks must
            // see them there
            let moved: Vec<(String, String)> = linked.iter().
                filter(|(from, to)| *from == jtag || *to == jtag).cloned().collect();
            for pair in moved {
                linked.remove(&pair);
                let from = if pair.0 == jtag { itag.clone() } else { pair.0 };
                let to = if pair.1 == jtag { itag.clone() } else { pair.1 };
                linked.insert((from, to));
            }

            num_merged += 1;
            break;
        }
    }
    log::info!("Merged {} stop pairs closer than {} km", num_merged, threshold_km);

    for connection in &mut connections {
        connection.from = resolve_owner(&owner, &connection.from);
        connection.to = resolve_owner(&owner, &connection.to);
    }

    let stops: Vec<Stop> = stops.into_iter().zip(alive).
        filter(|(_, aa)| *aa).map(|(ss, _)| ss).collect();
    (stops, connections)
}

// A survivor can itself be absorbed later in the sweep, so follow the chain.
fn resolve_owner(owner: &HashMap<String, String>, tag: &str) -> String {
    let mut current = tag;
    while let Some(next) = owner.get(current) {
        current = next;
    }
    String::from(current)
}

/// Fill in every connection's straight-line length and routed road length.
/// Road distances are requested in chunks of the service's pair limit.  A
/// routed distance more than `suspicious_ratio` times the straight-line
/// distance is re-queried on its own; one shorter than the straight line is
/// raised to it.  A connection naming a stop the list doesn't have (a
/// direction-only waypoint the feed never listed as a stop) keeps its zero
/// lengths.
pub fn fill_connection_distances(stops: &Vec<Stop>, connections: &mut Vec<Connection>,
                                 distance_service: &dyn RoadDistanceService,
                                 cfg: &NetworkConfig) -> Result<(), Box<dyn Error>> {
    let positions: HashMap<&str, GeoPoint> = stops.iter().
        map(|ss| (ss.tag.as_str(), ss.position())).collect();

    let fillable: Vec<usize> = connections.iter().enumerate().
        filter(|(_, cc)| positions.contains_key(cc.from.as_str()) &&
                         positions.contains_key(cc.to.as_str())).
        map(|(ii, _)| ii).collect();
    if fillable.len() < connections.len() {
        log::warn!("{} connections name stops missing from the stop list",
                   connections.len() - fillable.len());
    }

    for idx in &fillable {
        let connection = &mut connections[*idx];
        let from = &positions[connection.from.as_str()];
        let to = &positions[connection.to.as_str()];
        connection.length = from.haversine_distance(to, cfg.earth_radius_km);
    }

    let mut road_lengths = Vec::with_capacity(fillable.len());
    for chunk in fillable.chunks(cfg.distance_chunk_size) {
        let origins: Vec<GeoPoint> = chunk.iter().
            map(|idx| positions[connections[*idx].from.as_str()].clone()).collect();
        let destinations: Vec<GeoPoint> = chunk.iter().
            map(|idx| positions[connections[*idx].to.as_str()].clone()).collect();
        road_lengths.extend(distance_service.road_distances(&origins, &destinations)?);
    }
    if road_lengths.len() != fillable.len() {
        return Err("road distance service returned a mismatched count".into());
    }

    for (idx, road_length) in fillable.iter().zip(road_lengths) {
        let connection = &mut connections[*idx];
        let mut road_length = road_length;
        if connection.length > 0. && road_length > cfg.suspicious_ratio * connection.length {
            log::warn!("Suspicious road distance {:.3} km for {} -> {} ({:.3} km straight), \
                        re-querying", road_length, connection.from, connection.to,
                       connection.length);
            let origins = vec![positions[connection.from.as_str()].clone()];
            let destinations = vec![positions[connection.to.as_str()].clone()];
            let requeried = distance_service.road_distances(&origins, &destinations)?;
            match requeried.first() {
                Some(dist) => road_length = *dist,
                None => return Err("road distance service returned nothing for a \
                                    single pair".into()),
            }
        }
        if road_length < connection.length {
            // a road can't be shorter than the straight line
            road_length = connection.length;
        }
        connection.road_length = road_length;
    }

    Ok(())
}

pub struct StaticNetworkBuilder<'a> {
    cfg: &'a NetworkConfig,
}

impl<'a> StaticNetworkBuilder<'a> {
    pub fn new(cfg: &'a NetworkConfig) -> StaticNetworkBuilder<'a> {
        StaticNetworkBuilder{cfg}
    }

    /// Build the agency's consolidated stop/connection graph and its route
    /// records from the raw feed.
    pub fn build(&self, feed: &dyn TransitFeed, distance_service: &dyn RoadDistanceService)
                 -> Result<(Vec<Stop>, Vec<Connection>, Vec<Route>), Box<dyn Error>> {
        let route_tags = feed.route_list()?;
        log::info!("Found {} routes", route_tags.len());

        let mut stops = vec![];
        let mut connections = vec![];
        let mut routes = vec![];
        for (index, route_tag) in route_tags.iter().enumerate() {
            let raw_route = feed.route_config(route_tag)?;
            let route_stops = extract_route_stops(&raw_route);
            routes.push(Route::new(&raw_route.tag, &self.cfg.agency, route_stops.len()));
            stops.extend(route_stops);
            connections.extend(extract_route_connections(&raw_route));
            log::debug!("Extracted data from {}/{} routes", index + 1, route_tags.len());
        }

        let stops = consolidate_stops(stops);
        let connections = consolidate_connections(connections);
        log::info!("Found {} stops and {} connections", stops.len(), connections.len());

        // dead-end stops must not take part in the proximity merge
        let stops = prune_isolated_stops(stops, &connections);
        let (stops, connections) = merge_nearby_stops(
            stops, connections, self.cfg.merge_threshold_km, self.cfg.earth_radius_km);
        let mut connections = consolidate_connections(connections);

        fill_connection_distances(&stops, &mut connections, distance_service, self.cfg)?;

        Ok((stops, connections, routes))
    }
}
