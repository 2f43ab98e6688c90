use std::collections::HashMap;
use std::collections::HashSet;
use std::error::Error;

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use petgraph::graph::NodeIndex;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_isaac::Isaac64Rng;

use super::config_utils::NetworkConfig;
use super::dijkstra_paths::connection_sequence;
use super::dijkstra_paths::dijkstra_with_paths;
use super::dijkstra_paths::RideEdge;
use super::dijkstra_paths::RoutingGraph;
use super::geometry::BoundingBox;
use super::geometry::GeoPoint;
use super::geometry::DEGREES_PER_KM;
use super::transit_graph::read_connections_file;
use super::transit_graph::read_demographics_file;
use super::transit_graph::read_routes_file;
use super::transit_graph::read_stops_file;
use super::transit_graph::Connection;
use super::transit_graph::DemographicSector;
use super::transit_graph::Route;
use super::transit_graph::Stop;
use super::transit_graph::UNKNOWN;
use super::travel_times::average_network_speed;
use super::travel_times::clean_network;
use super::travel_times::mean;
use super::travel_times::population_std;


static RAND_SEED: u64 = 100;
// kdtree queries work in degree space; this widens a km radius enough to
// cover longitude shrinkage at any latitude below the polar circles, and the
// haversine check afterwards discards the excess
static DEG_WINDOW_FACTOR: f64 = 2.5;


/// Draws random points constrained to the network's service area and snaps
/// them to stops.
pub struct TripSampler<'a> {
    stops: &'a Vec<Stop>,
    kdtree: KdTree<f64, usize, [f64; 2]>,
    sample_box: BoundingBox,
    cfg: &'a NetworkConfig,
}

impl<'a> TripSampler<'a> {
    pub fn new(stops: &'a Vec<Stop>, cfg: &'a NetworkConfig) -> TripSampler<'a> {
        assert!(stops.len() > 0, "Tried to build a TripSampler with no stops!");
        let mut kdtree = KdTree::new(2);
        for (ii, stop) in stops.iter().enumerate() {
            kdtree.add(stop.position().as_array(), ii).unwrap();
        }

        let positions: Vec<GeoPoint> = stops.iter().map(|ss| ss.position()).collect();
        let mut sample_box = BoundingBox::around(&positions);
        sample_box.expand_by_km(cfg.walk_cutoff_km);

        TripSampler{stops, kdtree, sample_box, cfg}
    }

    /// All stops within `radius_km` of the point, as (stop index, km) pairs.
    pub fn stops_within(&self, point: &GeoPoint, radius_km: f64) -> Vec<(usize, f64)> {
        let window_deg = radius_km * DEGREES_PER_KM * DEG_WINDOW_FACTOR;
        let candidates = self.kdtree.within(&point.as_array(), window_deg.powi(2),
                                            &squared_euclidean).unwrap();

        let mut found = vec![];
        for (_, stop_idx) in candidates {
            let stop_pos = self.stops[*stop_idx].position();
            let dist = point.haversine_distance(&stop_pos, self.cfg.earth_radius_km);
            if dist <= radius_km {
                found.push((*stop_idx, dist));
            }
        }

        found
    }

    /// A point is served if some stop lies within the high cutoff of it.
    pub fn in_service_area(&self, point: &GeoPoint) -> bool {
        self.stops_within(point, self.cfg.service_cutoff_km).len() > 0
    }

    /// The nearest stop within the high cutoff, by true distance.
    pub fn snap_to_stop(&self, point: &GeoPoint) -> Option<usize> {
        let candidates = self.stops_within(point, self.cfg.service_cutoff_km);
        let mut best = None;
        let mut best_dist = f64::INFINITY;
        for (stop_idx, dist) in candidates {
            if dist < best_dist {
                best = Some(stop_idx);
                best_dist = dist;
            }
        }

        best
    }

    /// Rejection-sample a uniform point over the service area, proposing from
    /// the stops' bounding box expanded by the low cutoff.
    pub fn sample_uniform_point(&self, rng: &mut Isaac64Rng) -> GeoPoint {
        loop {
            let lat = rng.gen_range(self.sample_box.min_lat..self.sample_box.max_lat);
            let lon = rng.gen_range(self.sample_box.min_lon..self.sample_box.max_lon);
            let point = GeoPoint::new(lat, lon);
            if self.in_service_area(&point) {
                return point;
            }
        }
    }

    /// Pick a sector with probability proportional to population, propose a
    /// point uniformly inside a square of side sqrt(area) on its centroid,
    /// and apply the same service-area rejection test.
    pub fn sample_weighted_point(&self, sectors: &Vec<DemographicSector>,
                                 rng: &mut Isaac64Rng) -> GeoPoint {
        loop {
            let sector = sectors.choose_weighted(rng, |ss| ss.population).
                expect("Failed to draw a demographic sector!");
            let half_side = sector.area.sqrt() * DEGREES_PER_KM / 2.;
            let point = if half_side > 0. {
                GeoPoint::new(rng.gen_range(sector.lat - half_side..sector.lat + half_side),
                              rng.gen_range(sector.lon - half_side..sector.lon + half_side))
            } else {
                GeoPoint::new(sector.lat, sector.lon)
            };
            if self.in_service_area(&point) {
                return point;
            }
        }
    }
}


/// One simulated point-to-point journey.
#[derive(Debug, Clone)]
pub struct SampledTrip {
    pub origin_stop: usize,
    pub destination_stop: usize,
    /// transfer count after deflation
    pub num_transfers: f64,
    /// total time spent waiting, minutes
    pub wait_time: f64,
    /// wait plus riding time, minutes
    pub travel_time: f64,
    /// km along the roads
    pub distance: f64,
    /// km between the endpoints as the crow flies
    pub straight_distance: f64,
}

/// Walk-distance accessibility around one sampled point.
#[derive(Debug, Clone)]
pub struct CoverageSample {
    pub num_stops_within_walk: usize,
    pub nearest_stop_km: f64,
}

/// Runs weighted shortest-path queries over the cleaned network and derives
/// per-trip times, distances and transfer counts.
pub struct PathEvaluator<'a> {
    stops: &'a Vec<Stop>,
    connections: &'a Vec<Connection>,
    cfg: &'a NetworkConfig,
    graph: RoutingGraph,
    node_idxs: Vec<NodeIndex>,
    /// wait-time means of the routes with usable statistics
    route_waits: HashMap<String, f64>,
}

impl<'a> PathEvaluator<'a> {
    pub fn new(stops: &'a Vec<Stop>, connections: &'a Vec<Connection>,
               routes: &'a Vec<Route>, cfg: &'a NetworkConfig) -> PathEvaluator<'a> {
        let mut graph = RoutingGraph::new();
        let mut node_idxs = Vec::with_capacity(stops.len());
        let mut idxs_by_tag = HashMap::new();
        for stop in stops {
            let node_idx = graph.add_node(stop.tag.clone());
            idxs_by_tag.insert(stop.tag.as_str(), node_idx);
            node_idxs.push(node_idx);
        }

        for (ii, connection) in connections.iter().enumerate() {
            if connection.travel_time < 0. {
                log::warn!("Connection {} -> {} has no travel time, leaving it out \
                            of the routing graph", connection.from, connection.to);
                continue;
            }
            let endpoints = (idxs_by_tag.get(connection.from.as_str()),
                             idxs_by_tag.get(connection.to.as_str()));
            match endpoints {
                (Some(from), Some(to)) => {
                    graph.add_edge(*from, *to, RideEdge::new(ii, connection.travel_time));
                }
                _ => {
                    log::warn!("Connection {} -> {} names a missing stop",
                               connection.from, connection.to);
                }
            }
        }

        let route_waits = routes.iter().filter(|rr| rr.wait_time_mean >= 0.).
            map(|rr| (rr.tag.clone(), rr.wait_time_mean)).collect();

        PathEvaluator{stops, connections, cfg, graph, node_idxs, route_waits}
    }

    /// Evaluate one origin/destination stop pair.  The query is treated as
    /// direction-agnostic: if no forward path exists the endpoints are
    /// swapped.  None means no path either way, a degenerate same-stop pair,
    /// or an infeasible leg decomposition; the caller re-draws the sample.
    pub fn evaluate_pair(&self, origin_idx: usize, destination_idx: usize)
                         -> Option<SampledTrip> {
        let mut origin = origin_idx;
        let mut destination = destination_idx;
        let mut sequence = self.shortest_connection_sequence(origin, destination);
        if sequence.is_none() {
            std::mem::swap(&mut origin, &mut destination);
            sequence = self.shortest_connection_sequence(origin, destination);
        }
        let sequence = sequence?;
        if sequence.len() == 0 {
            return None;
        }

        let (num_transfers, legs) = self.count_transfers(&sequence)?;

        let mut wait_time = 0.;
        for leg in &legs {
            let leg_wait = leg.iter().map(|route| self.route_waits[*route]).
                fold(f64::INFINITY, f64::min);
            // half the headway is the expected wait for a random arrival
            wait_time += (leg_wait / 2.) * self.cfg.transfer_deflation;
        }

        let ride_time: f64 = sequence.iter().
            map(|idx| self.connections[*idx].travel_time).sum();
        let distance: f64 = sequence.iter().map(|idx| {
            let connection = &self.connections[*idx];
            if connection.road_length > 0. {
                connection.road_length
            } else {
                connection.length
            }
        }).sum();
        let straight_distance = self.stops[origin].position().
            haversine_distance(&self.stops[destination].position(), self.cfg.earth_radius_km);

        Some(SampledTrip {
            origin_stop: origin,
            destination_stop: destination,
            num_transfers: num_transfers as f64 * self.cfg.transfer_deflation,
            wait_time,
            travel_time: wait_time + ride_time,
            distance,
            straight_distance,
        })
    }

    fn shortest_connection_sequence(&self, origin_idx: usize, destination_idx: usize)
                                    -> Option<Vec<usize>> {
        let origin = self.node_idxs[origin_idx];
        let destination = self.node_idxs[destination_idx];
        let (_, best_arrival) = dijkstra_with_paths(&self.graph, origin, Some(destination));
        connection_sequence(&best_arrival, origin, destination)
    }

    // only routes with usable wait statistics can be ridden
    fn valid_routes(&self, connection_idx: usize) -> HashSet<&str> {
        self.connections[connection_idx].routes.iter().
            filter(|route| self.route_waits.contains_key(route.as_str())).
            map(|route| route.as_str()).collect()
    }

    /// Walk the connection sequence maintaining the set of routes that could
    /// have carried the rider since the last boarding.  A candidate not
    /// serving the next connection is evicted; when none survive, the leg
    /// ended and a transfer happened, and the candidates are re-seeded from
    /// the current connection.  Returns the pre-deflation transfer count and
    /// each leg's surviving routes, or None when some leg has no usable
    /// route at all.
    fn count_transfers(&self, sequence: &Vec<usize>) -> Option<(u32, Vec<Vec<&str>>)> {
        let mut num_transfers = 0;
        let mut legs: Vec<Vec<&str>> = vec![];
        let mut candidates = self.valid_routes(sequence[0]);
        for connection_idx in &sequence[1..] {
            let connection = &self.connections[*connection_idx];
            let survivors: HashSet<&str> = candidates.iter().
                filter(|route| connection.routes.contains(**route)).
                map(|route| *route).collect();
            if survivors.len() == 0 {
                // the routes that made it this far are the ones the rider
                // could have been on for the leg that just ended
                legs.push(candidates.into_iter().collect());
                num_transfers += 1;
                candidates = self.valid_routes(*connection_idx);
            } else {
                candidates = survivors;
            }
        }
        legs.push(candidates.into_iter().collect());

        if legs.iter().any(|leg| leg.len() == 0) {
            return None;
        }

        Some((num_transfers, legs))
    }
}


pub enum SampleStrategy<'a> {
    Uniform,
    PopulationWeighted(&'a Vec<DemographicSector>),
}

/// Sample up to `num_samples` feasible trips.  Each failed draw is retried up
/// to the configured attempt budget; exhausting it truncates the whole batch
/// early instead of looping forever.  Coverage is recorded at both raw
/// sample points of every accepted trip.
pub fn run_trip_batch(evaluator: &PathEvaluator, sampler: &TripSampler,
                      strategy: &SampleStrategy, num_samples: usize,
                      cfg: &NetworkConfig, rng: &mut Isaac64Rng)
                      -> (Vec<SampledTrip>, Vec<CoverageSample>) {
    let mut trips = vec![];
    let mut coverage = vec![];
    'batch: for _ in 0..num_samples {
        let mut attempts = 0;
        loop {
            if attempts >= cfg.max_resample_attempts {
                log::warn!("Exhausted {} sampling attempts, truncating the batch at {} trips",
                           attempts, trips.len());
                break 'batch;
            }
            attempts += 1;

            let (origin_point, destination_point) = match strategy {
                SampleStrategy::Uniform => (sampler.sample_uniform_point(rng),
                                            sampler.sample_uniform_point(rng)),
                SampleStrategy::PopulationWeighted(sectors) =>
                    (sampler.sample_weighted_point(sectors, rng),
                     sampler.sample_weighted_point(sectors, rng)),
            };
            // the points passed the service-area test, so both snaps succeed
            let origin = match sampler.snap_to_stop(&origin_point) {
                Some(stop_idx) => stop_idx,
                None => continue,
            };
            let destination = match sampler.snap_to_stop(&destination_point) {
                Some(stop_idx) => stop_idx,
                None => continue,
            };

            if let Some(trip) = evaluator.evaluate_pair(origin, destination) {
                for point in &[&origin_point, &destination_point] {
                    let within_walk = sampler.stops_within(point, cfg.walk_cutoff_km);
                    let nearest_stop_km = sampler.
                        stops_within(point, cfg.service_cutoff_km).iter().
                        map(|(_, dist)| *dist).fold(f64::INFINITY, f64::min);
                    coverage.push(CoverageSample {
                        num_stops_within_walk: within_walk.len(),
                        nearest_stop_km,
                    });
                }
                trips.push(trip);
                break;
            }
        }
    }

    (trips, coverage)
}


/// Summary statistics for one sampling strategy's trip batch.
#[derive(Debug, Clone)]
pub struct TripMetrics {
    pub num_trips: usize,
    pub mean_trip_time: f64,
    pub mean_trip_distance: f64,
    pub mean_straight_distance: f64,
    pub mean_num_transfers: f64,
    /// trip distance over straight-line distance
    pub mean_detour_ratio: f64,
    pub mean_stops_within_walk: f64,
    pub mean_nearest_stop_km: f64,
}

pub fn aggregate_trip_metrics(trips: &Vec<SampledTrip>, coverage: &Vec<CoverageSample>)
                              -> TripMetrics {
    if trips.len() == 0 {
        return TripMetrics {
            num_trips: 0,
            mean_trip_time: UNKNOWN,
            mean_trip_distance: UNKNOWN,
            mean_straight_distance: UNKNOWN,
            mean_num_transfers: UNKNOWN,
            mean_detour_ratio: UNKNOWN,
            mean_stops_within_walk: UNKNOWN,
            mean_nearest_stop_km: UNKNOWN,
        };
    }

    let times: Vec<f64> = trips.iter().map(|tt| tt.travel_time).collect();
    let distances: Vec<f64> = trips.iter().map(|tt| tt.distance).collect();
    let straights: Vec<f64> = trips.iter().map(|tt| tt.straight_distance).collect();
    let transfers: Vec<f64> = trips.iter().map(|tt| tt.num_transfers).collect();
    let detours: Vec<f64> = trips.iter().filter(|tt| tt.straight_distance > 0.).
        map(|tt| tt.distance / tt.straight_distance).collect();
    let stop_counts: Vec<f64> = coverage.iter().
        map(|cc| cc.num_stops_within_walk as f64).collect();
    let nearests: Vec<f64> = coverage.iter().map(|cc| cc.nearest_stop_km).collect();

    TripMetrics {
        num_trips: trips.len(),
        mean_trip_time: mean(&times),
        mean_trip_distance: mean(&distances),
        mean_straight_distance: mean(&straights),
        mean_num_transfers: mean(&transfers),
        mean_detour_ratio: if detours.len() > 0 { mean(&detours) } else { UNKNOWN },
        mean_stops_within_walk: mean(&stop_counts),
        mean_nearest_stop_km: mean(&nearests),
    }
}

/// The full quality report for one network.
#[derive(Debug, Clone)]
pub struct NetworkMetrics {
    pub num_routes: usize,
    pub num_stops: usize,
    pub num_connections: usize,
    pub total_connection_length: f64,
    pub mean_connection_length: f64,
    pub total_travel_time: f64,
    pub mean_travel_time: f64,
    /// km/min over connections with known travel times
    pub mean_speed: f64,
    pub mean_half_wait: f64,
    pub std_half_wait: f64,
    pub uniform_trips: TripMetrics,
    pub weighted_trips: TripMetrics,
}

/// Read the persisted network, clean it, and score it by Monte Carlo trip
/// sampling under both strategies.
pub fn evaluate_network(cfg: &NetworkConfig, num_samples: usize)
                        -> Result<NetworkMetrics, Box<dyn Error>> {
    let dir = cfg.agency_dir();
    let stops = read_stops_file(&dir)?;
    let connections = read_connections_file(&dir)?;
    let routes = read_routes_file(&dir)?;
    let sectors = read_demographics_file(&dir)?;

    let (routes, connections) = clean_network(routes, connections);
    let mut rng = Isaac64Rng::seed_from_u64(RAND_SEED);
    let evaluator = PathEvaluator::new(&stops, &connections, &routes, cfg);
    let sampler = TripSampler::new(&stops, cfg);

    log::info!("Sampling {} uniform trips", num_samples);
    let (uniform_trips, uniform_coverage) = run_trip_batch(
        &evaluator, &sampler, &SampleStrategy::Uniform, num_samples, cfg, &mut rng);
    log::info!("Sampling {} population-weighted trips", num_samples);
    let (weighted_trips, weighted_coverage) = run_trip_batch(
        &evaluator, &sampler, &SampleStrategy::PopulationWeighted(&sectors), num_samples,
        cfg, &mut rng);

    let lengths: Vec<f64> = connections.iter().map(|cc| cc.length).collect();
    let travel_times: Vec<f64> = connections.iter().map(|cc| cc.travel_time).collect();
    let half_waits: Vec<f64> = routes.iter().map(|rr| rr.wait_time_mean / 2.).collect();
    let (mean_half_wait, std_half_wait) = if half_waits.len() > 0 {
        let half_wait_mean = mean(&half_waits);
        (half_wait_mean, population_std(&half_waits, half_wait_mean))
    } else {
        (UNKNOWN, UNKNOWN)
    };

    Ok(NetworkMetrics {
        num_routes: routes.len(),
        num_stops: stops.len(),
        num_connections: connections.len(),
        total_connection_length: lengths.iter().sum(),
        mean_connection_length: if lengths.len() > 0 { mean(&lengths) } else { UNKNOWN },
        total_travel_time: travel_times.iter().sum(),
        mean_travel_time: if travel_times.len() > 0 { mean(&travel_times) } else { UNKNOWN },
        mean_speed: average_network_speed(&connections),
        mean_half_wait,
        std_half_wait,
        uniform_trips: aggregate_trip_metrics(&uniform_trips, &uniform_coverage),
        weighted_trips: aggregate_trip_metrics(&weighted_trips, &weighted_coverage),
    })
}
