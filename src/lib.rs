// imports of the modules in this crate
mod geometry;
pub use geometry::{BoundingBox, GeoPoint, DEGREES_PER_KM};

mod transit_graph;
pub use transit_graph::{Connection, DemographicSector, Route, Stop, UNKNOWN};
pub use transit_graph::{read_connections_file, read_demographics_file, read_routes_file,
                        read_stops_file, write_connections_file, write_routes_file,
                        write_stops_file};

mod feed;
pub use feed::{BeelineDistances, DirectionPredictions, FileFeed, RawRoute, RawStop,
               RoadDistanceService, StopPredictions, TransitFeed, TripArrival};
pub use feed::{parse_predictions_xml, parse_route_config_xml, parse_route_list_xml};

mod config_utils;
pub use config_utils::NetworkConfig;

mod graph_builder;
pub use graph_builder::{consolidate_connections, consolidate_stops, extract_route_connections,
                        extract_route_stops, fill_connection_distances, merge_nearby_stops,
                        prune_isolated_stops, tag_order, StaticNetworkBuilder};

mod travel_times;
pub use travel_times::{average_network_speed, calculate_connection_travel_times,
                       calculate_route_wait_time, clean_network, estimate_travel_times};

mod dijkstra_paths;
pub use dijkstra_paths::{connection_sequence, dijkstra_with_paths, RideEdge, RoutingGraph};

mod trip_sim;
pub use trip_sim::{aggregate_trip_metrics, evaluate_network, run_trip_batch, CoverageSample,
                   NetworkMetrics, PathEvaluator, SampleStrategy, SampledTrip, TripMetrics,
                   TripSampler};

#[cfg(test)]
mod test_utils;
