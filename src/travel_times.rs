use std::collections::HashMap;
use std::collections::HashSet;
use std::error::Error;

use itertools::iproduct;

use super::feed::StopPredictions;
use super::feed::TransitFeed;
use super::transit_graph::Connection;
use super::transit_graph::Route;
use super::transit_graph::Stop;
use super::transit_graph::UNKNOWN;


pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64], mean_value: f64) -> f64 {
    let variance = values.iter().map(|vv| (vv - mean_value).powi(2)).sum::<f64>()
                   / values.len() as f64;
    variance.sqrt()
}

/// Derive a route's expected headway from its live predictions: collect the
/// gaps between successive arrivals of the same direction at the same stop,
/// and average them over the whole route.  A route without a single gap
/// anywhere (a night bus, say) gets the sentinel pair.
pub fn calculate_route_wait_time(predictions: &Vec<StopPredictions>) -> (f64, f64) {
    let mut gaps = vec![];
    for stop_predictions in predictions {
        // arrivals for one direction can be split over several entries, so
        // regroup by direction title first
        let mut by_direction: HashMap<&str, Vec<f64>> = HashMap::new();
        for direction in &stop_predictions.directions {
            let minutes = by_direction.entry(direction.direction.as_str()).or_insert(vec![]);
            for trip in &direction.trips {
                minutes.push(trip.minutes);
            }
        }
        for (_, mut minutes) in by_direction {
            minutes.sort_by(|aa, bb| aa.partial_cmp(bb).unwrap());
            for window in minutes.windows(2) {
                gaps.push(window[1] - window[0]);
            }
        }
    }

    if gaps.len() == 0 {
        return (UNKNOWN, UNKNOWN);
    }
    let gap_mean = mean(&gaps);
    return (gap_mean, population_std(&gaps, gap_mean));
}

/// Record observed travel times for this route's connections.  Every ordered
/// pair of predicted stops is considered, not just adjacent ones; a trip id
/// appearing at both stops gives one observation, kept only when
/// non-negative.  Prediction stop tags are matched against connection
/// endpoints through the stops' `merged` sets.  Observations accumulate into
/// `observed` across routes; the caller takes means at the end.
pub fn calculate_connection_travel_times(predictions: &Vec<StopPredictions>, route_tag: &str,
                                         connections: &Vec<Connection>, stops: &Vec<Stop>,
                                         observed: &mut HashMap<(String, String), Vec<f64>>) {
    // map every absorbed tag back to the stop that now carries it
    let mut owner_of: HashMap<&str, &str> = HashMap::new();
    for stop in stops {
        for tag in &stop.merged {
            owner_of.insert(tag.as_str(), stop.tag.as_str());
        }
    }

    let route_connections: HashSet<(&str, &str)> = connections.iter().
        filter(|cc| cc.routes.contains(route_tag)).
        map(|cc| (cc.from.as_str(), cc.to.as_str())).collect();

    // per prediction stop, the minutes-until-arrival of each trip id
    let mut arrivals: Vec<(&str, HashMap<&str, f64>)> = vec![];
    for stop_predictions in predictions {
        let mut by_trip = HashMap::new();
        for direction in &stop_predictions.directions {
            for trip in &direction.trips {
                by_trip.insert(trip.trip_id.as_str(), trip.minutes);
            }
        }
        arrivals.push((stop_predictions.stop_tag.as_str(), by_trip));
    }

    for (ii, jj) in iproduct!(0..arrivals.len(), 0..arrivals.len()) {
        if ii == jj {
            continue;
        }
        let (from_tag, from_trips) = &arrivals[ii];
        let (to_tag, to_trips) = &arrivals[jj];
        let from_owner = match owner_of.get(from_tag) {
            Some(tag) => *tag,
            None => continue,
        };
        let to_owner = match owner_of.get(to_tag) {
            Some(tag) => *tag,
            None => continue,
        };
        if ! route_connections.contains(&(from_owner, to_owner)) {
            continue;
        }

        for (trip_id, from_minutes) in from_trips {
            if let Some(to_minutes) = to_trips.get(trip_id) {
                let travel_time = to_minutes - from_minutes;
                // a negative value means we caught the same trip heading the
                // other way
                if travel_time >= 0. {
                    let key = (String::from(from_owner), String::from(to_owner));
                    observed.entry(key).or_insert(vec![]).push(travel_time);
                }
            }
        }
    }
}

/// Pull live predictions for every route and fill in the routes' wait-time
/// statistics and the connections' travel times.
pub fn estimate_travel_times(feed: &dyn TransitFeed, stops: &Vec<Stop>,
                             connections: &mut Vec<Connection>, routes: &mut Vec<Route>)
                             -> Result<(), Box<dyn Error>> {
    let stops_by_tag: HashMap<&str, &Stop> = stops.iter().
        map(|ss| (ss.tag.as_str(), ss)).collect();

    let mut observed = HashMap::new();
    for route in routes.iter_mut() {
        // the route serves every original tag of every stop its connections
        // touch
        let mut stop_tags: Vec<String> = vec![];
        for connection in connections.iter() {
            if ! connection.routes.contains(&route.tag) {
                continue;
            }
            for endpoint in &[&connection.from, &connection.to] {
                if let Some(stop) = stops_by_tag.get(endpoint.as_str()) {
                    for tag in &stop.merged {
                        stop_tags.push(tag.clone());
                    }
                }
            }
        }
        stop_tags.sort();
        stop_tags.dedup();

        let predictions = feed.predictions(&route.tag, &stop_tags)?;
        let (wait_mean, wait_std) = calculate_route_wait_time(&predictions);
        route.wait_time_mean = wait_mean;
        route.wait_time_std = wait_std;
        if wait_mean == UNKNOWN {
            log::info!("Route {} has no usable arrival predictions", route.tag);
        }

        calculate_connection_travel_times(&predictions, &route.tag, connections, stops,
                                          &mut observed);
    }

    for connection in connections.iter_mut() {
        let key = (connection.from.clone(), connection.to.clone());
        connection.travel_time = match observed.get(&key) {
            Some(times) if times.len() > 0 => mean(times),
            _ => UNKNOWN,
        };
    }

    Ok(())
}

/// Network-wide mean road speed in km/min over connections with known travel
/// times.  Connections with a zero travel time count toward the denominator
/// but contribute nothing to the sum.
pub fn average_network_speed(connections: &Vec<Connection>) -> f64 {
    let mut speed_sum = 0.;
    let mut num_timed = 0;
    for connection in connections {
        if connection.travel_time > 0. {
            speed_sum += connection.road_length / connection.travel_time;
            num_timed += 1;
        } else if connection.travel_time == 0. {
            num_timed += 1;
        }
    }

    if num_timed == 0 {
        return 0.;
    }
    return speed_sum / num_timed as f64;
}

/// Drop routes without usable wait statistics, and repair connections that
/// never got a travel time: a timeless connection served by at least one
/// valid route has its travel time imputed from the network's average speed,
/// while one served only by invalid routes is dropped.
pub fn clean_network(routes: Vec<Route>, connections: Vec<Connection>)
                     -> (Vec<Route>, Vec<Connection>) {
    let average_speed = average_network_speed(&connections);
    let valid_route_tags: HashSet<&String> = routes.iter().
        filter(|rr| rr.wait_time_mean > 0.).map(|rr| &rr.tag).collect();

    let num_connections_before = connections.len();
    let connections: Vec<Connection> = connections.into_iter().filter_map(|mut connection| {
        if connection.travel_time < 0. {
            if connection.routes.iter().any(|route| valid_route_tags.contains(route)) {
                connection.travel_time = connection.length * average_speed;
                Some(connection)
            } else {
                None
            }
        } else {
            Some(connection)
        }
    }).collect();

    let num_routes_before = routes.len();
    let routes: Vec<Route> = routes.into_iter().
        filter(|rr| rr.wait_time_mean > 0.).collect();
    log::info!("Cleaning dropped {} routes and {} connections",
               num_routes_before - routes.len(),
               num_connections_before - connections.len());

    (routes, connections)
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::feed::DirectionPredictions;
    use crate::feed::TripArrival;
    use crate::test_utils::make_connection;
    use crate::test_utils::make_stop;

    fn trip(trip_id: &str, minutes: f64) -> TripArrival {
        TripArrival{trip_id: String::from(trip_id), minutes}
    }

    fn stop_predictions(stop_tag: &str, directions: Vec<(&str, Vec<TripArrival>)>)
                        -> StopPredictions {
        StopPredictions {
            stop_tag: String::from(stop_tag),
            directions: directions.into_iter().map(|(title, trips)|
                DirectionPredictions{direction: String::from(title), trips}).collect(),
        }
    }

    #[test]
    fn test_wait_time_from_regular_gaps() {
        let predictions = vec![
            stop_predictions("100", vec![("East", vec![trip("t1", 5.), trip("t2", 10.),
                                                       trip("t3", 15.)])]),
        ];
        let (wait_mean, wait_std) = calculate_route_wait_time(&predictions);
        assert_relative_eq!(wait_mean, 5.);
        assert_relative_eq!(wait_std, 0.);
    }

    #[test]
    fn test_wait_time_does_not_mix_directions() {
        let predictions = vec![
            stop_predictions("100", vec![
                ("East", vec![trip("t1", 5.), trip("t2", 10.)]),
                ("West", vec![trip("t3", 3.), trip("t4", 9.)]),
            ]),
        ];
        // gaps are [5] and [6], never a cross-direction [2]
        let (wait_mean, wait_std) = calculate_route_wait_time(&predictions);
        assert_relative_eq!(wait_mean, 5.5);
        assert_relative_eq!(wait_std, 0.5);
    }

    #[test]
    fn test_wait_time_sentinel_without_gaps() {
        // one trip per stop gives nothing to difference
        let predictions = vec![
            stop_predictions("100", vec![("East", vec![trip("t1", 5.)])]),
            stop_predictions("200", vec![("East", vec![trip("t1", 8.)])]),
        ];
        let (wait_mean, wait_std) = calculate_route_wait_time(&predictions);
        assert_eq!(wait_mean, UNKNOWN);
        assert_eq!(wait_std, UNKNOWN);
    }

    #[test]
    fn test_connection_travel_times_matches_trip_ids() {
        let stops = vec![make_stop("100", 0., 0.), make_stop("200", 0., 0.01)];
        let connections = vec![make_connection("100", "200", &["501"])];
        let predictions = vec![
            stop_predictions("100", vec![("East", vec![trip("t1", 2.), trip("t2", 7.)])]),
            stop_predictions("200", vec![("East", vec![trip("t1", 5.), trip("t2", 12.)])]),
        ];

        let mut observed = HashMap::new();
        calculate_connection_travel_times(&predictions, "501", &connections, &stops,
                                          &mut observed);
        let times = &observed[&(String::from("100"), String::from("200"))];
        let mut times = times.clone();
        times.sort_by(|aa, bb| aa.partial_cmp(bb).unwrap());
        assert_eq!(times, vec![3., 5.]);
    }

    #[test]
    fn test_connection_travel_times_ignores_negative_and_other_routes() {
        let stops = vec![make_stop("100", 0., 0.), make_stop("200", 0., 0.01)];
        let connections = vec![
            make_connection("100", "200", &["501"]),
            make_connection("200", "100", &["502"]),
        ];
        let predictions = vec![
            stop_predictions("100", vec![("East", vec![trip("t1", 9.)])]),
            stop_predictions("200", vec![("East", vec![trip("t1", 4.)])]),
        ];

        let mut observed = HashMap::new();
        calculate_connection_travel_times(&predictions, "501", &connections, &stops,
                                          &mut observed);
        // t1 reaches 200 before 100, so the only candidate observation is
        // negative and gets discarded; the 502 connection is not this route's
        assert!(observed.is_empty());
    }

    #[test]
    fn test_connection_travel_times_resolves_merged_tags() {
        // stop 100 absorbed old stop 150; predictions still arrive keyed by
        // the original tag
        let mut merged_stop = make_stop("100", 0., 0.);
        merged_stop.merged.insert(String::from("150"));
        let stops = vec![merged_stop, make_stop("200", 0., 0.01)];
        let connections = vec![make_connection("100", "200", &["501"])];
        let predictions = vec![
            stop_predictions("150", vec![("East", vec![trip("t1", 1.)])]),
            stop_predictions("200", vec![("East", vec![trip("t1", 6.)])]),
        ];

        let mut observed = HashMap::new();
        calculate_connection_travel_times(&predictions, "501", &connections, &stops,
                                          &mut observed);
        let times = &observed[&(String::from("100"), String::from("200"))];
        assert_eq!(times, &vec![5.]);
    }

    #[test]
    fn test_average_network_speed_counts_zero_times() {
        let mut c1 = make_connection("1", "2", &["501"]);
        c1.road_length = 2.;
        c1.travel_time = 4.;
        let mut c2 = make_connection("2", "3", &["501"]);
        c2.road_length = 3.;
        c2.travel_time = 0.;
        let mut c3 = make_connection("3", "4", &["501"]);
        c3.road_length = 1.;
        c3.travel_time = UNKNOWN;

        // the zero-time connection dilutes the mean, the unknown one doesn't
        let speed = average_network_speed(&vec![c1, c2, c3]);
        assert_relative_eq!(speed, 0.25);
    }

    #[test]
    fn test_clean_network_imputes_and_drops() {
        let mut valid_route = Route::new("501", "ttc", 10);
        valid_route.wait_time_mean = 5.;
        valid_route.wait_time_std = 1.;
        let night_route = Route::new("301", "ttc", 10);

        let mut timed = make_connection("1", "2", &["501"]);
        timed.road_length = 2.;
        timed.length = 2.;
        timed.travel_time = 4.;
        let mut imputable = make_connection("2", "3", &["501", "301"]);
        imputable.length = 2.;
        imputable.road_length = 2.5;
        let orphaned = make_connection("3", "4", &["301"]);

        let (routes, connections) = clean_network(vec![valid_route, night_route],
                                                  vec![timed, imputable, orphaned]);

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].tag, "501");
        assert_eq!(connections.len(), 2);
        // average speed is 0.5 km/min from the one timed connection
        assert_relative_eq!(connections[1].travel_time, 2. * 0.5);
    }
}
