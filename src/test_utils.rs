use crate::transit_graph::Connection;
use crate::transit_graph::Stop;


/// Shorthand stop constructor for test fixtures.
pub fn make_stop(tag: &str, lat: f64, lon: f64) -> Stop {
    Stop::new(tag, &format!("Stop {}", tag), lat, lon)
}

/// Shorthand connection constructor for test fixtures.
pub fn make_connection(from: &str, to: &str, routes: &[&str]) -> Connection {
    let mut connection = Connection::new(from, to, routes[0]);
    for route in &routes[1..] {
        connection.routes.insert(String::from(*route));
    }

    connection
}
