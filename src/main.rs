use std::error::Error;

use transit_net_eval::{estimate_travel_times, evaluate_network, read_connections_file,
                       read_routes_file, read_stops_file, write_connections_file,
                       write_routes_file, write_stops_file, BeelineDistances, FileFeed,
                       NetworkConfig, StaticNetworkBuilder};


fn build_static(cfg: &NetworkConfig) -> Result<(), Box<dyn Error>> {
    let feed = FileFeed::new(&cfg.feed_dir);
    let distances = BeelineDistances {
        radius_km: cfg.earth_radius_km,
        beeline_factor: cfg.beeline_factor,
    };

    let builder = StaticNetworkBuilder::new(cfg);
    let (stops, connections, routes) = builder.build(&feed, &distances)?;

    let dir = cfg.agency_dir();
    write_stops_file(&dir, &stops)?;
    write_connections_file(&dir, &connections)?;
    write_routes_file(&dir, &routes)?;
    log::info!("Wrote {} stops, {} connections and {} routes to {}",
               stops.len(), connections.len(), routes.len(), dir.display());

    Ok(())
}

fn estimate_timing(cfg: &NetworkConfig) -> Result<(), Box<dyn Error>> {
    let dir = cfg.agency_dir();
    let stops = read_stops_file(&dir)?;
    let mut connections = read_connections_file(&dir)?;
    let mut routes = read_routes_file(&dir)?;

    let feed = FileFeed::new(&cfg.feed_dir);
    estimate_travel_times(&feed, &stops, &mut connections, &mut routes)?;

    write_connections_file(&dir, &connections)?;
    write_routes_file(&dir, &routes)?;
    log::info!("Updated timing data for {} connections and {} routes",
               connections.len(), routes.len());

    Ok(())
}

fn evaluate(cfg: &NetworkConfig, num_samples: usize) -> Result<(), Box<dyn Error>> {
    let metrics = evaluate_network(cfg, num_samples)?;
    println!("{:#?}", metrics);

    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: {} static|timing|evaluate <config.yaml> <agency> [num_samples]",
                  args[0]);
        std::process::exit(2);
    }

    let cfg = NetworkConfig::from_yaml_file(&args[2], &args[3]);
    let result = match args[1].as_str() {
        "static" => build_static(&cfg),
        "timing" => estimate_timing(&cfg),
        "evaluate" => {
            let num_samples = match args.get(4) {
                Some(arg) => arg.parse().expect("num_samples must be an integer!"),
                None => 1000,
            };
            evaluate(&cfg, num_samples)
        }
        command => {
            eprintln!("unknown command: {}", command);
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
