use std::path::Path;
use std::path::PathBuf;

use yaml_rust::Yaml;
use yaml_rust::YamlLoader;

/// All tunable parameters of the builder and the evaluator, read once at
/// startup and passed around immutably.  The config file holds one section
/// per agency; `agency` selects which one applies.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub agency: String,
    /// directory under which this agency's csv files live
    pub data_dir: PathBuf,
    /// directory holding saved feed payloads, when the file feed is used
    pub feed_dir: PathBuf,
    pub earth_radius_km: f64,
    /// stops closer than this with no direct connection get merged
    pub merge_threshold_km: f64,
    /// walking distance used for coverage counts and bounding-box margins
    pub walk_cutoff_km: f64,
    /// a point belongs to the service area if a stop lies within this range
    pub service_cutoff_km: f64,
    /// empirical correction applied to transfer counts and leg wait times
    pub transfer_deflation: f64,
    /// routed distances beyond this multiple of the straight-line distance
    /// get re-queried individually
    pub suspicious_ratio: f64,
    /// pair count per road-distance request
    pub distance_chunk_size: usize,
    pub beeline_factor: f64,
    pub max_resample_attempts: u32,
}

impl NetworkConfig {
    pub fn new(agency: &str, data_dir: &Path) -> NetworkConfig {
        NetworkConfig {
            agency: String::from(agency),
            data_dir: PathBuf::from(data_dir),
            feed_dir: PathBuf::from(data_dir),
            earth_radius_km: 6371.,
            merge_threshold_km: 0.05,
            walk_cutoff_km: 0.4,
            service_cutoff_km: 0.8,
            transfer_deflation: 0.7,
            suspicious_ratio: 2.,
            distance_chunk_size: 100,
            beeline_factor: 1.3,
            max_resample_attempts: 20,
        }
    }

    pub fn from_yaml_file(config_path_str: &str, agency: &str) -> NetworkConfig {
        let config_path = PathBuf::from(config_path_str);
        let file_contents = std::fs::read_to_string(config_path.clone()).
            expect("Failed to read network config file!");
        let yaml_cfg = YamlLoader::load_from_str(&file_contents).
            expect("Failed to parse network config as yaml!");
        let base_dir = config_path.as_path().parent().
            expect("Config path has no parent directory!");
        NetworkConfig::from_yaml(&yaml_cfg[0], agency, base_dir)
    }

    pub fn from_yaml(yaml_cfg: &Yaml, agency: &str, base_dir: &Path) -> NetworkConfig {
        let section = &yaml_cfg[agency];
        if section.is_badvalue() {
            panic!("No config section for agency {}!", agency);
        }

        let data_dir = match section["data_dir"].as_str() {
            Some(dir) => str_to_absolute_path(dir, base_dir),
            None => PathBuf::from(base_dir),
        };
        let feed_dir = match section["feed_dir"].as_str() {
            Some(dir) => str_to_absolute_path(dir, base_dir),
            None => data_dir.clone(),
        };

        let mut cfg = NetworkConfig::new(agency, &data_dir);
        cfg.feed_dir = feed_dir;
        cfg.earth_radius_km = yaml_f64(section, "earth_radius_km", cfg.earth_radius_km);
        cfg.merge_threshold_km = yaml_f64(section, "merge_threshold_km", cfg.merge_threshold_km);
        cfg.walk_cutoff_km = yaml_f64(section, "walk_cutoff_km", cfg.walk_cutoff_km);
        cfg.service_cutoff_km = yaml_f64(section, "service_cutoff_km", cfg.service_cutoff_km);
        cfg.transfer_deflation = yaml_f64(section, "transfer_deflation", cfg.transfer_deflation);
        cfg.suspicious_ratio = yaml_f64(section, "suspicious_ratio", cfg.suspicious_ratio);
        cfg.distance_chunk_size = yaml_f64(section, "distance_chunk_size",
                                           cfg.distance_chunk_size as f64) as usize;
        cfg.beeline_factor = yaml_f64(section, "beeline_factor", cfg.beeline_factor);
        cfg.max_resample_attempts = yaml_f64(section, "max_resample_attempts",
                                             cfg.max_resample_attempts as f64) as u32;
        return cfg;
    }

    /// Where this agency's stops/connections/routes/demographics csvs live.
    pub fn agency_dir(&self) -> PathBuf {
        self.data_dir.join(&self.agency)
    }
}

// yaml-rust reports whole numbers as integers, so check both.
fn yaml_f64(section: &Yaml, key: &str, default: f64) -> f64 {
    match section[key].as_f64() {
        Some(value) => value,
        None => match section[key].as_i64() {
            Some(value) => value as f64,
            None => default,
        },
    }
}

pub fn str_to_absolute_path(path_str: &str, default_base_dir: &Path) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        return path;
    } else {
        return [default_base_dir, Path::new(&path)].iter().collect();
    }
}
