use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use routier::VehicleProfile;

#[derive(Parser)]
struct Cli {
    /// The path to the directory with .rtil map tiles
    map_dir: PathBuf,

    /// Latitude of the start point
    start_lat: f64,

    /// Longitude of the start point
    start_lon: f64,

    /// Latitude of the end point
    end_lat: f64,

    /// Longitude of the end point
    end_lon: f64,

    /// Vehicle profile: car, pedestrian or bicycle
    #[arg(long, default_value = "car")]
    profile: String,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let profile = profile_by_name(&cli.profile)
        .ok_or_else(|| format!("unknown profile: {}", cli.profile))?;

    let mut router = routier::Router::new(&cli.map_dir, profile)?;
    let cancel = AtomicBool::new(false);
    let route = router.build_route(
        routier::LatLon::new(cli.start_lat, cli.start_lon),
        routier::LatLon::new(cli.end_lat, cli.end_lon),
        &cancel,
    )?;

    for turn in route.turns() {
        log::info!("{:?} at point {}", turn.direction, turn.point_index);
    }
    for name in route.absent_tiles() {
        log::warn!("missing tile skipped: {}", name);
    }

    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!(
        "      \"properties\": {{\"distance_m\": {:.1}, \"time_s\": {:.1}}},",
        route.distance_m(),
        route.total_time_s(),
    );

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut points = route.points().iter().peekable();
    while let Some(point) = points.next() {
        let suffix = if points.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", point.lon, point.lat, suffix);
    }

    println!("        ]");
    println!("      }}");
    println!("    }}");
    println!("  ]");
    println!("}}");

    Ok(())
}

fn profile_by_name(name: &str) -> Option<&'static VehicleProfile<'static>> {
    match name {
        "car" => Some(&routier::profile::CAR),
        "pedestrian" => Some(&routier::profile::PEDESTRIAN),
        "bicycle" => Some(&routier::profile::BICYCLE),
        _ => None,
    }
}
