//! Zone commands - check positions and planned areas against restricted zones.

use clap::Subcommand;
use magsurvey::geodesy::{self, LatLon};
use magsurvey::zones::RestrictedZone;

use super::common::{BoundsArgs, LayerArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Zone subcommands.
#[derive(Debug, Subcommand)]
pub enum ZonesCommands {
    /// Check whether a position lies inside any zone
    Check {
        #[command(flatten)]
        layers: LayerArgs,

        /// Latitude (degrees)
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude (degrees)
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// List zones overlapping a planned survey area
    Plan {
        #[command(flatten)]
        layers: LayerArgs,

        #[command(flatten)]
        bounds: BoundsArgs,
    },

    /// Summarize the zones in the given layers
    List {
        #[command(flatten)]
        layers: LayerArgs,
    },
}

/// Run a zones subcommand.
pub fn run(command: ZonesCommands, runner: &CliRunner) -> Result<(), CliError> {
    match command {
        ZonesCommands::Check { layers, lat, lon } => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(CliError::InvalidArgument(format!(
                    "position ({}, {}) is out of range",
                    lat, lon
                )));
            }
            let index = layers.load(runner.config())?;
            let hits = index.query(lat, lon);

            if hits.is_empty() {
                println!("({:.6}, {:.6}) is outside all {} zones", lat, lon, index.len());
            } else {
                println!("({:.6}, {:.6}) is inside {} zone(s):", lat, lon, hits.len());
                for zone in hits {
                    print_zone(zone);
                }
            }
            Ok(())
        }
        ZonesCommands::Plan { layers, bounds } => {
            let bbox = bounds.to_bbox()?;
            let index = layers.load(runner.config())?;
            let hits = index.intersects(&bbox);

            let ring = [
                LatLon::new(bbox.south, bbox.west),
                LatLon::new(bbox.south, bbox.east),
                LatLon::new(bbox.north, bbox.east),
                LatLon::new(bbox.north, bbox.west),
            ];
            println!(
                "Survey area: {:.0} m², perimeter {:.0} m",
                geodesy::polygon_area(&ring),
                geodesy::polygon_perimeter(&ring)
            );

            if hits.is_empty() {
                println!("No restricted zones overlap the area");
            } else {
                println!("{} zone(s) overlap the area:", hits.len());
                for zone in hits {
                    print_zone(zone);
                }
            }
            Ok(())
        }
        ZonesCommands::List { layers } => {
            let index = layers.load(runner.config())?;
            println!("{} zone(s)", index.len());
            for zone in index.zones() {
                print_zone(zone);
            }
            Ok(())
        }
    }
}

fn print_zone(zone: &RestrictedZone) {
    println!(
        "  {:<32} {:<18} {:>14.0} m²  [{}]",
        zone.name,
        zone.category,
        zone.area_m2(),
        zone.layer
    );
}
