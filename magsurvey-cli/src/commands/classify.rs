//! Classify command - severity of a single reading.

use clap::Args;
use magsurvey::classify::{noise, severity_for};
use magsurvey::measurement::RawField;
use magsurvey::mission::{
    Thresholds, DEFAULT_DANGER_THRESHOLD_UT, DEFAULT_REFERENCE_UT, DEFAULT_SAFE_THRESHOLD_UT,
};

use crate::error::CliError;

/// Arguments for the classify command.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Total field magnitude in μT (alternative to --x/--y/--z)
    #[arg(long, conflicts_with_all = ["x", "y", "z"])]
    pub magnitude: Option<f64>,

    /// X axis in μT
    #[arg(long, allow_hyphen_values = true, requires_all = ["y", "z"])]
    pub x: Option<f64>,

    /// Y axis in μT
    #[arg(long, allow_hyphen_values = true)]
    pub y: Option<f64>,

    /// Z axis in μT
    #[arg(long, allow_hyphen_values = true)]
    pub z: Option<f64>,

    /// Reference field in μT
    #[arg(long, default_value_t = DEFAULT_REFERENCE_UT)]
    pub reference: f64,

    /// Safe threshold in μT
    #[arg(long, default_value_t = DEFAULT_SAFE_THRESHOLD_UT)]
    pub safe: f64,

    /// Danger threshold in μT
    #[arg(long, default_value_t = DEFAULT_DANGER_THRESHOLD_UT)]
    pub danger: f64,
}

/// Run the classify command.
pub fn run(args: ClassifyArgs) -> Result<(), CliError> {
    let thresholds = Thresholds::new(args.safe, args.danger)?;

    let magnitude = match (args.magnitude, args.x, args.y, args.z) {
        (Some(magnitude), _, _, _) => magnitude,
        (None, Some(x), Some(y), Some(z)) => RawField::new(x, y, z).magnitude(),
        _ => {
            return Err(CliError::InvalidArgument(
                "give --magnitude or all of --x, --y and --z".to_string(),
            ))
        }
    };
    if !magnitude.is_finite() {
        return Err(CliError::InvalidArgument(format!(
            "magnitude must be finite, got {}",
            magnitude
        )));
    }

    let noise = noise(magnitude, args.reference);
    let severity = severity_for(noise, thresholds);

    println!("Magnitude: {:.2} μT", magnitude);
    println!("Noise:     {:.2} μT (reference {:.2})", noise, args.reference);
    println!(
        "Severity:  {} (safe < {}, danger ≥ {})",
        severity,
        thresholds.safe(),
        thresholds.danger()
    );

    Ok(())
}
