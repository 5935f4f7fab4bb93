use std::time::Duration;

use camconfig::OverlayCorner;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "delaycam",
    author,
    version,
    about = "Delayed mirror: plays back the last few seconds with the live feed in a corner",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Frame resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Source frame rate.
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Playback delay in seconds or as a human-readable duration (`5s`, `1m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_delay)]
    pub delay: Option<Duration>,

    /// Corner for the live overlay: `top-left`, `top-right`, `bottom-left`,
    /// `bottom-right`, or `off`.
    #[arg(long, value_name = "CORNER", value_parser = parse_pip)]
    pub pip: Option<PipChoice>,

    /// Live overlay size as a fraction of the window (0-1].
    #[arg(long, value_name = "SCALE", value_parser = parse_pip_scale)]
    pub pip_scale: Option<f32>,

    /// Mirror the live feed horizontally.
    #[arg(long)]
    pub mirror: bool,

    /// Persist the effective settings before starting.
    #[arg(long)]
    pub save: bool,

    /// How long to wait for the render thread on exit.
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 1500)]
    pub stop_timeout_ms: u64,
}

/// Overlay selection from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipChoice {
    Corner(OverlayCorner),
    Off,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the longest delay this machine can buffer.
    Budget(BudgetArgs),
    /// Inspect or reset the persisted settings.
    Settings(SettingsCommand),
}

#[derive(Parser, Debug)]
pub struct BudgetArgs {
    /// Frame resolution; defaults to the saved setting.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Frame rate; defaults to the saved setting.
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Pretend this many megabytes (MiB) are available instead of asking the system.
    #[arg(long, value_name = "MB")]
    pub available_mb: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct SettingsCommand {
    #[command(subcommand)]
    pub action: SettingsAction,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the effective settings as TOML.
    Show,
    /// Print the settings file location.
    Where,
    /// Overwrite the settings file with defaults.
    Reset,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_fps(value: &str) -> Result<u32, String> {
    let fps = value
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid frame rate '{value}'"))?;
    if fps == 0 {
        return Err("frame rate must be greater than zero".into());
    }
    Ok(fps)
}

pub fn parse_delay(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    let delay = match trimmed.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds > 0.0 => Duration::from_secs_f64(seconds),
        Ok(_) => return Err("delay must be greater than zero".into()),
        Err(_) => humantime::parse_duration(trimmed)
            .map_err(|err| format!("invalid delay '{trimmed}': {err}"))?,
    };
    if delay.is_zero() {
        return Err("delay must be greater than zero".into());
    }
    Ok(delay)
}

pub fn parse_pip(value: &str) -> Result<PipChoice, String> {
    let normalized = value.trim().to_ascii_lowercase();
    if matches!(normalized.as_str(), "off" | "none" | "hidden") {
        return Ok(PipChoice::Off);
    }
    OverlayCorner::parse(&normalized)
        .map(PipChoice::Corner)
        .ok_or_else(|| {
            format!(
                "unknown corner '{value}'; expected top-left, top-right, bottom-left, bottom-right, or off"
            )
        })
}

pub fn parse_pip_scale(value: &str) -> Result<f32, String> {
    let scale = value
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid scale '{value}'"))?;
    if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
        return Err("scale must lie within (0, 1]".into());
    }
    Ok(scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size(" 640X480 ").unwrap(), (640, 480));
        assert!(parse_size("1920").is_err());
        assert!(parse_size("0x720").is_err());
    }

    #[test]
    fn parses_delays() {
        assert_eq!(parse_delay("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_delay("1.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_delay("1m").unwrap(), Duration::from_secs(60));
        assert!(parse_delay("0").is_err());
        assert!(parse_delay("soon").is_err());
    }

    #[test]
    fn parses_pip_choices() {
        assert_eq!(
            parse_pip("bottom-left").unwrap(),
            PipChoice::Corner(OverlayCorner::BottomLeft)
        );
        assert_eq!(
            parse_pip("TOP_RIGHT").unwrap(),
            PipChoice::Corner(OverlayCorner::TopRight)
        );
        assert_eq!(parse_pip("off").unwrap(), PipChoice::Off);
        assert!(parse_pip("middle").is_err());
        assert!(parse_pip_scale("0.3").is_ok());
        assert!(parse_pip_scale("1.2").is_err());
    }

    #[test]
    fn cli_accepts_run_flags_and_subcommands() {
        let cli = Cli::try_parse_from([
            "delaycam", "--size", "640x480", "--fps", "24", "--delay", "10s", "--pip", "off",
            "--mirror",
        ])
        .unwrap();
        assert_eq!(cli.run.size, Some((640, 480)));
        assert_eq!(cli.run.fps, Some(24));
        assert_eq!(cli.run.delay, Some(Duration::from_secs(10)));
        assert_eq!(cli.run.pip, Some(PipChoice::Off));
        assert!(cli.run.mirror);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["delaycam", "budget", "--available-mb", "4096"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Budget(BudgetArgs {
                available_mb: Some(4096),
                ..
            }))
        ));
    }
}
