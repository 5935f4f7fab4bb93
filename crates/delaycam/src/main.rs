mod cli;
mod paths;
mod pattern;
mod run;

use anyhow::Result;
use camconfig::budget::{buffer_budget_bytes, max_delay_seconds};
use camconfig::Settings;
use cli::{BudgetArgs, Command, SettingsAction};
use paths::AppPaths;

const MIB: u64 = 1024 * 1024;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Budget(args)) => run_budget(args),
        Some(Command::Settings(settings_cmd)) => handle_settings_command(settings_cmd.action),
        None => run::run(cli.run),
    }
}

fn run_budget(args: BudgetArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = Settings::load_or_default(&paths.settings_file())?;
    let (width, height) = args.size.unwrap_or((settings.width, settings.height));
    let fps = args.fps.unwrap_or(settings.fps);
    let available = match args.available_mb {
        Some(mb) => mb.saturating_mul(MIB),
        None => run::available_memory(),
    };

    let budget = buffer_budget_bytes(available);
    let max_delay = max_delay_seconds(width, height, fps, available);
    println!("Frame size:       {width}x{height} @ {fps} fps");
    println!("Available memory: {} MiB", available / MIB);
    println!("Buffer budget:    {} MB", budget / 1_000_000);
    println!("Maximum delay:    {max_delay} s");
    if settings.delay.as_secs() > u64::from(max_delay) {
        println!(
            "Saved delay of {} exceeds the budget and will be clamped.",
            humantime::format_duration(settings.delay)
        );
    }
    Ok(())
}

fn handle_settings_command(action: SettingsAction) -> Result<()> {
    let paths = AppPaths::discover()?;
    let path = paths.settings_file();

    match action {
        SettingsAction::Show => {
            let settings = Settings::load_or_default(&path)?;
            print!("{}", settings.to_toml_string()?);
        }
        SettingsAction::Where => {
            println!("{}", path.display());
        }
        SettingsAction::Reset => {
            Settings::default().persist(&path)?;
            println!("Settings reset: {}", path.display());
        }
    }
    Ok(())
}
