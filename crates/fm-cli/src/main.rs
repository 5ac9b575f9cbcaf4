//! Focus Mode CLI
//!
//! Check titles against a settings file, scan saved pages and edit settings.

use std::fs;

use clap::{Parser, Subcommand, ValueEnum};

use fm_cli::commands::{
    check_titles, edit_settings, load_settings, load_settings_or_default, scan_page, SettingsEdits,
    DEFAULT_PAGE_URL,
};
use fm_core::types::DetectorState;

#[derive(Parser)]
#[command(name = "fm-cli")]
#[command(about = "Focus Mode filter checks and settings tools")]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decide keep/hide for each title
    Check {
        /// Settings JSON file (defaults when omitted)
        #[arg(short, long)]
        settings: Option<String>,

        /// Override focus mode
        #[arg(short, long, value_enum)]
        mode: Option<Toggle>,

        /// Titles to evaluate
        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// Run scan passes over a saved page
    Scan {
        /// Saved HTML page
        #[arg(long)]
        html: String,

        /// Settings JSON file (defaults when omitted)
        #[arg(short, long)]
        settings: Option<String>,

        /// URL the page was saved from
        #[arg(short, long, default_value = DEFAULT_PAGE_URL)]
        url: String,

        /// Number of passes
        #[arg(short, long, default_value_t = 2)]
        passes: u32,
    },

    /// Sanitize and edit a settings file
    Settings {
        /// Settings JSON file
        #[arg(short, long)]
        input: String,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long, value_enum)]
        mode: Option<Toggle>,

        #[arg(long = "add-blacklist")]
        add_blacklist: Vec<String>,

        #[arg(long = "remove-blacklist")]
        remove_blacklist: Vec<String>,

        #[arg(long = "add-focus")]
        add_focus: Vec<String>,

        #[arg(long = "remove-focus")]
        remove_focus: Vec<String>,

        #[arg(long = "add-site")]
        add_sites: Vec<String>,

        #[arg(long = "remove-site")]
        remove_sites: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Check { settings, mode, titles } => cmd_check(settings.as_deref(), mode, &titles),
        Commands::Scan {
            html,
            settings,
            url,
            passes,
        } => cmd_scan(&html, settings.as_deref(), &url, passes),
        Commands::Settings {
            input,
            output,
            mode,
            add_blacklist,
            remove_blacklist,
            add_focus,
            remove_focus,
            add_sites,
            remove_sites,
        } => {
            let edits = SettingsEdits {
                mode: mode.map(Toggle::enabled),
                add_blacklist,
                remove_blacklist,
                add_focus,
                remove_focus,
                add_sites,
                remove_sites,
            };
            cmd_settings(&input, output.as_deref(), &edits)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_check(settings: Option<&str>, mode: Option<Toggle>, titles: &[String]) -> Result<(), String> {
    let mut settings = load_settings_or_default(settings)?;
    if let Some(mode) = mode {
        settings.mode = mode.enabled();
    }

    for verdict in check_titles(&settings, titles) {
        match verdict.hide {
            Some((reason, keyword)) if keyword.is_empty() => {
                println!("HIDE  {:<12} {}", reason.as_str(), verdict.title)
            }
            Some((reason, keyword)) => {
                println!("HIDE  {:<12} {} [{}]", reason.as_str(), verdict.title, keyword)
            }
            None => println!("KEEP  {:<12} {}", "", verdict.title),
        }
    }
    Ok(())
}

fn cmd_scan(html: &str, settings: Option<&str>, url: &str, passes: u32) -> Result<(), String> {
    if passes == 0 {
        return Err("--passes must be at least 1".to_string());
    }
    let settings = load_settings_or_default(settings)?;
    let page = fs::read_to_string(html).map_err(|e| format!("Failed to read '{}': {}", html, e))?;

    let outcome = scan_page(&page, &settings, url, passes)?;
    if outcome.state != DetectorState::Active {
        println!("Not an allowed site: {}", url);
        println!("  Allowed:     {}", settings.allowed_sites.join(", "));
        return Ok(());
    }

    println!("Scanned '{}' as {}", html, url);
    for (i, report) in outcome.passes.iter().enumerate() {
        println!(
            "  Pass {}:      {} candidates, {} new, {} skipped, {} hidden ({} blacklisted, {} distractions), {} errors",
            i + 1,
            report.candidates,
            report.evaluated,
            report.skipped,
            report.hidden(),
            report.blacklisted,
            report.distractions,
            report.errors,
        );
    }

    if !outcome.hidden.is_empty() {
        println!();
        println!("Hidden:");
        for item in &outcome.hidden {
            println!(
                "  {:<14} {:<12} {}",
                item.kind.map(|k| k.as_str()).unwrap_or("unknown"),
                item.reason.map(|r| r.as_str()).unwrap_or("-"),
                item.title
            );
        }
    }
    Ok(())
}

fn cmd_settings(input: &str, output: Option<&str>, edits: &SettingsEdits) -> Result<(), String> {
    let settings = load_settings(input)?;
    let settings = edit_settings(&settings, edits)?;
    let json = settings.to_json_pretty().map_err(|e| e.to_string())?;

    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", json)).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            println!("Wrote settings to '{}'", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
