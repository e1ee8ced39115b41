use std::env;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use fontpatch_core::patch::{
    FontMatcher, MatchReport, Replacer, SwapFailure, TARGET_FONT_NAMES, read_font_bytes,
};

/// Where the game keeps the container, relative to the working directory.
const INPUT_SUBDIR: &str = "Schedule I_Data";
const INPUT_FILENAME: &str = "sharedassets0.assets";

#[derive(Debug, Parser)]
#[command(version, about = "Replace the stock UI fonts inside a game asset container")]
struct Cli {
    /// Path to the asset container. Defaults to the game data file under the
    /// current directory.
    #[arg(value_name = "ASSETS")]
    assets: Option<PathBuf>,
    /// Replacement font file (.ttf/.otf). Skips the picker dialog.
    #[arg(long, value_name = "FONT")]
    font: Option<PathBuf>,
    /// Print the replacement report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let assets_path = cli.assets.unwrap_or_else(default_assets_path);

    let font_path = match cli.font {
        Some(path) => path,
        None => match pick_font_file() {
            Some(path) => path,
            None => {
                println!("No font selected, nothing to do.");
                return;
            }
        },
    };

    // Read the replacement before touching the container, so a bad font
    // selection can never leave the original renamed away.
    let font_bytes = read_font_bytes(&font_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    let matcher = FontMatcher::new(TARGET_FONT_NAMES, font_bytes);
    let replacer = Replacer::new(&assets_path);

    if !cli.json {
        println!("Container: {}", assets_path.display());
        println!("Replacement font: {}", font_path.display());
        println!("Target fonts:");
        for chunk in TARGET_FONT_NAMES.chunks(4) {
            println!("  {}", chunk.join(", "));
        }
    }

    if replacer.stale_backup_exists() {
        eprintln!(
            "Warning: overwriting stale backup {}",
            replacer.backup_path().display()
        );
    }

    match replacer.run(&matcher) {
        Ok(report) => {
            if cli.json {
                print_json_report(&report);
            } else {
                print_text_report(&report, &replacer);
            }
        }
        Err(failure) => {
            report_failure(&failure, &replacer);
            process::exit(1);
        }
    }
}

fn default_assets_path() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|e| {
        eprintln!("Error determining current directory: {e}");
        process::exit(1);
    });
    cwd.join(INPUT_SUBDIR).join(INPUT_FILENAME)
}

fn pick_font_file() -> Option<PathBuf> {
    println!("Choose the replacement font in the file dialog...");
    rfd::FileDialog::new()
        .set_title("Choose the replacement font")
        .add_filter("Font Files", &["ttf", "otf"])
        .pick_file()
}

fn print_text_report(report: &MatchReport, replacer: &Replacer) {
    for replaced in &report.replaced {
        println!("  replaced {} (path_id {})", replaced.name, replaced.path_id);
    }
    for failure in &report.failures {
        eprintln!(
            "Warning: skipped object path_id {}: {}",
            failure.path_id, failure.message
        );
    }

    if report.matches_replaced == 0 {
        println!(
            "Scanned {} font object(s); none matched the target list. \
             The container was re-written unchanged.",
            report.candidates_seen
        );
    } else {
        println!(
            "Replaced {} of {} font object(s).",
            report.matches_replaced, report.candidates_seen
        );
    }
    println!(
        "Original kept as backup at {}",
        replacer.backup_path().display()
    );
}

fn print_json_report(report: &MatchReport) {
    let rendered = serde_json::to_string_pretty(report).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON report: {e}");
        process::exit(1);
    });
    println!("{rendered}");
}

fn report_failure(failure: &SwapFailure, replacer: &Replacer) {
    match failure {
        SwapFailure::BeforeBackup(cause) => {
            eprintln!("Error: {cause}");
            eprintln!(
                "{} was not modified.",
                replacer.original_path().display()
            );
        }
        SwapFailure::Restored { cause } => {
            eprintln!("Error: {cause}");
            eprintln!(
                "The original container was restored from the backup; {} is unchanged.",
                replacer.original_path().display()
            );
        }
        SwapFailure::Unrestored {
            cause,
            restore_error,
            backup_path,
        } => {
            eprintln!("Error: {cause}");
            eprintln!("Automatic restore failed: {restore_error}");
            eprintln!(
                "Recover manually by renaming {} back to {}.",
                backup_path.display(),
                replacer.original_path().display()
            );
        }
    }
}
