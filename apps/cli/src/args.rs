//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Install an APK on the connected Android device and push its content
/// archive next to it.
#[derive(Parser, Debug)]
#[command(name = "metaforce-installer")]
#[command(version)]
#[command(after_help = "Example:\n  metaforce-installer -a app.apk -c data.zip -o /sdcard/data.zip")]
pub struct Cli {
    /// Path to the APK file.
    #[arg(short, long, value_name = "FILE")]
    pub apk: PathBuf,

    /// Path to the content archive.
    #[arg(short, long, value_name = "FILE")]
    pub content: PathBuf,

    /// Device path the content archive is copied to.
    #[arg(short, long, value_name = "DEVICE_PATH", required_unless_present = "package")]
    pub output: Option<String>,

    /// Package name; places the content under the app's data directory
    /// when `--output` is not given.
    #[arg(short, long, value_name = "NAME")]
    pub package: Option<String>,

    /// adb executable to use instead of the configured or bundled one.
    #[arg(long, value_name = "FILE")]
    pub adb: Option<PathBuf>,

    /// Print events as JSON lines instead of a progress bar.
    #[arg(long)]
    pub json: bool,

    /// Path to the configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
