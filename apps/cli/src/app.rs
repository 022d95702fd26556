//! Application flow: resolve adb, bind the device, install, push.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use metaforce_adb::{ADB_EXECUTABLE, AdbCli, Provisioner, default_cache_dir};
use metaforce_deploy::{DeployOrchestrator, DeploymentTarget, OperationOptions, PackageInfo};
use metaforce_device::{DeviceIdentity, DeviceSession};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::args::Cli;
use crate::config::Config;
use crate::progress;

/// Runs one deployment. Ctrl-C cancels the operation in flight.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let destination = resolve_destination(&cli, &config)?;

    let adb = {
        let explicit = cli.adb.clone().or_else(|| config.adb_path.clone());
        let bundle_dir = config.adb_bundle_dir.clone();
        tokio::task::spawn_blocking(move || {
            resolve_adb(explicit, bundle_dir.as_deref(), &default_cache_dir())
        })
        .await??
    };
    tracing::info!(adb = %adb.display(), "using adb");

    let session = DeviceSession::new(Arc::new(AdbCli::default()), adb);
    let orchestrator = DeployOrchestrator::new(session, Handle::current());

    let device = orchestrator
        .initialize()
        .await
        .context("no Android device available")?;
    if cli.json {
        println!("{}", serde_json::to_string(device.as_ref())?);
    } else {
        print!("{}", describe_device(&device));
    }

    let printer = tokio::spawn(progress::print_events(orchestrator.subscribe(), cli.json));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, cancelling");
                cancel.cancel();
            }
        }
    });

    let target = DeploymentTarget {
        package_path: cli.apk.clone(),
        content_path: cli.content.clone(),
        destination,
    };
    let result = orchestrator
        .deploy(&target, OperationOptions::default().with_cancel(cancel))
        .await;

    interrupt.abort();
    // Closes the event stream, even with a cancelled transport call still
    // unwinding, so the printer drains and exits.
    drop(orchestrator);
    printer.await?;

    result?;
    if !cli.json {
        println!("Deployment completed successfully");
    }
    Ok(())
}

/// Picks the adb executable: an explicit path wins, then a provisioned
/// bundle, then `adb` from `PATH`.
fn resolve_adb(
    explicit: Option<PathBuf>,
    bundle_dir: Option<&Path>,
    cache_dir: &Path,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(dir) = bundle_dir {
        let provisioner = Provisioner::from_bundle_dir(cache_dir, dir)
            .with_context(|| format!("failed to read adb bundle {}", dir.display()))?;
        return provisioner
            .ensure()
            .with_context(|| format!("failed to provision adb into {}", cache_dir.display()));
    }
    Ok(PathBuf::from(ADB_EXECUTABLE))
}

/// `--output` verbatim, or the package's files directory.
fn resolve_destination(cli: &Cli, config: &Config) -> anyhow::Result<String> {
    if let Some(output) = &cli.output {
        return Ok(output.clone());
    }
    let package = cli
        .package
        .as_deref()
        .context("either --output or --package is required")?;
    PackageInfo::new(package)
        .content_destination(&config.app_data_root, &cli.content)
        .with_context(|| {
            format!(
                "cannot derive a destination for {} in package {package:?}",
                cli.content.display()
            )
        })
}

fn describe_device(device: &DeviceIdentity) -> String {
    let mut text = format!("Device: {}\nState: {}\n", device.serial, device.state);
    match (device.model.is_empty(), device.name.is_empty()) {
        (true, true) => {}
        (false, true) => text.push_str(&format!("Model: {}\n", device.model)),
        _ => text.push_str(&format!("Model: {} - {}\n", device.model, device.name)),
    }
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use metaforce_device::ConnectionState;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["metaforce-installer", "-a", "app.apk", "-c", "/tmp/out/data.zip"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn output_flag_is_used_verbatim() {
        let dest = resolve_destination(&cli(&["-o", "/sdcard/x.zip", "-p", "com.a"]), &Config::default());
        assert_eq!(dest.unwrap(), "/sdcard/x.zip");
    }

    #[test]
    fn package_flag_derives_destination() {
        let config = Config {
            app_data_root: "/sdcard/Android/data".into(),
            ..Config::default()
        };
        let dest = resolve_destination(&cli(&["-p", "com.metaforce.app"]), &config).unwrap();
        assert_eq!(dest, "/sdcard/Android/data/com.metaforce.app/files/data.zip");
    }

    #[test]
    fn explicit_adb_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let adb = resolve_adb(
            Some(PathBuf::from("/opt/adb")),
            Some(tmp.path()),
            &tmp.path().join("cache"),
        )
        .unwrap();
        assert_eq!(adb, PathBuf::from("/opt/adb"));
        assert!(!tmp.path().join("cache").exists());
    }

    #[test]
    fn bundle_is_provisioned_into_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("bundle");
        std::fs::create_dir(&bundle).unwrap();
        std::fs::write(bundle.join(ADB_EXECUTABLE), b"binary").unwrap();
        let cache = tmp.path().join("cache");

        let adb = resolve_adb(None, Some(&bundle), &cache).unwrap();

        assert_eq!(adb, cache.join(ADB_EXECUTABLE));
        assert_eq!(std::fs::read(&adb).unwrap(), b"binary");
    }

    #[test]
    fn missing_bundle_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_adb(None, Some(&tmp.path().join("nope")), &tmp.path().join("cache"));
        assert!(err.is_err());
    }

    #[test]
    fn falls_back_to_path_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_adb(None, None, tmp.path()).unwrap(),
            PathBuf::from(ADB_EXECUTABLE)
        );
    }

    #[test]
    fn device_description() {
        let device = DeviceIdentity::new("1WMHH815K10123", ConnectionState::Connected)
            .with_model("Quest 3", "eureka");
        assert_eq!(
            describe_device(&device),
            "Device: 1WMHH815K10123\nState: connected\nModel: Quest 3 - eureka\n\n"
        );

        let bare = DeviceIdentity::new("emulator-5554", ConnectionState::Offline);
        assert_eq!(describe_device(&bare), "Device: emulator-5554\nState: offline\n\n");
    }
}
