// Licensed under the Apache-2.0 license

//! Z9664F firmware utility
//!
//! Drives the component firmware operations from the command line, the same
//! way the platform host does:
//!
//! ```bash
//! z9664f-fwutil show
//! z9664f-fwutil available --image onie-firmware-x86_64-dell_z9664f-r0.bin
//! z9664f-fwutil auto-update --image onie-firmware.bin --component BIOS --boot-type cold
//! ```

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::str::FromStr;
use z9664f_component::component::COLD_BOOT;
use z9664f_component::config::DEFAULT_CONFIG_PATH;
use z9664f_component::{
    all_components, Component, ComponentBase, ComponentKind, FirmwareImage, PlatformConfig,
    UpdateOutcome,
};
use z9664f_platform::{LinuxHwAccess, SystemCommandRunner};

type FwComponent = Component<SystemCommandRunner, LinuxHwAccess<SystemCommandRunner>>;

#[derive(Parser)]
#[command(version, about = "Z9664F component firmware utility", long_about = None)]
struct Fwutil {
    /// Configuration file. Defaults to /etc/sonic/z9664f-fwutil.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the installed firmware version of every component
    Show,
    /// Print this platform's version manifest from a firmware image
    Manifest {
        #[arg(long)]
        image: PathBuf,
    },
    /// Show the firmware versions an image would install
    Available {
        #[arg(long)]
        image: PathBuf,

        /// Component name, e.g. "System CPLD". All components when omitted.
        #[arg(long)]
        component: Option<String>,
    },
    /// Show what is required to complete an update from an image
    Notify {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        component: Option<String>,
    },
    /// Stage an update without rebooting
    Install {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        component: String,
    },
    /// Stage an update and reboot to apply it
    Update {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        component: String,
    },
    /// Stage an update for the given boot type and print the status code
    AutoUpdate {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        component: String,

        /// none, fast, warm or cold
        #[arg(long, default_value = COLD_BOOT)]
        boot_type: String,
    },
}

fn main() -> Result<()> {
    let cli = Fwutil::parse();

    let config = match &cli.config {
        Some(path) => PlatformConfig::from_file(path)?,
        None => PlatformConfig::from_optional_file(DEFAULT_CONFIG_PATH)?,
    };
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let level = LevelFilter::from_str(level).map_err(|_| anyhow!("invalid log level: {level}"))?;
    SimpleLogger::new().with_level(level).init()?;

    let runner = SystemCommandRunner;
    let components = all_components(runner, config.hw_access(runner), &config);

    match cli.command {
        Commands::Show => {
            for component in &components {
                println!(
                    "{:<18} {:<16} {}",
                    component.get_name(),
                    component.get_firmware_version(),
                    component.get_description()
                );
            }
        }
        Commands::Manifest { image } => {
            let manifest = FirmwareImage::new(image)
                .with_work_dir(config.work_dir.clone())
                .available_versions()?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Available { image, component } => {
            for component in select(&components, component.as_deref())? {
                println!(
                    "{}: {}",
                    component.get_name(),
                    component.get_available_firmware_version(&image)
                );
            }
        }
        Commands::Notify { image, component } => {
            for component in select(&components, component.as_deref())? {
                let notification = component
                    .get_firmware_update_notification(&image)
                    .unwrap_or_else(|| "no action required".to_string());
                println!("{}: {}", component.get_name(), notification);
            }
        }
        Commands::Install { image, component } => {
            let component = find(&components, &component)?;
            if !component.install_firmware(&image) {
                bail!(
                    "failed to install {} firmware from {}",
                    component.get_name(),
                    image.display()
                );
            }
        }
        Commands::Update { image, component } => {
            let component = find(&components, &component)?;
            match component.update_firmware(&image)? {
                UpdateOutcome::ImageNotFound => bail!("{} is not a file", image.display()),
                UpdateOutcome::UpToDate => println!("{}: up-to-date", component.get_name()),
                UpdateOutcome::RebootIssued => println!("{}: rebooting", component.get_name()),
            }
        }
        Commands::AutoUpdate {
            image,
            component,
            boot_type,
        } => {
            let component = find(&components, &component)?;
            let status = component.auto_update_firmware(&image, &boot_type)?;
            println!("{}", status.code());
        }
    }

    Ok(())
}

fn find<'a>(components: &'a [FwComponent], name: &str) -> Result<&'a FwComponent> {
    let kind = ComponentKind::from_name(name).ok_or_else(|| {
        let names: Vec<_> = ComponentKind::ALL.iter().map(|kind| kind.name()).collect();
        anyhow!("unknown component {name:?}; expected one of {names:?}")
    })?;
    components
        .get(kind.index())
        .ok_or_else(|| anyhow!("component {name:?} not loaded"))
}

fn select<'a>(components: &'a [FwComponent], name: Option<&str>) -> Result<Vec<&'a FwComponent>> {
    match name {
        Some(name) => Ok(vec![find(components, name)?]),
        None => Ok(components.iter().collect()),
    }
}
