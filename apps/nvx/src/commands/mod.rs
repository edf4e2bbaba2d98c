//! Command modules for the nvx CLI.
//!
//! - [`install`] - Download and unpack a version
//! - [`use_cmd`] - Switch the active version
//! - [`uninstall`] - Remove an installed version
//! - [`list`] - List installed versions
//! - [`current`] - Show the active version

pub mod current;
pub mod install;
pub mod list;
pub mod uninstall;
pub mod use_cmd;

use crate::config::Config;
use crate::toolchain::conflict::{PathStatus, format_conflict_warning, path_status};
use crate::toolchain::shell::{format_publish_message, manual_path_instruction};
use crate::toolchain::{
    ActivationEngine, ActivationReport, ActivationStrategy, Activator, CopyActivator,
    LinkActivator, PlatformDescriptor, SystemPublisher, VersionStore,
};

/// Builds the activation engine for the configured strategy.
pub(crate) fn activation_engine(
    config: &Config,
    platform: PlatformDescriptor,
) -> ActivationEngine<Box<dyn Activator>> {
    let activator: Box<dyn Activator> = match config.activation {
        ActivationStrategy::Link => Box::new(LinkActivator),
        ActivationStrategy::Copy => Box::new(CopyActivator::new(
            SystemPublisher::from_env(),
            platform.executable_name(),
        )),
    };
    ActivationEngine::new(config.store(), activator)
}

/// Prints what an activation did and whether the shell will see it.
pub(crate) fn report_activation(
    report: &ActivationReport,
    store: &VersionStore,
    platform: PlatformDescriptor,
) {
    if let Some(version) = report.state.version() {
        println!("Now using Node.js {version}.");
    }

    let bin_dir = std::path::absolute(store.current_bin_dir())
        .unwrap_or_else(|_| store.current_bin_dir());

    if let Some(published) = &report.published {
        println!("{}", format_publish_message(published, &bin_dir));
    }

    match path_status(&bin_dir, platform.executable_name()) {
        PathStatus::Shadowed(conflict) => {
            eprintln!();
            eprintln!("{}", format_conflict_warning(&conflict));
        }
        PathStatus::NotOnPath if report.published.is_none() => {
            println!();
            println!("To use nvx, add to your PATH:");
            println!("  {}", manual_path_instruction(&bin_dir));
        }
        _ => {}
    }
}
