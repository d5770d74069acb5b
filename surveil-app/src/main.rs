//! MAIN process entry point: parses arguments, loads settings, brings up
//! the locally-ownable pieces (auth store, status LED, accessory light,
//! scratch directory, shutdown signal), spawns the CAMERA and CHAT
//! processes and activates their plugins through `surveil_plugins`, then
//! waits for a shutdown request.
//!
//! The camera driver and the chat transport are supplied by whoever embeds
//! this appliance against a real camera and a real bot API; this binary
//! wires up the process topology and every plugin that doesn't need one,
//! and leaves those two boundaries for the embedder.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

mod cli;
mod logging;
mod plugins;
mod process;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use surveil_auth::AuthStore;
use surveil_plugins::{
    Housekeeper, PluginHost, ProcessTag, ProcessesHost, RegisterFactory, SingletonHost, HOUSEKEEPER_NAME,
    REGISTER_FACTORY_NAME,
};
use surveil_status::{PwmLed, StatusLed};
use surveil_transport::ObjectRegistry;

use plugins::{auth_store_definition, media_bus_definition, AUTH_STORE_PLUGIN, MEDIA_BUS_PLUGIN};
use process::{AUTH_FILE_ENV, PROCESS_ROLE_ENV, SCRATCH_DIR_ENV};

fn resolve_token(cli_token: Option<String>, settings_token: Option<String>) -> Option<String> {
    cli_token.or(settings_token)
}

fn run() -> anyhow::Result<ExitCode> {
    let args = cli::parse();
    logging::init(args.flag_verbose, args.flag_logfile.as_deref())?;

    let settings_path = PathBuf::from("settings.yaml");
    let settings = settings::Settings::load(&settings_path)?;

    let token = match resolve_token(args.flag_token.clone(), settings.telegram.token.clone()) {
        Some(token) if !token.trim().is_empty() => token,
        _ => {
            log::error!("no chat bot token given on the command line or in {}", settings_path.display());
            return Ok(ExitCode::from(1));
        }
    };
    log::debug!("using chat bot token of length {}", token.len());

    let auth_file = settings
        .telegram
        .auth_file
        .clone()
        .unwrap_or_else(|| "auth.json".to_string());
    let auth_store = AuthStore::open(&auth_file)?;
    log::info!(
        "loaded auth store from {auth_file} ({} authorised chat(s))",
        auth_store.authorised_chat_ids().len()
    );

    let status_led = if args.flag_no_status_led {
        log::info!("status LED disabled by command line flag");
        StatusLed::new(None)?
    } else {
        let pins = settings
            .status_led
            .bcm_pin_r
            .zip(settings.status_led.bcm_pin_g)
            .zip(settings.status_led.bcm_pin_b)
            .map(|((r, g), b)| (r, g, b));
        StatusLed::new(pins)?
    };

    let light = if args.flag_no_light {
        log::info!("accessory light disabled by command line flag");
        PwmLed::new(None, settings.pwmled.frequency)?
    } else {
        PwmLed::new(settings.pwmled.bcm_pin, settings.pwmled.frequency)?
    };
    let _ = &light;

    let scratch_dir = tempfile::Builder::new()
        .prefix("surveil-")
        .tempdir_in(&settings.temp_folder)
        .or_else(|_| tempfile::Builder::new().prefix("surveil-").tempdir())?;
    log::info!("scratch directory: {}", scratch_dir.path().display());

    // MAIN hosts no plugins of its own, only the housekeeping/register-factory
    // pair every process carries so `ProcessesHost` can drive it uniformly.
    let local_registry = ObjectRegistry::new();
    let local_host = Arc::new(PluginHost::new(ProcessTag::Main, local_registry.clone()));
    local_registry.register(HOUSEKEEPER_NAME, Arc::new(Housekeeper::new(local_host.clone())));
    local_registry.register(REGISTER_FACTORY_NAME, Arc::new(RegisterFactory::new(vec![], local_host.clone())));
    let mut processes = ProcessesHost::new(ProcessTag::Main, local_host);

    let current_exe = std::env::current_exe()?;
    let mut plugin_names = Vec::new();

    if args.flag_no_camera {
        log::info!("running without a camera process");
    } else {
        let camera_host = SingletonHost::spawn(
            &current_exe,
            &[],
            scratch_dir.path(),
            &[
                (PROCESS_ROLE_ENV.to_string(), ProcessTag::Camera.as_str().to_string()),
                (SCRATCH_DIR_ENV.to_string(), scratch_dir.path().display().to_string()),
            ],
        )?;
        camera_host.instantiate(MEDIA_BUS_PLUGIN)?;
        processes.attach_remote(ProcessTag::Camera, camera_host);
        plugin_names.push(MEDIA_BUS_PLUGIN.to_string());
        log::info!("camera process is up");
    }

    let chat_host = SingletonHost::spawn(
        &current_exe,
        &[],
        scratch_dir.path(),
        &[
            (PROCESS_ROLE_ENV.to_string(), ProcessTag::Chat.as_str().to_string()),
            (SCRATCH_DIR_ENV.to_string(), scratch_dir.path().display().to_string()),
            (AUTH_FILE_ENV.to_string(), auth_file.clone()),
        ],
    )?;
    chat_host.instantiate(AUTH_STORE_PLUGIN)?;
    processes.attach_remote(ProcessTag::Chat, chat_host);
    plugin_names.push(AUTH_STORE_PLUGIN.to_string());
    log::info!("chat process is up");

    processes.activate(&plugin_names)?;

    let _ = status_led.set((0.0, 1.0, 0.0), 0.5, true);

    let shutdown = surveil_status::ShutdownSignal::install()?;
    log::info!("surveil-app is up, waiting for shutdown signal");
    shutdown.wait();
    log::info!("shutdown requested, exiting cleanly");

    processes.deactivate()?;

    Ok(ExitCode::from(0))
}

/// CAMERA/CHAT entry point, reached when `main` finds `SURVEIL_PROCESS_ROLE`
/// set in its own environment (set by `run` when it spawned this process).
fn run_child(tag: ProcessTag) -> ExitCode {
    if let Err(e) = logging::init(false, None) {
        eprintln!("surveil-app: failed to initialise logging in {} process: {e}", tag.as_str());
    }
    let defs = match tag {
        ProcessTag::Camera => vec![media_bus_definition()],
        ProcessTag::Chat => {
            let auth_file = std::env::var(AUTH_FILE_ENV).unwrap_or_else(|_| "auth.json".to_string());
            vec![auth_store_definition(auth_file)]
        }
        ProcessTag::Main => {
            eprintln!("surveil-app: MAIN cannot be requested via {PROCESS_ROLE_ENV}");
            return ExitCode::from(2);
        }
    };
    process::run_child(tag, defs)
}

fn main() -> ExitCode {
    if let Some(tag) = process::requested_role() {
        return run_child(tag);
    }
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("surveil-app: fatal start-up error: {err:#}");
            ExitCode::from(2)
        }
    }
}
