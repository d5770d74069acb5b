//! Command-line surface, `camera_hub/src/main.rs`'s `docopt` idiom applied
//! to this system's own flags.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use docopt::Docopt;
use serde::Deserialize;

const USAGE: &str = "
Surveil: a remotely-controlled camera appliance with motion detection and a
chat-bot control interface.

Usage:
  surveil-app [options]
  surveil-app (--version | -V)
  surveil-app (--help | -h)

Options:
  -t <token>, --token <token>    Chat bot API token. Overrides the settings file.
  -nc, --no-camera               Run without the camera process.
  --no-light                     Disable the pwmled accessory light.
  --no-status-led                Disable the RGB status LED.
  -v, --verbose                  Enable debug-level logging.
  --logfile <path>                Write logs to this file instead of stderr.
  --version, -V                  Show version.
  --help, -h                     Show help.
";

#[derive(Debug, Clone, Deserialize)]
pub struct Args {
    pub flag_token: Option<String>,
    pub flag_no_camera: bool,
    pub flag_no_light: bool,
    pub flag_no_status_led: bool,
    pub flag_verbose: bool,
    pub flag_logfile: Option<String>,
}

pub fn parse() -> Args {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docopt_for(argv: &[&str]) -> Args {
        Docopt::new(USAGE)
            .unwrap()
            .argv(argv.iter())
            .deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_are_all_disabled() {
        let args = docopt_for(&["surveil-app"]);
        assert_eq!(args.flag_token, None);
        assert!(!args.flag_no_camera);
        assert!(!args.flag_no_light);
        assert!(!args.flag_no_status_led);
        assert!(!args.flag_verbose);
        assert_eq!(args.flag_logfile, None);
    }

    #[test]
    fn parses_token_and_flags() {
        let args = docopt_for(&[
            "surveil-app",
            "--token",
            "abc123",
            "--no-camera",
            "--no-light",
            "--no-status-led",
            "-v",
            "--logfile",
            "/var/log/surveil.log",
        ]);
        assert_eq!(args.flag_token.as_deref(), Some("abc123"));
        assert!(args.flag_no_camera);
        assert!(args.flag_no_light);
        assert!(args.flag_no_status_led);
        assert!(args.flag_verbose);
        assert_eq!(args.flag_logfile.as_deref(), Some("/var/log/surveil.log"));
    }

    #[test]
    fn short_flags_match_long_ones() {
        let args = docopt_for(&["surveil-app", "-t", "xyz", "-nc"]);
        assert_eq!(args.flag_token.as_deref(), Some("xyz"));
        assert!(args.flag_no_camera);
    }
}
