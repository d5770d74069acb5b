//! `/detect on at HH:MM` parsing, supplemented from `bot_manager.py`'s
//! `parse_time`/`_bot_detect`. Only the parser is implemented — no
//! background timer thread drives the schedule (left as an optional
//! extension, matching the source's own partially-unreachable fallthrough).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    pub fn parse(text: &str) -> Option<Self> {
        let pieces: Vec<&str> = text.split(':').collect();
        if pieces.len() != 2 && pieces.len() != 3 {
            return None;
        }
        let hour: u8 = pieces[0].parse().ok()?;
        let minute: u8 = pieces[1].parse().ok()?;
        let second: u8 = if pieces.len() == 3 { pieces[2].parse().ok()? } else { 0 };
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        Some(TimeOfDay { hour, minute, second })
    }
}

/// The parsed form of `/detect [on|off] [never|at HH:MM]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectCommand {
    /// No arguments: report current status.
    Query,
    /// Toggle immediately.
    Toggle { enable: bool },
    /// Clear a previously scheduled toggle time.
    ClearSchedule { enable: bool },
    /// Schedule a toggle at a time of day.
    Schedule { enable: bool, at: TimeOfDay },
}

fn is_yes(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "y" | "yes" | "1" | "on" | "t" | "true")
}

fn is_no(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "n" | "no" | "0" | "off" | "f" | "false")
}

impl DetectCommand {
    pub fn parse(args: &[&str]) -> Option<Self> {
        if args.is_empty() {
            return Some(DetectCommand::Query);
        }
        if args.len() > 3 {
            return None;
        }
        let switch = args[0].trim().to_ascii_lowercase();
        let enable = if is_yes(&switch) {
            true
        } else if is_no(&switch) {
            false
        } else {
            return None;
        };
        match args.len() {
            1 => Some(DetectCommand::Toggle { enable }),
            2 if args[1].trim().eq_ignore_ascii_case("never") => Some(DetectCommand::ClearSchedule { enable }),
            3 if args[1].trim().eq_ignore_ascii_case("at") => {
                TimeOfDay::parse(args[2].trim()).map(|at| DetectCommand::Schedule { enable, at })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_args_is_a_query() {
        assert_eq!(DetectCommand::parse(&[]), Some(DetectCommand::Query));
    }

    #[test]
    fn on_and_off_toggle_immediately() {
        assert_eq!(DetectCommand::parse(&["on"]), Some(DetectCommand::Toggle { enable: true }));
        assert_eq!(DetectCommand::parse(&["off"]), Some(DetectCommand::Toggle { enable: false }));
        assert_eq!(DetectCommand::parse(&["yes"]), Some(DetectCommand::Toggle { enable: true }));
    }

    #[test]
    fn scheduled_toggle_parses_hh_mm() {
        assert_eq!(
            DetectCommand::parse(&["on", "at", "21:30"]),
            Some(DetectCommand::Schedule {
                enable: true,
                at: TimeOfDay { hour: 21, minute: 30, second: 0 }
            })
        );
    }

    #[test]
    fn never_clears_a_schedule() {
        assert_eq!(DetectCommand::parse(&["off", "never"]), Some(DetectCommand::ClearSchedule { enable: false }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(DetectCommand::parse(&["maybe"]), None);
        assert_eq!(DetectCommand::parse(&["on", "at", "25:99"]), None);
        assert_eq!(DetectCommand::parse(&["on", "at"]), None);
    }
}
