//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// The three OS processes this system is split across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessTag {
    Main,
    Camera,
    Chat,
}

impl ProcessTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessTag::Main => "main",
            ProcessTag::Camera => "camera",
            ProcessTag::Chat => "chat",
        }
    }

    pub fn all() -> [ProcessTag; 3] {
        [ProcessTag::Main, ProcessTag::Camera, ProcessTag::Chat]
    }
}

impl std::str::FromStr for ProcessTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(ProcessTag::Main),
            "camera" => Ok(ProcessTag::Camera),
            "chat" => Ok(ProcessTag::Chat),
            other => Err(format!("unknown process tag: {other}")),
        }
    }
}
