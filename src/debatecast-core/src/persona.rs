//! The two fixed debate personas.
//!
//! Carnegie argues the liberal side and Mellon the conservative side. The
//! same tag is used in script text, audio file names and API responses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Persona {
    /// Liberal side.
    Carnegie,
    /// Conservative side.
    Mellon,
}

impl Persona {
    pub const ALL: [Persona; 2] = [Persona::Carnegie, Persona::Mellon];

    /// Upper-case tag used in scripts and file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Persona::Carnegie => "CARNEGIE",
            Persona::Mellon => "MELLON",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::Carnegie => "Carnegie",
            Persona::Mellon => "Mellon",
        }
    }

    /// The side label this persona speaks for, as used in `DebateAnalysis`.
    pub fn side_label(&self) -> &'static str {
        match self {
            Persona::Carnegie => "liberal",
            Persona::Mellon => "conservative",
        }
    }

    /// Case-insensitive lookup by persona name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.tag().eq_ignore_ascii_case(tag.trim()))
    }

    pub fn display_name_with_side(&self) -> String {
        format!("{} ({})", self.display_name(), self.side_label())
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
