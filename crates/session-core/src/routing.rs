//! Dialed-number classification.
//!
//! The dial plan turns the user part of a request URI into a
//! [`Destination`]. Matching order is emergency numbers, voicemail,
//! auto-attendant, extensions of the configured length, then paging zones.

use std::fmt;

use serde::{Deserialize, Serialize};
use switchboard_infra_common::config::DialPlanSection;

/// Where a call is headed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Extension { number: String },
    AutoAttendant,
    Voicemail { mailbox: Option<String> },
    Paging { zone: String },
    Emergency { number: String },
}

/// Destination without its parameters; keys the collaborator table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Extension,
    AutoAttendant,
    Voicemail,
    Paging,
    Emergency,
}

impl Destination {
    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Extension { .. } => DestinationKind::Extension,
            Destination::AutoAttendant => DestinationKind::AutoAttendant,
            Destination::Voicemail { .. } => DestinationKind::Voicemail,
            Destination::Paging { .. } => DestinationKind::Paging,
            Destination::Emergency { .. } => DestinationKind::Emergency,
        }
    }

    /// Voicemail and auto-attendant calls get the early-disconnect work-around
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            Destination::Voicemail { .. } | Destination::AutoAttendant
        )
    }

    /// Mailbox to use when this destination falls through to voicemail
    pub fn voicemail_fallback(&self) -> Destination {
        match self {
            Destination::Extension { number } => Destination::Voicemail {
                mailbox: Some(number.clone()),
            },
            Destination::Voicemail { mailbox } => Destination::Voicemail {
                mailbox: mailbox.clone(),
            },
            _ => Destination::Voicemail { mailbox: None },
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DestinationKind::Extension => "extension",
            DestinationKind::AutoAttendant => "auto_attendant",
            DestinationKind::Voicemail => "voicemail",
            DestinationKind::Paging => "paging",
            DestinationKind::Emergency => "emergency",
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Extension { number } => write!(f, "extension {}", number),
            Destination::AutoAttendant => f.write_str("auto attendant"),
            Destination::Voicemail { mailbox: Some(m) } => write!(f, "voicemail {}", m),
            Destination::Voicemail { mailbox: None } => f.write_str("voicemail"),
            Destination::Paging { zone } => write!(f, "paging zone {}", zone),
            Destination::Emergency { number } => write!(f, "emergency {}", number),
        }
    }
}

/// Number-to-destination rules
#[derive(Debug, Clone)]
pub struct DialPlan {
    section: DialPlanSection,
}

impl DialPlan {
    pub fn new(section: DialPlanSection) -> Self {
        Self { section }
    }

    pub fn resolve(&self, dialed: &str) -> Option<Destination> {
        let dialed = dialed.trim();
        if dialed.is_empty() {
            return None;
        }
        let plan = &self.section;

        if plan.emergency_numbers.iter().any(|n| n == dialed) {
            return Some(Destination::Emergency {
                number: dialed.to_string(),
            });
        }
        if !plan.voicemail_number.is_empty() {
            if let Some(rest) = dialed.strip_prefix(plan.voicemail_number.as_str()) {
                let mailbox = (!rest.is_empty() && is_digits(rest)).then(|| rest.to_string());
                if rest.is_empty() || mailbox.is_some() {
                    return Some(Destination::Voicemail { mailbox });
                }
            }
        }
        if dialed == plan.auto_attendant_number {
            return Some(Destination::AutoAttendant);
        }
        if dialed.len() == plan.extension_length && is_digits(dialed) {
            return Some(Destination::Extension {
                number: dialed.to_string(),
            });
        }
        if !plan.paging_prefix.is_empty() {
            if let Some(zone) = dialed.strip_prefix(plan.paging_prefix.as_str()) {
                if !zone.is_empty() && is_digits(zone) {
                    return Some(Destination::Paging {
                        zone: zone.to_string(),
                    });
                }
            }
        }
        None
    }
}

impl Default for DialPlan {
    fn default() -> Self {
        Self::new(DialPlanSection::default())
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
