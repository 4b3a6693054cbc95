//! Value objects for the bakery domain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of an order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    #[default]
    New,
    Confirmed,
    Ready,
    Delivered,
    Problem,
    Cancelled,
}

/// Complement of {Delivered, Ready, Cancelled}: orders in these states cannot go out today.
pub const NOT_AVAILABLE_STATES: &[OrderState] = &[OrderState::New, OrderState::Confirmed, OrderState::Problem];

impl OrderState {
    pub const ALL: [OrderState; 6] = [
        OrderState::New,
        OrderState::Confirmed,
        OrderState::Ready,
        OrderState::Delivered,
        OrderState::Problem,
        OrderState::Cancelled,
    ];

    /// Wire and storage form, e.g. `"DELIVERED"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Confirmed => "CONFIRMED",
            Self::Ready => "READY",
            Self::Delivered => "DELIVERED",
            Self::Problem => "PROBLEM",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Human-readable label: `Cancelled`, `New`, ...
    pub fn display_name(self) -> String {
        let lower = self.as_str().to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn is_available_today(self) -> bool {
        !NOT_AVAILABLE_STATES.contains(&self)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.display_name()) }
}

#[derive(Debug, Clone, Error)]
#[error("unknown order state: {0}")]
pub struct ParseOrderStateError(String);

impl FromStr for OrderState {
    type Err = ParseOrderStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseOrderStateError(s.to_string()))
    }
}

/// Staff role of a user account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Barista,
    Baker,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Barista, Role::Baker, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self { Self::Barista => "barista", Self::Baker => "baker", Self::Admin => "admin" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|r| r.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_display_name() {
        assert_eq!(OrderState::New.display_name(), "New");
        assert_eq!(OrderState::Cancelled.display_name(), "Cancelled");
        assert_eq!(OrderState::Problem.to_string(), "Problem");
    }

    #[test]
    fn test_not_available_is_complement() {
        let available: HashSet<_> = [OrderState::Delivered, OrderState::Ready, OrderState::Cancelled].into();
        let complement: HashSet<_> = OrderState::ALL.into_iter().filter(|s| !available.contains(s)).collect();
        let constant: HashSet<_> = NOT_AVAILABLE_STATES.iter().copied().collect();
        assert_eq!(constant, complement);
        assert_eq!(constant.len(), 3);
        assert!(constant.contains(&OrderState::New) && constant.contains(&OrderState::Confirmed) && constant.contains(&OrderState::Problem));
    }

    #[test]
    fn test_parse_round_trip() {
        for state in OrderState::ALL {
            assert_eq!(state.as_str().parse::<OrderState>().unwrap(), state);
        }
        assert!("SHIPPED".parse::<OrderState>().is_err());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_serde_wire_form() {
        assert_eq!(serde_json::to_string(&OrderState::Delivered).unwrap(), "\"DELIVERED\"");
        assert_eq!(serde_json::from_str::<Role>("\"baker\"").unwrap(), Role::Baker);
    }
}
