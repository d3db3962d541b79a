use serde::{Deserialize, Serialize};

/// Lifecycle status shared by campaigns, strategies, and line items.
///
/// Variants are declared in lifecycle order, so `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Draft,
    Pending,
    Approved,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl LifecycleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Draft => "draft",
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Approved => "approved",
            LifecycleStatus::Active => "active",
            LifecycleStatus::Paused => "paused",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Cancelled => "cancelled",
        }
    }

    /// Coarse three-level status used for display.
    #[must_use]
    pub fn display(self) -> DisplayStatus {
        match self {
            LifecycleStatus::Draft | LifecycleStatus::Pending | LifecycleStatus::Approved => {
                DisplayStatus::Planning
            }
            LifecycleStatus::Active | LifecycleStatus::Paused => DisplayStatus::InFlight,
            LifecycleStatus::Completed | LifecycleStatus::Cancelled => DisplayStatus::Closed,
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Planning,
    InFlight,
    Closed,
}

/// Status computed for a media buy from its flight dates and spend ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaBuyStatus {
    Scheduled,
    Live,
    Completed,
    Overspent,
}
