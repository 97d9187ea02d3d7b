use serde::{Deserialize, Serialize};

/// One logged exercise set-group, as persisted in `workout_logs`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkoutRecord {
    pub id: String,
    pub user_id: String,
    pub workout_performed: String,
    pub activity: Option<String>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub muscle_target: Option<String>,
    pub workout_time: Option<String>,
    pub workout_time_seconds: Option<i64>,
    pub created_at: String,
}

/// Payload the voice agent posts when a session wraps up.
#[derive(Debug, Deserialize)]
pub struct VoiceAgentSummary {
    pub user_id: Option<String>,
    // Older agent builds sent the room id instead of the user id.
    pub room_id: Option<String>,
    pub workout_performed: Option<String>,
    pub activity: Option<String>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub muscle_target: Option<String>,
    pub workout_time: Option<String>,
}

/// Insert shape for a new workout row; duration seconds are derived
/// from `workout_time` before this is handed to the store.
#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub user_id: String,
    pub workout_performed: String,
    pub activity: Option<String>,
    pub sets: Option<i64>,
    pub reps: Option<i64>,
    pub muscle_target: Option<String>,
    pub workout_time: Option<String>,
    pub workout_time_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Pending,
    Trial,
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Trial => "trial",
            SubscriptionState::Active => "active",
            SubscriptionState::Cancelled => "cancelled",
            SubscriptionState::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "trial" => SubscriptionState::Trial,
            "active" => SubscriptionState::Active,
            "cancelled" => SubscriptionState::Cancelled,
            "expired" => SubscriptionState::Expired,
            _ => SubscriptionState::Pending,
        }
    }

    /// Trial and active subscribers can use the paid features.
    pub fn has_access(self) -> bool {
        matches!(self, SubscriptionState::Trial | SubscriptionState::Active)
    }
}

/// One row of the `subscriptions` table.
#[derive(Debug, Serialize, Clone)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub provider_subscription_id: Option<String>,
    pub status: SubscriptionState,
    pub plan: Option<String>,
    pub trial_ends_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Wire shape for `GET /api/subscription/status`.
#[derive(Debug, Serialize)]
pub struct SubscriptionStatus {
    pub status: SubscriptionState,
    pub has_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<String>,
}

/// Verified identity attached to requests by the auth middleware.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::SubscriptionState;

    #[test]
    fn subscription_state_round_trips() {
        for state in [
            SubscriptionState::Pending,
            SubscriptionState::Trial,
            SubscriptionState::Active,
            SubscriptionState::Cancelled,
            SubscriptionState::Expired,
        ] {
            assert_eq!(SubscriptionState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn unknown_state_defaults_to_pending() {
        assert_eq!(
            SubscriptionState::parse("weird"),
            SubscriptionState::Pending
        );
    }

    #[test]
    fn access_is_trial_or_active() {
        assert!(SubscriptionState::Trial.has_access());
        assert!(SubscriptionState::Active.has_access());
        assert!(!SubscriptionState::Pending.has_access());
        assert!(!SubscriptionState::Cancelled.has_access());
        assert!(!SubscriptionState::Expired.has_access());
    }
}
