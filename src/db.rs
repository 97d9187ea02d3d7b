use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use uuid::Uuid;

use crate::models::{NewWorkout, Subscription, SubscriptionState, WorkoutRecord};

pub struct Database {
    conn: Connection,
}

fn row_to_workout(row: &Row<'_>) -> Result<WorkoutRecord> {
    Ok(WorkoutRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        workout_performed: row.get(2)?,
        activity: row.get(3)?,
        sets: row.get(4)?,
        reps: row.get(5)?,
        muscle_target: row.get(6)?,
        workout_time: row.get(7)?,
        workout_time_seconds: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_subscription(row: &Row<'_>) -> Result<Subscription> {
    let status: String = row.get(3)?;
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider_subscription_id: row.get(2)?,
        status: SubscriptionState::parse(&status),
        plan: row.get(4)?,
        trial_ends_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const WORKOUT_COLUMNS: &str = "id, user_id, workout_performed, activity, sets, reps, \
     muscle_target, workout_time, workout_time_seconds, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, provider_subscription_id, status, plan, \
     trial_ends_at, created_at, updated_at";

impl Database {
    pub fn new(database_url: &str) -> Result<Self> {
        let conn = Connection::open(database_url.replace("sqlite://", ""))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS workout_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workout_performed TEXT NOT NULL,
                activity TEXT,
                sets INTEGER,
                reps INTEGER,
                muscle_target TEXT,
                workout_time TEXT,
                workout_time_seconds INTEGER,
                created_at TEXT NOT NULL
            )",
            (),
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_workout_logs_user
             ON workout_logs (user_id, created_at)",
            (),
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                provider_subscription_id TEXT,
                status TEXT NOT NULL,
                plan TEXT,
                trial_ends_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            (),
        )?;

        Ok(Database { conn })
    }

    pub fn insert_workout(&self, workout: &NewWorkout) -> Result<WorkoutRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO workout_logs
             (id, user_id, workout_performed, activity, sets, reps,
              muscle_target, workout_time, workout_time_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                workout.user_id,
                workout.workout_performed,
                workout.activity,
                workout.sets,
                workout.reps,
                workout.muscle_target,
                workout.workout_time,
                workout.workout_time_seconds,
                created_at,
            ],
        )?;

        Ok(WorkoutRecord {
            id,
            user_id: workout.user_id.clone(),
            workout_performed: workout.workout_performed.clone(),
            activity: workout.activity.clone(),
            sets: workout.sets,
            reps: workout.reps,
            muscle_target: workout.muscle_target.clone(),
            workout_time: workout.workout_time.clone(),
            workout_time_seconds: workout.workout_time_seconds,
            created_at,
        })
    }

    /// Newest-first page of a user's workouts.
    pub fn list_workouts(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WorkoutRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_COLUMNS} FROM workout_logs
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![user_id, limit, offset], row_to_workout)?;
        rows.collect()
    }

    pub fn get_workout(&self, id: &str) -> Result<Option<WorkoutRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {WORKOUT_COLUMNS} FROM workout_logs WHERE id = ?1"),
                params![id],
                row_to_workout,
            )
            .optional()
    }

    /// Full record set for the analytics engine, newest first.
    pub fn all_workouts(&self, user_id: &str) -> Result<Vec<WorkoutRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_COLUMNS} FROM workout_logs
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_workout)?;
        rows.collect()
    }

    pub fn find_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        self.conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1"),
                params![user_id],
                row_to_subscription,
            )
            .optional()
    }

    /// Activates or refreshes a user's subscription from a webhook event.
    /// Keyed on user id, so repeated events update in place.
    pub fn upsert_subscription(
        &self,
        user_id: &str,
        provider_subscription_id: &str,
        status: SubscriptionState,
        trial_ends_at: Option<&str>,
    ) -> Result<Subscription> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO subscriptions
             (id, user_id, provider_subscription_id, status, plan,
              trial_ends_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pro', ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
             provider_subscription_id = excluded.provider_subscription_id,
             status = excluded.status,
             plan = excluded.plan,
             trial_ends_at = excluded.trial_ends_at,
             updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                provider_subscription_id,
                status.as_str(),
                trial_ends_at,
                now,
            ],
        )?;

        self.conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1"),
            params![user_id],
            row_to_subscription,
        )
    }

    /// Marks the matching subscription cancelled. Returns whether a row
    /// was touched; unknown provider ids are not an error.
    pub fn cancel_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE subscriptions
             SET status = 'cancelled', updated_at = ?2
             WHERE provider_subscription_id = ?1",
            params![provider_subscription_id, now],
        )?;
        Ok(changed > 0)
    }
}
