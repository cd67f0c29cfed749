/// Parallel-dial session model and database operations
///
/// A session dials through an ordered list of leads on behalf of one agent,
/// keeping up to `lines` calls ringing at once and bridging the first human
/// answer to the agent.
///
/// # State Machine
///
/// ```text
/// pending → running ⇄ paused
/// running → completed
/// pending | running | paused → canceled
/// ```
///
/// `ended_at` is set when the dialer has no more work for the session. A
/// session canceled while lines are still ringing stays `canceled` with
/// `ended_at` unset until the dialer has hung those lines up.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE dial_session_state AS ENUM ('pending', 'running', 'paused', 'completed', 'canceled');
///
/// CREATE TABLE dial_sessions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     state dial_session_state NOT NULL DEFAULT 'pending',
///     lines INTEGER NOT NULL CHECK (lines BETWEEN 1 AND 10),
///     lead_ids UUID[] NOT NULL DEFAULT '{}',
///     next_index INTEGER NOT NULL DEFAULT 0,
///     connected_call_id UUID REFERENCES calls(id) ON DELETE SET NULL,
///     calls_placed INTEGER NOT NULL DEFAULT 0,
///     started_at TIMESTAMPTZ,
///     ended_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dial_session_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DialSessionState {
    /// Created, waiting for the dialer to claim it
    Pending,

    /// Dialer is placing calls
    Running,

    /// No new calls are placed; an already bridged call continues
    Paused,

    /// Every lead was dialed and every line has ended
    Completed,

    /// Stopped by the agent
    Canceled,
}

impl DialSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialSessionState::Pending => "pending",
            DialSessionState::Running => "running",
            DialSessionState::Paused => "paused",
            DialSessionState::Completed => "completed",
            DialSessionState::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DialSessionState::Completed | DialSessionState::Canceled)
    }

    pub fn can_transition_to(&self, target: DialSessionState) -> bool {
        use DialSessionState::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Pending, Canceled)
                | (Running, Canceled)
                | (Paused, Canceled)
        )
    }

    /// States a session may be in to move into `target`
    pub fn sources_of(target: DialSessionState) -> Vec<DialSessionState> {
        [
            DialSessionState::Pending,
            DialSessionState::Running,
            DialSessionState::Paused,
            DialSessionState::Completed,
            DialSessionState::Canceled,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(target))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DialSession {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Agent the answered call is bridged to
    pub user_id: Uuid,

    pub state: DialSessionState,

    /// Maximum number of simultaneous calls
    pub lines: i32,

    /// Leads to dial, in order
    pub lead_ids: Vec<Uuid>,

    /// Index into `lead_ids` of the next lead to dial
    pub next_index: i32,

    /// Call currently bridged to the agent
    pub connected_call_id: Option<Uuid>,

    pub calls_placed: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DialSession {
    /// Leads not yet dialed, in order
    pub fn remaining_leads(&self) -> &[Uuid] {
        let start = usize::try_from(self.next_index)
            .unwrap_or(0)
            .min(self.lead_ids.len());
        &self.lead_ids[start..]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDialSession {
    pub user_id: Uuid,
    pub lines: i32,
    pub lead_ids: Vec<Uuid>,
}

const SESSION_COLUMNS: &str = "id, tenant_id, user_id, state, lines, lead_ids, next_index, \
                               connected_call_id, calls_placed, started_at, ended_at, \
                               created_at, updated_at";

impl DialSession {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateDialSession,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            INSERT INTO dial_sessions (tenant_id, user_id, lines, lead_ids)
            VALUES ($1, $2, $3, $4)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.user_id)
        .bind(data.lines)
        .bind(data.lead_ids)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM dial_sessions WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists sessions of a tenant, newest first
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let items = sqlx::query_as::<_, DialSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM dial_sessions
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(tenant_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM dial_sessions WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    /// Moves a session to `target` if its current state allows it
    ///
    /// Returns `None` if the session does not exist in the tenant or its
    /// state does not allow the transition. A pending session that is
    /// canceled has nothing to clean up and is ended immediately.
    pub async fn transition(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        target: DialSessionState,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sources: Vec<&str> = DialSessionState::sources_of(target)
            .iter()
            .map(DialSessionState::as_str)
            .collect();

        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            UPDATE dial_sessions SET
                state = $3,
                ended_at = CASE
                    WHEN $3 = 'canceled' AND state = 'pending' THEN NOW()
                    WHEN $3 = 'completed' THEN NOW()
                    ELSE ended_at
                END,
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND state::text = ANY($4)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(target)
        .bind(sources)
        .fetch_optional(pool)
        .await
    }

    /// One page of the sessions the dialer still has to reconcile
    ///
    /// Running sessions, paused sessions that still have live calls, and
    /// canceled sessions that have not been finished. Pages are keyed by id:
    /// pass the last id of the previous page as `after`. `tenant_id`
    /// restricts the result to one tenant.
    pub async fn list_active(
        pool: &PgPool,
        tenant_id: Option<Uuid>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM dial_sessions
            WHERE (state = 'running'
                   OR (state = 'canceled' AND ended_at IS NULL)
                   OR (state = 'paused' AND EXISTS (
                        SELECT 1 FROM calls
                        WHERE calls.dial_session_id = dial_sessions.id
                          AND calls.status IN ('queued', 'ringing', 'in_progress'))))
              AND ($2::uuid IS NULL OR tenant_id = $2)
              AND ($3::uuid IS NULL OR id > $3)
            ORDER BY id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .bind(tenant_id)
        .bind(after)
        .fetch_all(pool)
        .await
    }

    /// Records placed calls and advances the lead cursor
    pub async fn advance(
        pool: &PgPool,
        id: Uuid,
        next_index: i32,
        placed: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            UPDATE dial_sessions SET
                next_index = GREATEST(next_index, $2),
                calls_placed = calls_placed + $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next_index)
        .bind(placed)
        .fetch_optional(pool)
        .await
    }

    /// Records the call that was bridged to the agent
    pub async fn set_connected_call(
        pool: &PgPool,
        id: Uuid,
        call_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            UPDATE dial_sessions SET connected_call_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(call_id)
        .fetch_optional(pool)
        .await
    }

    /// Marks a running session completed
    pub async fn complete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            UPDATE dial_sessions SET state = 'completed', ended_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND state = 'running'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Ends a canceled session once its lines are down
    pub async fn finish_canceled(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DialSession>(&format!(
            r#"
            UPDATE dial_sessions SET ended_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND state = 'canceled' AND ended_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use DialSessionState::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Paused.can_transition_to(Canceled));

        assert!(!Pending.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Canceled.can_transition_to(Running));
    }

    #[test]
    fn test_sources_of() {
        use DialSessionState::*;

        assert_eq!(DialSessionState::sources_of(Paused), vec![Running]);
        assert_eq!(DialSessionState::sources_of(Running), vec![Pending, Paused]);
        assert_eq!(
            DialSessionState::sources_of(Canceled),
            vec![Pending, Running, Paused]
        );
    }

    #[test]
    fn test_remaining_leads() {
        let leads: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut session = DialSession {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            state: DialSessionState::Running,
            lines: 2,
            lead_ids: leads.clone(),
            next_index: 1,
            connected_call_id: None,
            calls_placed: 1,
            started_at: None,
            ended_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(session.remaining_leads(), &leads[1..]);

        session.next_index = 7;
        assert!(session.remaining_leads().is_empty());
    }
}
