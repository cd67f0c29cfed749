/// Dial session queue
///
/// Sessions are created `pending` by the API. Each tick the dialer claims a
/// batch of them, moving them to `running`, and then loads every session it
/// still has to reconcile.
///
/// # Claiming
///
/// The claim is a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP LOCKED)`
/// statement, so two dialer processes polling at the same moment never claim
/// the same session. Sessions are claimed oldest first.
///
/// # Example
///
/// ```no_run
/// use dialdesk_dialer::queue::SessionQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = SessionQueue::new(pool, 50);
///
/// for session in queue.claim_sessions().await? {
///     println!("Started session {}", session.id);
/// }
/// # Ok(())
/// # }
/// ```

use dialdesk_shared::models::dial_session::{DialSession, DialSessionState};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct SessionQueue {
    db: PgPool,

    /// Sessions claimed per tick, and the page size for loading active ones
    batch_size: i64,

    /// Only sessions of this tenant are claimed and reconciled
    tenant_id: Option<Uuid>,
}

impl SessionQueue {
    pub fn new(db: PgPool, batch_size: i64) -> Self {
        SessionQueue {
            db,
            batch_size,
            tenant_id: None,
        }
    }

    /// Restricts the queue to one tenant
    pub fn scoped_to(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Claims pending sessions and marks them running
    ///
    /// Sets `started_at` on every claimed session.
    pub async fn claim_sessions(&self) -> Result<Vec<DialSession>, QueueError> {
        let sessions = sqlx::query_as::<_, DialSession>(
            r#"
            WITH pending_sessions AS (
                SELECT id
                FROM dial_sessions
                WHERE state = $1
                  AND ($4::uuid IS NULL OR tenant_id = $4)
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE dial_sessions
            SET
                state = $3,
                started_at = NOW(),
                updated_at = NOW()
            FROM pending_sessions
            WHERE dial_sessions.id = pending_sessions.id
            RETURNING
                dial_sessions.id,
                dial_sessions.tenant_id,
                dial_sessions.user_id,
                dial_sessions.state,
                dial_sessions.lines,
                dial_sessions.lead_ids,
                dial_sessions.next_index,
                dial_sessions.connected_call_id,
                dial_sessions.calls_placed,
                dial_sessions.started_at,
                dial_sessions.ended_at,
                dial_sessions.created_at,
                dial_sessions.updated_at
            "#,
        )
        .bind(DialSessionState::Pending)
        .bind(self.batch_size)
        .bind(DialSessionState::Running)
        .bind(self.tenant_id)
        .fetch_all(&self.db)
        .await?;

        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Claimed dial sessions");
        }

        Ok(sessions)
    }

    /// Every session that needs reconciling, loaded `batch_size` at a time
    ///
    /// Paused sessions without live calls are left out.
    pub async fn active_sessions(&self) -> Result<Vec<DialSession>, QueueError> {
        let mut sessions = Vec::new();
        let mut after = None;

        loop {
            let page =
                DialSession::list_active(&self.db, self.tenant_id, after, self.batch_size).await?;
            let full = page.len() as i64 >= self.batch_size;
            after = page.last().map(|session| session.id);
            sessions.extend(page);

            if !full || after.is_none() {
                break;
            }
        }

        Ok(sessions)
    }
}
