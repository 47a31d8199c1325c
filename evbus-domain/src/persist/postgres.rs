//! Postgres 版事件日志与死信存储（需开启 `infra-sqlx` 特性）
//!
//! 表结构见 `migrations/0001_event_bus.sql`：
//! - `event_log`：事件 id 主键，按类型/时间、主体/时间、关联 id 建索引，`expires_at` 驱动保留期；
//! - `dead_letters`：事件 id 主键，按 (resolved, attempt_count, last_attempt) 建索引。
//!
//! 所有写入均为单条语句，依赖数据库自身的行级原子性，不在应用层加锁。

use crate::domain_event::{DomainEvent, EventPriority, Metadata};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{
    DeadLetterRecord, DeadLetterStats, DeadLetterStore, ErrorSnapshot, EventFilter,
    EventLogRecord, EventLogStore, UnresolvedQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

const MIGRATION: &str = include_str!("../../migrations/0001_event_bus.sql");

const EVENT_LOG_COLUMNS: &str = "event_id, event_type, priority, occurred_at, actor_id, payload, \
     correlation_id, causation_id, schema_version, processed, processed_at, created_at, expires_at";

const DEAD_LETTER_COLUMNS: &str = "event_id, event_type, event, error_message, error_name, \
     error_stack, attempt_count, last_attempt, resolved, resolved_at, created_at";

/// 执行建表脚本（幂等）
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(MIGRATION).execute(pool).await?;
    Ok(())
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn parse_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| DomainError::Parse {
        reason: format!("negative value in column {column}: {value}"),
    })
}

fn event_log_from_row(row: &PgRow) -> Result<EventLogRecord> {
    let raw_priority: i16 = row.try_get("priority")?;
    let priority = EventPriority::from_i16(raw_priority).ok_or_else(|| DomainError::Parse {
        reason: format!("unknown priority: {raw_priority}"),
    })?;

    let metadata = Metadata::builder()
        .maybe_correlation_id(row.try_get("correlation_id")?)
        .maybe_causation_id(row.try_get("causation_id")?)
        .schema_version(parse_u32(row.try_get("schema_version")?, "schema_version")?)
        .build();

    let event = DomainEvent::builder()
        .id(row.try_get::<String, _>("event_id")?)
        .event_type(row.try_get::<String, _>("event_type")?)
        .priority(priority)
        .occurred_at(row.try_get("occurred_at")?)
        .maybe_actor_id(row.try_get("actor_id")?)
        .payload(row.try_get("payload")?)
        .metadata(metadata)
        .build();

    Ok(EventLogRecord::restore(
        event,
        row.try_get("processed")?,
        row.try_get("processed_at")?,
        row.try_get("created_at")?,
        row.try_get("expires_at")?,
    ))
}

fn dead_letter_from_row(row: &PgRow) -> Result<DeadLetterRecord> {
    let event: DomainEvent = serde_json::from_value(row.try_get("event")?)?;
    let error = ErrorSnapshot::builder()
        .message(row.try_get::<String, _>("error_message")?)
        .maybe_name(row.try_get::<Option<String>, _>("error_name")?)
        .maybe_stack(row.try_get::<Option<String>, _>("error_stack")?)
        .build();

    Ok(DeadLetterRecord::restore(
        event,
        error,
        parse_u32(row.try_get("attempt_count")?, "attempt_count")?,
        row.try_get("last_attempt")?,
        row.try_get("resolved")?,
        row.try_get("resolved_at")?,
        row.try_get("created_at")?,
    ))
}

#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogStore for PgEventLog {
    async fn append(&self, record: EventLogRecord) -> Result<()> {
        let ev = record.event();
        let result = sqlx::query(
            "INSERT INTO event_log (event_id, event_type, priority, occurred_at, actor_id, payload, \
             correlation_id, causation_id, schema_version, processed, processed_at, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(ev.id())
        .bind(ev.event_type())
        .bind(ev.priority().as_i16())
        .bind(ev.occurred_at())
        .bind(ev.actor_id())
        .bind(ev.payload())
        .bind(ev.metadata().correlation_id())
        .bind(ev.metadata().causation_id())
        .bind(i32::try_from(ev.metadata().schema_version()).unwrap_or(i32::MAX))
        .bind(record.processed())
        .bind(record.processed_at())
        .bind(record.created_at())
        .bind(record.expires_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::DuplicateEvent {
                event_id: ev.id().to_string(),
            });
        }
        Ok(())
    }

    async fn mark_processed(&self, event_id: &str, processed_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE event_log SET processed = TRUE, processed_at = COALESCE(processed_at, $2) \
             WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>> {
        let sql = format!(
            "SELECT {EVENT_LOG_COLUMNS} FROM event_log WHERE event_id = $1 AND expires_at > now()"
        );
        let row = sqlx::query(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_log_from_row).transpose()
    }

    async fn history(&self, filter: &EventFilter) -> Result<Vec<EventLogRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {EVENT_LOG_COLUMNS} FROM event_log WHERE expires_at > now()"
        ));
        if let Some(t) = filter.event_type() {
            qb.push(" AND event_type = ").push_bind(t.to_string());
        }
        if let Some(actor) = filter.actor_id() {
            qb.push(" AND actor_id = ").push_bind(actor.to_string());
        }
        if let Some(cid) = filter.correlation_id() {
            qb.push(" AND correlation_id = ").push_bind(cid.to_string());
        }
        if let Some(start) = filter.start() {
            qb.push(" AND occurred_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end() {
            qb.push(" AND occurred_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY occurred_at DESC LIMIT ")
            .push_bind(to_i64(filter.limit()));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(event_log_from_row).collect()
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: &[String],
    ) -> Result<Vec<EventLogRecord>> {
        let sql = format!(
            "SELECT {EVENT_LOG_COLUMNS} FROM event_log \
             WHERE expires_at > now() AND occurred_at >= $1 AND occurred_at <= $2 \
             AND (cardinality($3::text[]) = 0 OR event_type = ANY($3)) \
             ORDER BY occurred_at ASC, created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(start)
            .bind(end)
            .bind(event_types.to_vec())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(event_log_from_row).collect()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM event_log WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

#[derive(Debug, Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn record_failure(
        &self,
        event: &DomainEvent,
        error: &ErrorSnapshot,
        at: DateTime<Utc>,
    ) -> Result<DeadLetterRecord> {
        let sql = format!(
            "INSERT INTO dead_letters (event_id, event_type, event, error_message, error_name, \
             error_stack, attempt_count, last_attempt, resolved, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 1, $7, FALSE, $7) \
             ON CONFLICT (event_id) DO UPDATE SET \
               attempt_count = dead_letters.attempt_count + 1, \
               error_message = EXCLUDED.error_message, \
               error_name = EXCLUDED.error_name, \
               error_stack = EXCLUDED.error_stack, \
               last_attempt = EXCLUDED.last_attempt \
             RETURNING {DEAD_LETTER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(event.id())
            .bind(event.event_type())
            .bind(serde_json::to_value(event)?)
            .bind(error.message())
            .bind(error.name())
            .bind(error.stack())
            .bind(at)
            .fetch_one(&self.pool)
            .await?;
        dead_letter_from_row(&row)
    }

    async fn find(&self, event_id: &str) -> Result<Option<DeadLetterRecord>> {
        let sql = format!("SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE event_id = $1");
        let row = sqlx::query(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(dead_letter_from_row).transpose()
    }

    async fn due_for_retry(
        &self,
        max_attempts: u32,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DeadLetterRecord>> {
        let sql = format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters \
             WHERE resolved = FALSE AND attempt_count < $1 AND last_attempt < $2 \
             ORDER BY last_attempt ASC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(max_attempts))
            .bind(cutoff)
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(dead_letter_from_row).collect()
    }

    async fn mark_resolved(&self, event_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE dead_letters SET resolved = TRUE, resolved_at = $2 \
             WHERE event_id = $1 AND resolved = FALSE",
        )
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unresolved(&self, query: &UnresolvedQuery) -> Result<Vec<DeadLetterRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {DEAD_LETTER_COLUMNS} FROM dead_letters WHERE resolved = FALSE"
        ));
        if let Some(t) = query.event_type() {
            qb.push(" AND event_type = ").push_bind(t.to_string());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(to_i64(query.limit()))
            .push(" OFFSET ")
            .push_bind(to_i64(query.offset()));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(dead_letter_from_row).collect()
    }

    async fn stats(&self, max_attempts: u32) -> Result<DeadLetterStats> {
        let totals = sqlx::query(
            "SELECT count(*) AS total, \
                    count(*) FILTER (WHERE NOT resolved) AS unresolved, \
                    count(*) FILTER (WHERE NOT resolved AND attempt_count >= $1) AS exhausted \
             FROM dead_letters",
        )
        .bind(i64::from(max_attempts))
        .fetch_one(&self.pool)
        .await?;

        let by_type_rows = sqlx::query(
            "SELECT event_type, count(*) AS n FROM dead_letters \
             WHERE NOT resolved GROUP BY event_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = DeadLetterStats {
            total: to_usize(totals.try_get("total")?),
            unresolved: to_usize(totals.try_get("unresolved")?),
            max_retries_reached: to_usize(totals.try_get("exhausted")?),
            ..Default::default()
        };
        for row in &by_type_rows {
            stats
                .by_type
                .insert(row.try_get("event_type")?, to_usize(row.try_get("n")?));
        }
        Ok(stats)
    }

    async fn purge_resolved(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result =
            sqlx::query("DELETE FROM dead_letters WHERE resolved = TRUE AND resolved_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}
