use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{AdminId, CallEvent, ChatRatingEvent, EventSnapshot, LeaveRequestEvent};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_admin(pool: &PgPool, id: Uuid, full_name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_ranking.admins (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(id)
    .bind(full_name)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_call(
    pool: &PgPool,
    admin_id: Uuid,
    internal_rating: Option<f64>,
    delivery_time: Option<f64>,
    call_status: &str,
    created_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_ranking.delivery_calls
        (id, admin_id, internal_rating, delivery_time, call_status, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(internal_rating)
    .bind(delivery_time)
    .bind(call_status)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_chat_rating(
    pool: &PgPool,
    admin_id: Uuid,
    rating: f64,
    created_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_ranking.chat_ratings (id, admin_id, rating, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(rating)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_leave_request(
    pool: &PgPool,
    admin_id: Uuid,
    reason: Option<&str>,
    created_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_ranking.leave_requests (id, admin_id, reason, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(reason)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let admins = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            // (calls, rating, delivery minutes, chat ratings, chat score, leaves)
            (60, 4.8, 35.0, 55, 4.9, 0),
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            (9, 4.2, 18.0, 12, 4.4, 1),
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            (24, 3.9, 75.0, 20, 4.1, 3),
        ),
    ];
    let now = Utc::now();

    for (id, name, (calls, rating, delivery, chats, chat_score, leaves)) in admins {
        upsert_admin(pool, id, name).await?;

        for i in 0..calls {
            let drift = f64::from(i % 5) * 0.05;
            insert_call(
                pool,
                id,
                Some(rating - drift),
                Some(delivery + f64::from(i % 7)),
                "completed",
                now - Duration::hours(i64::from(i) * 6 + 1),
                &format!("seed-call-{id}-{i}"),
            )
            .await?;
        }
        for i in 0..chats {
            insert_chat_rating(
                pool,
                id,
                chat_score - f64::from(i % 3) * 0.1,
                now - Duration::hours(i64::from(i) * 8 + 2),
                &format!("seed-chat-{id}-{i}"),
            )
            .await?;
        }
        for i in 0..leaves {
            insert_leave_request(
                pool,
                id,
                Some("personal"),
                now - Duration::days(i64::from(i) * 6 + 1),
                &format!("seed-leave-{id}-{i}"),
            )
            .await?;
        }
    }

    // Calls from an admin with no directory entry.
    let unregistered = Uuid::parse_str("7b1c9e40-5a0f-4d2b-9c63-2f4e8a1d7c55")?;
    for i in 0..3 {
        insert_call(
            pool,
            unregistered,
            Some(4.0),
            None,
            "completed",
            now - Duration::hours(i64::from(i) + 3),
            &format!("seed-call-{unregistered}-{i}"),
        )
        .await?;
    }

    Ok(())
}

/// Loads everything a ranking run needs. Rows arrive newest first with
/// insertion order breaking timestamp ties.
pub async fn fetch_snapshot(
    pool: &PgPool,
    taken_at: DateTime<Utc>,
    leave_since: DateTime<Utc>,
    admin: Option<Uuid>,
) -> anyhow::Result<EventSnapshot> {
    let call_rows = sqlx::query(
        r#"
        SELECT admin_id, internal_rating, delivery_time, created_at
        FROM admin_ranking.delivery_calls
        WHERE ($1::uuid IS NULL OR admin_id = $1)
        ORDER BY created_at DESC, seq
        "#,
    )
    .bind(admin)
    .fetch_all(pool)
    .await
    .context("failed to fetch delivery calls")?;

    let mut calls = Vec::with_capacity(call_rows.len());
    for row in call_rows {
        calls.push(CallEvent {
            admin_id: AdminId::from(row.try_get::<Uuid, _>("admin_id")?),
            internal_rating: row.try_get("internal_rating")?,
            delivery_time: row.try_get("delivery_time")?,
            occurred_at: row.try_get("created_at")?,
        });
    }

    let rating_rows = sqlx::query(
        r#"
        SELECT admin_id, rating, created_at
        FROM admin_ranking.chat_ratings
        WHERE ($1::uuid IS NULL OR admin_id = $1)
        ORDER BY created_at DESC, seq
        "#,
    )
    .bind(admin)
    .fetch_all(pool)
    .await
    .context("failed to fetch chat ratings")?;

    let mut chat_ratings = Vec::with_capacity(rating_rows.len());
    for row in rating_rows {
        chat_ratings.push(ChatRatingEvent {
            admin_id: AdminId::from(row.try_get::<Uuid, _>("admin_id")?),
            rating: row.try_get("rating")?,
            occurred_at: row.try_get("created_at")?,
        });
    }

    let leave_rows = sqlx::query(
        r#"
        SELECT admin_id, created_at
        FROM admin_ranking.leave_requests
        WHERE created_at >= $1
          AND ($2::uuid IS NULL OR admin_id = $2)
        ORDER BY created_at DESC, seq
        "#,
    )
    .bind(leave_since)
    .bind(admin)
    .fetch_all(pool)
    .await
    .context("failed to fetch leave requests")?;

    let mut leave_requests = Vec::with_capacity(leave_rows.len());
    for row in leave_rows {
        leave_requests.push(LeaveRequestEvent {
            admin_id: AdminId::from(row.try_get::<Uuid, _>("admin_id")?),
            occurred_at: row.try_get("created_at")?,
        });
    }

    let name_rows = sqlx::query("SELECT id, full_name FROM admin_ranking.admins")
        .fetch_all(pool)
        .await
        .context("failed to fetch admin names")?;

    let mut admin_names = BTreeMap::new();
    for row in name_rows {
        admin_names.insert(
            AdminId::from(row.try_get::<Uuid, _>("id")?),
            row.try_get::<String, _>("full_name")?,
        );
    }

    info!(
        calls = calls.len(),
        chat_ratings = chat_ratings.len(),
        leave_requests = leave_requests.len(),
        admins = admin_names.len(),
        "fetched event snapshot"
    );

    Ok(EventSnapshot {
        taken_at,
        calls,
        chat_ratings,
        leave_requests,
        admin_names,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportKind {
    Calls,
    Ratings,
    Leaves,
}

pub async fn import_csv(pool: &PgPool, kind: ImportKind, csv_path: &Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CallRow {
        admin_id: Uuid,
        admin_name: Option<String>,
        internal_rating: Option<f64>,
        delivery_time: Option<f64>,
        call_status: Option<String>,
        created_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    #[derive(serde::Deserialize)]
    struct RatingRow {
        admin_id: Uuid,
        rating: f64,
        created_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    #[derive(serde::Deserialize)]
    struct LeaveRow {
        admin_id: Uuid,
        reason: Option<String>,
        created_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;
    let source_key = |key: Option<String>| key.unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

    match kind {
        ImportKind::Calls => {
            for result in reader.deserialize::<CallRow>() {
                let row = result?;
                if let Some(name) = row.admin_name.as_deref().filter(|n| !n.trim().is_empty()) {
                    upsert_admin(pool, row.admin_id, name).await?;
                }
                let added = insert_call(
                    pool,
                    row.admin_id,
                    row.internal_rating,
                    row.delivery_time,
                    row.call_status.as_deref().unwrap_or("completed"),
                    row.created_at,
                    &source_key(row.source_key),
                )
                .await?;
                inserted += usize::from(added);
            }
        }
        ImportKind::Ratings => {
            for result in reader.deserialize::<RatingRow>() {
                let row = result?;
                let added =
                    insert_chat_rating(pool, row.admin_id, row.rating, row.created_at, &source_key(row.source_key))
                        .await?;
                inserted += usize::from(added);
            }
        }
        ImportKind::Leaves => {
            for result in reader.deserialize::<LeaveRow>() {
                let row = result?;
                let added = insert_leave_request(
                    pool,
                    row.admin_id,
                    row.reason.as_deref(),
                    row.created_at,
                    &source_key(row.source_key),
                )
                .await?;
                inserted += usize::from(added);
            }
        }
    }

    Ok(inserted)
}
