//! Database operations for the `classrooms` table.

use crate::reference::ReferenceRow;
use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Replace every persisted row with `rows`, in a single transaction.
pub async fn replace_all(pool: &SqlitePool, rows: &[ReferenceRow]) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    sqlx::query("DELETE FROM classrooms")
        .execute(&mut *tx)
        .await
        .context("failed to clear classrooms")?;

    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO classrooms (classroom_code, classroom_details, pure_department, address_cleaned)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&row.code)
        .bind(&row.details)
        .bind(&row.department)
        .bind(&row.address)
        .execute(&mut *tx)
        .await
        .context("failed to insert classroom")?;
    }

    tx.commit().await.context("failed to commit classrooms")?;
    Ok(())
}

/// Get all persisted rows in insertion order.
pub async fn get_all(pool: &SqlitePool) -> Result<Vec<ReferenceRow>> {
    let rows = sqlx::query_as::<_, (String, String, String, String)>(
        r#"
        SELECT classroom_code, classroom_details, pure_department, address_cleaned
        FROM classrooms
        ORDER BY rowid
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch classrooms")?;

    Ok(rows
        .into_iter()
        .map(|(code, details, department, address)| {
            ReferenceRow::new(code, details, department, address)
        })
        .collect())
}
