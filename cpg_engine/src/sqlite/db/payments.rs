use chrono::Duration;
use cpg_common::CryptoAmount;
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewPayment, Payment, PaymentId, SubjectRef},
    payment_objects::PaymentUpdate,
    traits::PaymentLedgerError,
};

/// Inserts a new payment, assigning a fresh id and letting the database stamp the timestamps.
///
/// A unique-violation on the `(currency, address)` index surfaces as
/// [`PaymentLedgerError::DuplicateAddress`], which the allocator uses to retry a lost derivation race. A violation
/// of the one-child-per-parent index surfaces as [`PaymentLedgerError::ChildAlreadyLinked`] instead.
pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, PaymentLedgerError> {
    let id = PaymentId::random();
    let address = payment.address.clone();
    let parent_id = payment.parent_id.clone();
    let (subject_kind, subject_id) = match payment.subject {
        Some(SubjectRef { kind, id }) => (Some(kind), Some(id)),
        None => (None, None),
    };
    let result: Result<Payment, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO payments (
                id,
                currency,
                crypto_code,
                address,
                address_reused,
                status,
                crypto_amount,
                fiat_amount,
                fiat_currency,
                title,
                description,
                owner,
                subject_kind,
                subject_id,
                parent_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *;
        "#,
    )
    .bind(id.clone())
    .bind(payment.currency)
    .bind(payment.crypto_code)
    .bind(payment.address)
    .bind(payment.address_reused)
    .bind(payment.status.to_string())
    .bind(payment.crypto_amount)
    .bind(payment.fiat_amount)
    .bind(payment.fiat_currency)
    .bind(payment.title)
    .bind(payment.description)
    .bind(payment.owner)
    .bind(subject_kind)
    .bind(subject_id)
    .bind(payment.parent_id)
    .fetch_one(conn)
    .await;
    match result {
        Ok(payment) => {
            debug!("📝️ Payment {} inserted at address {}", payment.id, payment.address);
            Ok(payment)
        },
        // SQLite names the violated index in the message, so the two insert races stay distinguishable.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => match parent_id {
            Some(pid) if e.message().contains("payment_parent_idx") => {
                Err(PaymentLedgerError::ChildAlreadyLinked(pid))
            },
            _ => Err(PaymentLedgerError::DuplicateAddress(address)),
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment_by_id(
    id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(payment)
}

/// The number of payments ever created for the currency, terminal ones included.
pub async fn payment_count(currency: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE currency = $1")
        .bind(currency)
        .fetch_one(conn)
        .await?;
    Ok(count.unsigned_abs())
}

/// The address of a previously paid payment for the currency, preferring the one that has been idle longest.
pub async fn reusable_address(currency: &str, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    let address = sqlx::query_scalar(
        "SELECT address FROM payments WHERE currency = $1 AND status = 'Paid' ORDER BY updated_at ASC, id ASC LIMIT 1",
    )
    .bind(currency)
    .fetch_optional(conn)
    .await?;
    Ok(address)
}

/// The reconciliation candidate set: non-terminal payments created within the unpaid-window.
pub async fn fetch_open_payments(
    currency: &str,
    unpaid_window: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as(
        format!(
            "SELECT * FROM payments WHERE currency = $1 AND status IN ('New', 'Processing') AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) <= {} ORDER BY created_at ASC;",
            unpaid_window.num_seconds()
        )
        .as_str(),
    )
    .bind(currency)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Payments still in `New` whose quote has not been touched within `refresh_after`.
pub async fn fetch_stale_quotes(
    currency: &str,
    refresh_after: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as(
        format!(
            "SELECT * FROM payments WHERE currency = $1 AND status = 'New' AND (unixepoch(CURRENT_TIMESTAMP) - \
             unixepoch(updated_at)) >= {} ORDER BY created_at ASC;",
            refresh_after.num_seconds()
        )
        .as_str(),
    )
    .bind(currency)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Applies a transition to a payment that is still open. `None` means the payment does not exist or has already
/// reached a terminal status; the write is dropped rather than reopening a settled payment.
pub async fn update_payment(
    id: &PaymentId,
    update: PaymentUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentLedgerError> {
    if update.is_empty() {
        debug!("📝️ No fields to update for payment {id}. Update request skipped.");
        return Err(PaymentLedgerError::UpdateNoOp);
    }
    let mut builder = QueryBuilder::new("UPDATE payments SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(status) = update.new_status {
        set_clause.push("status = ");
        set_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(tx_hash) = update.new_tx_hash {
        set_clause.push("tx_hash = ");
        set_clause.push_bind_unseparated(tx_hash);
    }
    if let Some(paid) = update.new_paid_crypto_amount {
        set_clause.push("paid_crypto_amount = ");
        set_clause.push_bind_unseparated(paid);
    }
    if let Some(amount) = update.new_crypto_amount {
        set_clause.push("crypto_amount = ");
        set_clause.push_bind_unseparated(amount);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str());
    builder.push(" AND status IN ('New', 'Processing') RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let updated =
        builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| Payment::from_row(&row)).transpose()?;
    Ok(updated)
}

/// Re-quotes the payment, but only while it is still `New`. `None` means the payment moved on in the meantime and
/// the refresh was dropped.
pub async fn refresh_crypto_amount(
    id: &PaymentId,
    amount: CryptoAmount,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        "UPDATE payments SET crypto_amount = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = 'New' \
         RETURNING *",
    )
    .bind(amount)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Links `child_id` as the one child of `parent_id`. The `child_id IS NULL` guard makes the check-and-set atomic;
/// a second linker loses the race and gets [`PaymentLedgerError::ChildAlreadyLinked`].
pub async fn link_child(
    parent_id: &PaymentId,
    child_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentLedgerError> {
    let rows =
        sqlx::query("UPDATE payments SET child_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND child_id IS NULL")
            .bind(child_id.as_str())
            .bind(parent_id.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
    if rows > 0 {
        return Ok(());
    }
    match fetch_payment_by_id(parent_id, conn).await? {
        Some(_) => Err(PaymentLedgerError::ChildAlreadyLinked(parent_id.clone())),
        None => Err(PaymentLedgerError::PaymentNotFound(parent_id.clone())),
    }
}

/// Moves every `New` payment older than the unpaid-window to `Cancelled` in one statement.
pub async fn cancel_aged_payments(
    currency: &str,
    unpaid_window: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as(
        format!(
            "UPDATE payments SET updated_at = CURRENT_TIMESTAMP, status = 'Cancelled' WHERE currency = $1 AND status \
             = 'New' AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
            unpaid_window.num_seconds()
        )
        .as_str(),
    )
    .bind(currency)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// All payments associated with the external subject, oldest first.
pub async fn fetch_payments_for_subject(
    subject: &SubjectRef,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as(
        "SELECT * FROM payments WHERE subject_kind = $1 AND subject_id = $2 ORDER BY created_at ASC, id ASC",
    )
    .bind(subject.kind.as_str())
    .bind(subject.id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
