use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use statera_core::{
    AccountMeta, CategoryKeyword, CorrectionRecord, DuplicateFlag, SourceFormat, Statement,
    StatementId, StatementStatus, Transaction, TransactionId, VendorCategoryMapping,
    DEFAULT_KEYWORDS,
};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    connect(&format!("sqlite:{}?mode=rwc", path.display())).await
}

/// In-memory database for tests.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    connect("sqlite::memory:").await
}

async fn connect(url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statements (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            account_name TEXT,
            bank_id TEXT,
            currency TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT 'unknown',
            filename TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            failure TEXT,
            archived INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            statement_id TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            balance_minor INTEGER,
            fingerprint TEXT NOT NULL,
            category TEXT,
            category_confidence REAL NOT NULL DEFAULT 0,
            duplicate TEXT NOT NULL DEFAULT 'none',
            duplicate_similarity REAL,
            needs_review INTEGER NOT NULL DEFAULT 0,
            row_confidence REAL NOT NULL DEFAULT 1,
            FOREIGN KEY (statement_id) REFERENCES statements(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_statement ON transactions(statement_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corrections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id INTEGER NOT NULL,
            field TEXT NOT NULL,
            previous_value TEXT NOT NULL,
            new_value TEXT NOT NULL,
            reason TEXT NOT NULL,
            actor TEXT NOT NULL,
            corrected_at TEXT NOT NULL,
            FOREIGN KEY (transaction_id) REFERENCES transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendor_mappings (
            company_id INTEGER NOT NULL,
            vendor TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (company_id, vendor)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_keywords (
            keyword TEXT NOT NULL,
            category TEXT NOT NULL,
            weight REAL NOT NULL,
            PRIMARY KEY (keyword, category)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_profiles (
            name TEXT PRIMARY KEY,
            config TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Statements ────────────────────────────────────────────────────────────────

pub async fn insert_statement(pool: &DbPool, stmt: &Statement) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO statements
            (id, account_id, account_name, bank_id, currency, format, filename,
             content_hash, uploaded_at, status, failure, archived)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(stmt.id.to_string())
    .bind(&stmt.account.account_id)
    .bind(&stmt.account.account_name)
    .bind(&stmt.account.bank_id)
    .bind(stmt.account.currency.as_str())
    .bind(stmt.format.to_string())
    .bind(&stmt.filename)
    .bind(&stmt.content_hash)
    .bind(stmt.uploaded_at.to_rfc3339())
    .bind(stmt.status.as_str())
    .bind(&stmt.failure)
    .bind(stmt.archived as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_statement(
    pool: &DbPool,
    id: StatementId,
) -> Result<Option<Statement>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, account_name, bank_id, currency, format, filename,
               content_hash, uploaded_at, status, failure, archived
        FROM statements WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_statement(&r)).transpose()
}

pub async fn update_statement_status(
    pool: &DbPool,
    id: StatementId,
    status: StatementStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE statements SET status = ?, failure = NULL WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_statement_format(
    pool: &DbPool,
    id: StatementId,
    format: SourceFormat,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE statements SET format = ? WHERE id = ?")
        .bind(format.to_string())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Cause is retained verbatim for operator review.
pub async fn set_statement_failed(
    pool: &DbPool,
    id: StatementId,
    cause: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE statements SET status = 'failed', failure = ? WHERE id = ?")
        .bind(cause)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_statement_archived(pool: &DbPool, id: StatementId) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE statements SET archived = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_statement(r: &sqlx::sqlite::SqliteRow) -> Result<Statement, sqlx::Error> {
    let id: String = r.get("id");
    let id = id
        .parse::<StatementId>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let currency: String = r.get("currency");
    let uploaded_at: String = r.get("uploaded_at");
    let format: String = r.get("format");
    let status: String = r.get("status");
    let archived: i64 = r.get("archived");

    Ok(Statement {
        id,
        account: AccountMeta {
            account_id: r.get("account_id"),
            account_name: r.get("account_name"),
            bank_id: r.get("bank_id"),
            currency: currency
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        },
        format: format.parse().unwrap_or(SourceFormat::Unknown),
        filename: r.get("filename"),
        content_hash: r.get("content_hash"),
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        status: status.parse().unwrap_or(StatementStatus::Failed),
        failure: r.get("failure"),
        archived: archived != 0,
    })
}

// ── Transactions ──────────────────────────────────────────────────────────────

/// Replace a statement's transactions in one database transaction —
/// resubmitted statements reprocess from scratch.
pub async fn replace_transactions(
    pool: &DbPool,
    statement_id: StatementId,
    transactions: &[Transaction],
) -> Result<(), sqlx::Error> {
    let mut db_tx = pool.begin().await?;

    sqlx::query("DELETE FROM transactions WHERE statement_id = ?")
        .bind(statement_id.to_string())
        .execute(&mut *db_tx)
        .await?;

    for t in transactions {
        let (duplicate, similarity) = duplicate_columns(t.duplicate);
        sqlx::query(
            r#"
            INSERT INTO transactions
                (statement_id, date, description, amount_minor, currency, balance_minor,
                 fingerprint, category, category_confidence, duplicate,
                 duplicate_similarity, needs_review, row_confidence)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(statement_id.to_string())
        .bind(t.date.format("%Y-%m-%d").to_string())
        .bind(&t.description)
        .bind(t.amount.minor_units)
        .bind(t.amount.currency.as_str())
        .bind(t.balance.map(|b| b.minor_units))
        .bind(&t.fingerprint)
        .bind(&t.category)
        .bind(t.category_confidence as f64)
        .bind(duplicate)
        .bind(similarity)
        .bind(t.needs_review as i64)
        .bind(t.row_confidence as f64)
        .execute(&mut *db_tx)
        .await?;
    }

    db_tx.commit().await
}

pub async fn list_transactions(
    pool: &DbPool,
    statement_id: StatementId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, statement_id, date, description, amount_minor, currency, balance_minor,
               fingerprint, category, category_confidence, duplicate,
               duplicate_similarity, needs_review, row_confidence
        FROM transactions WHERE statement_id = ?
        ORDER BY date, id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(statement_id.to_string())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_transaction).collect()
}

pub async fn count_transactions(
    pool: &DbPool,
    statement_id: StatementId,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM transactions WHERE statement_id = ?")
        .bind(statement_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub async fn get_transaction(
    pool: &DbPool,
    id: TransactionId,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, statement_id, date, description, amount_minor, currency, balance_minor,
               fingerprint, category, category_confidence, duplicate,
               duplicate_similarity, needs_review, row_confidence
        FROM transactions WHERE id = ?
        "#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_transaction).transpose()
}

/// Transactions in a date range for one account — the reconciliation pull.
pub async fn transactions_for_account(
    pool: &DbPool,
    account_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.statement_id, t.date, t.description, t.amount_minor, t.currency,
               t.balance_minor, t.fingerprint, t.category, t.category_confidence,
               t.duplicate, t.duplicate_similarity, t.needs_review, t.row_confidence
        FROM transactions t
        JOIN statements s ON s.id = t.statement_id
        WHERE s.account_id = ? AND t.date >= ? AND t.date <= ?
        ORDER BY t.date, t.id
        "#,
    )
    .bind(account_id)
    .bind(start.format("%Y-%m-%d").to_string())
    .bind(end.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_transaction).collect()
}

pub async fn update_transaction_description(
    pool: &DbPool,
    id: TransactionId,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET description = ? WHERE id = ?")
        .bind(description)
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_transaction_category(
    pool: &DbPool,
    id: TransactionId,
    category: &str,
    confidence: f32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET category = ?, category_confidence = ? WHERE id = ?")
        .bind(category)
        .bind(confidence as f64)
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_transaction_amount(
    pool: &DbPool,
    id: TransactionId,
    amount_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET amount_minor = ? WHERE id = ?")
        .bind(amount_minor)
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

fn duplicate_columns(flag: DuplicateFlag) -> (&'static str, Option<f64>) {
    match flag {
        DuplicateFlag::None => ("none", None),
        DuplicateFlag::Exact => ("exact", None),
        DuplicateFlag::Possible(s) => ("possible", Some(s as f64)),
    }
}

fn row_to_transaction(r: &sqlx::sqlite::SqliteRow) -> Result<Transaction, sqlx::Error> {
    let statement_id: String = r.get("statement_id");
    let date: String = r.get("date");
    let currency: String = r.get("currency");
    let duplicate: String = r.get("duplicate");
    let similarity: Option<f64> = r.get("duplicate_similarity");
    let needs_review: i64 = r.get("needs_review");
    let category_confidence: f64 = r.get("category_confidence");
    let row_confidence: f64 = r.get("row_confidence");

    let currency: statera_core::Currency = currency
        .parse()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Transaction {
        id: Some(TransactionId(r.get("id"))),
        statement_id: statement_id
            .parse::<StatementId>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        description: r.get("description"),
        amount: statera_core::Money::new(r.get("amount_minor"), currency),
        balance: r
            .get::<Option<i64>, _>("balance_minor")
            .map(|b| statera_core::Money::new(b, currency)),
        fingerprint: r.get("fingerprint"),
        category: r.get("category"),
        category_confidence: category_confidence as f32,
        duplicate: match duplicate.as_str() {
            "exact" => DuplicateFlag::Exact,
            "possible" => DuplicateFlag::Possible(similarity.unwrap_or(0.0) as f32),
            _ => DuplicateFlag::None,
        },
        needs_review: needs_review != 0,
        row_confidence: row_confidence as f32,
    })
}

// ── Corrections ───────────────────────────────────────────────────────────────

pub async fn insert_correction(
    pool: &DbPool,
    record: &CorrectionRecord,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO corrections
            (transaction_id, field, previous_value, new_value, reason, actor, corrected_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.transaction_id.0)
    .bind(record.field.to_string())
    .bind(&record.previous_value)
    .bind(&record.new_value)
    .bind(&record.reason)
    .bind(&record.actor)
    .bind(record.corrected_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_corrections(
    pool: &DbPool,
    transaction_id: TransactionId,
) -> Result<Vec<CorrectionRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, transaction_id, field, previous_value, new_value, reason, actor, corrected_at
        FROM corrections WHERE transaction_id = ? ORDER BY id
        "#,
    )
    .bind(transaction_id.0)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            let field: String = r.get("field");
            let corrected_at: String = r.get("corrected_at");
            Ok(CorrectionRecord {
                id: Some(r.get("id")),
                transaction_id: TransactionId(r.get("transaction_id")),
                field: field
                    .parse()
                    .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
                previous_value: r.get("previous_value"),
                new_value: r.get("new_value"),
                reason: r.get("reason"),
                actor: r.get("actor"),
                corrected_at: DateTime::parse_from_rfc3339(&corrected_at)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            })
        })
        .collect()
}

// ── Vendor mappings & keywords ────────────────────────────────────────────────

/// Atomic upsert-and-increment: concurrent corrections for the same vendor
/// serialize inside SQLite, so usage counters never lose updates.
pub async fn upsert_vendor_mapping(
    pool: &DbPool,
    company_id: i64,
    vendor: &str,
    category: &str,
    confidence: f32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vendor_mappings (company_id, vendor, category, confidence, usage_count)
        VALUES (?, ?, ?, ?, 1)
        ON CONFLICT(company_id, vendor) DO UPDATE SET
            category = excluded.category,
            confidence = excluded.confidence,
            usage_count = vendor_mappings.usage_count + 1
        "#,
    )
    .bind(company_id)
    .bind(vendor)
    .bind(category)
    .bind(confidence as f64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_vendor_mappings(
    pool: &DbPool,
    company_id: i64,
) -> Result<Vec<VendorCategoryMapping>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, f64, i64)>(
        "SELECT company_id, vendor, category, confidence, usage_count
         FROM vendor_mappings WHERE company_id = ? ORDER BY vendor",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| VendorCategoryMapping {
            company_id: r.0,
            vendor: r.1,
            category: r.2,
            confidence: r.3 as f32,
            usage_count: r.4,
        })
        .collect())
}

pub async fn seed_default_keywords(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (keyword, category, weight) in DEFAULT_KEYWORDS {
        sqlx::query(
            "INSERT OR IGNORE INTO category_keywords (keyword, category, weight) VALUES (?, ?, ?)",
        )
        .bind(keyword)
        .bind(category)
        .bind(*weight as f64)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Administrator-facing keyword maintenance.
pub async fn save_category_keyword(
    pool: &DbPool,
    keyword: &str,
    category: &str,
    weight: f32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO category_keywords (keyword, category, weight) VALUES (?, ?, ?)
         ON CONFLICT(keyword, category) DO UPDATE SET weight = excluded.weight",
    )
    .bind(keyword.to_lowercase())
    .bind(category)
    .bind(weight as f64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_category_keywords(pool: &DbPool) -> Result<Vec<CategoryKeyword>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, f64)>(
        "SELECT keyword, category, weight FROM category_keywords ORDER BY keyword",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| CategoryKeyword { keyword: r.0, category: r.1, weight: r.2 as f32 })
        .collect())
}

// ── Bank profiles ─────────────────────────────────────────────────────────────

pub async fn save_bank_profile(
    pool: &DbPool,
    name: &str,
    config_json: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO bank_profiles (name, config) VALUES (?, ?)
         ON CONFLICT(name) DO UPDATE SET config = excluded.config",
    )
    .bind(name)
    .bind(config_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_bank_profiles(pool: &DbPool) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String)>("SELECT name, config FROM bank_profiles ORDER BY name")
        .fetch_all(pool)
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use statera_core::{Currency, Money};

    fn sample_statement() -> Statement {
        Statement::new(
            AccountMeta {
                account_id: "000112345".into(),
                account_name: Some("Checking".into()),
                bank_id: Some("123456789".into()),
                currency: Currency::USD,
            },
            "jan.csv",
            "ab".repeat(32),
            Utc::now(),
        )
    }

    fn sample_tx(statement_id: StatementId, cents: i64, desc: &str) -> Transaction {
        Transaction {
            id: None,
            statement_id,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: desc.to_string(),
            amount: Money::new(cents, Currency::USD),
            balance: Some(Money::new(100_000, Currency::USD)),
            fingerprint: format!("fp-{desc}"),
            category: None,
            category_confidence: 0.0,
            duplicate: DuplicateFlag::None,
            needs_review: false,
            row_confidence: 1.0,
        }
    }

    #[tokio::test]
    async fn statement_roundtrip() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();

        let loaded = get_statement(&pool, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, stmt.id);
        assert_eq!(loaded.account.account_id, "000112345");
        assert_eq!(loaded.account.currency, Currency::USD);
        assert_eq!(loaded.status, StatementStatus::Uploaded);
        assert!(!loaded.archived);
    }

    #[tokio::test]
    async fn missing_statement_is_none() {
        let pool = create_memory_db().await.unwrap();
        assert!(get_statement(&pool, StatementId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_and_failure_updates() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();

        update_statement_status(&pool, stmt.id, StatementStatus::Extracting)
            .await
            .unwrap();
        let loaded = get_statement(&pool, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::Extracting);

        set_statement_failed(&pool, stmt.id, "tesseract timed out after 60s")
            .await
            .unwrap();
        let loaded = get_statement(&pool, stmt.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StatementStatus::Failed);
        assert_eq!(loaded.failure.as_deref(), Some("tesseract timed out after 60s"));
    }

    #[tokio::test]
    async fn transactions_roundtrip_with_flags() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();

        let mut t1 = sample_tx(stmt.id, -4999, "AMAZON");
        t1.category = Some("Shopping".into());
        t1.category_confidence = 0.75;
        let mut t2 = sample_tx(stmt.id, -4999, "AMAZON");
        t2.duplicate = DuplicateFlag::Exact;
        let mut t3 = sample_tx(stmt.id, -550, "SMUDGED");
        t3.duplicate = DuplicateFlag::Possible(0.8);
        t3.needs_review = true;
        t3.row_confidence = 0.4;

        replace_transactions(&pool, stmt.id, &[t1, t2, t3]).await.unwrap();

        let listed = list_transactions(&pool, stmt.id, 50, 0).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].category.as_deref(), Some("Shopping"));
        assert_eq!(listed[1].duplicate, DuplicateFlag::Exact);
        match listed[2].duplicate {
            DuplicateFlag::Possible(s) => assert!((s - 0.8).abs() < 1e-6),
            other => panic!("expected Possible, got {other:?}"),
        }
        assert!(listed[2].needs_review);
        assert_eq!(count_transactions(&pool, stmt.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn replace_is_idempotent_for_resubmission() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();

        replace_transactions(&pool, stmt.id, &[sample_tx(stmt.id, -100, "A")])
            .await
            .unwrap();
        replace_transactions(
            &pool,
            stmt.id,
            &[sample_tx(stmt.id, -100, "A"), sample_tx(stmt.id, -200, "B")],
        )
        .await
        .unwrap();

        assert_eq!(count_transactions(&pool, stmt.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pagination_limits_and_offsets() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();

        let txs: Vec<_> = (0..5)
            .map(|i| sample_tx(stmt.id, -100 - i, &format!("TX{i}")))
            .collect();
        replace_transactions(&pool, stmt.id, &txs).await.unwrap();

        let page1 = list_transactions(&pool, stmt.id, 2, 0).await.unwrap();
        let page2 = list_transactions(&pool, stmt.id, 2, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_ne!(page1[0].id, page2[0].id);
    }

    #[tokio::test]
    async fn correction_log_appends() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();
        replace_transactions(&pool, stmt.id, &[sample_tx(stmt.id, -550, "STARBUCKS")])
            .await
            .unwrap();
        let tx = &list_transactions(&pool, stmt.id, 1, 0).await.unwrap()[0];

        let record = CorrectionRecord {
            id: None,
            transaction_id: tx.id.unwrap(),
            field: statera_core::CorrectionField::Category,
            previous_value: "Meals".into(),
            new_value: "Travel".into(),
            reason: "client lunch was actually a taxi".into(),
            actor: "jane".into(),
            corrected_at: Utc::now(),
        };
        insert_correction(&pool, &record).await.unwrap();
        insert_correction(&pool, &record).await.unwrap();

        let log = list_corrections(&pool, tx.id.unwrap()).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].new_value, "Travel");
        assert_eq!(log[0].actor, "jane");
    }

    #[tokio::test]
    async fn vendor_upsert_increments_usage() {
        let pool = create_memory_db().await.unwrap();

        upsert_vendor_mapping(&pool, 1, "STARBUCKS", "Meals", 0.9).await.unwrap();
        upsert_vendor_mapping(&pool, 1, "STARBUCKS", "Travel", 0.9).await.unwrap();
        upsert_vendor_mapping(&pool, 2, "STARBUCKS", "Meals", 0.9).await.unwrap();

        let company1 = get_vendor_mappings(&pool, 1).await.unwrap();
        assert_eq!(company1.len(), 1);
        assert_eq!(company1[0].category, "Travel");
        assert_eq!(company1[0].usage_count, 2);

        // Company scoping: company 2 kept its own row.
        let company2 = get_vendor_mappings(&pool, 2).await.unwrap();
        assert_eq!(company2[0].category, "Meals");
        assert_eq!(company2[0].usage_count, 1);
    }

    #[tokio::test]
    async fn keyword_seeding_is_idempotent() {
        let pool = create_memory_db().await.unwrap();
        seed_default_keywords(&pool).await.unwrap();
        seed_default_keywords(&pool).await.unwrap();
        let keywords = get_category_keywords(&pool).await.unwrap();
        assert_eq!(keywords.len(), DEFAULT_KEYWORDS.len());
    }

    #[tokio::test]
    async fn keyword_save_upserts_weight() {
        let pool = create_memory_db().await.unwrap();
        save_category_keyword(&pool, "Ferry", "Travel", 0.6).await.unwrap();
        save_category_keyword(&pool, "ferry", "Travel", 0.9).await.unwrap();
        let keywords = get_category_keywords(&pool).await.unwrap();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].keyword, "ferry");
        assert!((keywords[0].weight - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn bank_profiles_upsert_by_name() {
        let pool = create_memory_db().await.unwrap();
        save_bank_profile(&pool, "Chase Checking", "{\"v\":1}").await.unwrap();
        save_bank_profile(&pool, "Chase Checking", "{\"v\":2}").await.unwrap();
        let profiles = get_bank_profiles(&pool).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].1, "{\"v\":2}");
    }

    #[tokio::test]
    async fn account_range_query_joins_statements() {
        let pool = create_memory_db().await.unwrap();
        let stmt = sample_statement();
        insert_statement(&pool, &stmt).await.unwrap();
        replace_transactions(&pool, stmt.id, &[sample_tx(stmt.id, -550, "STARBUCKS")])
            .await
            .unwrap();

        let hits = transactions_for_account(
            &pool,
            "000112345",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = transactions_for_account(
            &pool,
            "other-account",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await
        .unwrap();
        assert!(misses.is_empty());
    }
}
