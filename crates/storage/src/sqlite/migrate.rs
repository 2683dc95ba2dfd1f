use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the schema migrations that have not been applied yet.
///
/// Version 1 creates the question bank (questions, answers) and the result
/// history (exam results with their per-question outcomes).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    text TEXT NOT NULL,
                    explanation TEXT,
                    difficulty TEXT NOT NULL,
                    category_id INTEGER NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answers (
                    id INTEGER PRIMARY KEY,
                    question_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    text TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_results (
                    id INTEGER PRIMARY KEY,
                    completed_at TEXT NOT NULL,
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    correct_answers INTEGER NOT NULL CHECK (correct_answers >= 0),
                    time_spent_secs INTEGER NOT NULL CHECK (time_spent_secs >= 0),
                    passing_threshold INTEGER NOT NULL CHECK (passing_threshold >= 0),
                    passed INTEGER NOT NULL CHECK (passed IN (0, 1))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exam_result_answers (
                    result_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    question_id INTEGER NOT NULL,
                    selected_answer_id INTEGER,
                    correct_answer_id INTEGER,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    PRIMARY KEY (result_id, position),
                    FOREIGN KEY (result_id) REFERENCES exam_results(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_answers_question_position
                    ON answers (question_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_exam_results_completed
                    ON exam_results (completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
