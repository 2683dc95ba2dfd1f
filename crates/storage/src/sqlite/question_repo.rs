use std::collections::HashMap;

use exam_core::model::{AnswerDraft, CategoryId, Difficulty, Question, QuestionDraft, QuestionId};
use sqlx::Row;
use tracing::{debug, warn};

use super::SqliteRepository;
use super::mapping::{answer_id_from_i64, conn, question_id_from_i64, ser, to_i64};
use crate::repository::{LoadError, QuestionSetLoader, StorageError, select_valid};

fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Option<QuestionDraft>, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let raw_difficulty: String = row.try_get("difficulty").map_err(ser)?;
    let Ok(difficulty) = raw_difficulty.parse::<Difficulty>() else {
        warn!(
            question = %id,
            difficulty = %raw_difficulty,
            "skipping question with unknown difficulty"
        );
        return Ok(None);
    };
    let category = row.try_get::<i64, _>("category_id").map_err(ser)?;
    let category_id = CategoryId::new(
        u64::try_from(category).map_err(|_| ser(format!("invalid category_id: {category}")))?,
    );

    Ok(Some(QuestionDraft {
        id,
        text: row.try_get("text").map_err(ser)?,
        explanation: row.try_get("explanation").map_err(ser)?,
        difficulty,
        category_id,
        answers: Vec::new(),
    }))
}

impl SqliteRepository {
    /// Insert or replace a question together with its answer options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if ids overflow or the write fails.
    pub async fn upsert_question(&self, draft: &QuestionDraft) -> Result<(), StorageError> {
        let question_id = to_i64("question_id", draft.id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO questions (id, text, explanation, difficulty, category_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                explanation = excluded.explanation,
                difficulty = excluded.difficulty,
                category_id = excluded.category_id
            ",
        )
        .bind(question_id)
        .bind(draft.text.as_str())
        .bind(draft.explanation.as_deref())
        .bind(draft.difficulty.as_str())
        .bind(to_i64("category_id", draft.category_id.value())?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM answers WHERE question_id = ?1")
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, answer) in draft.answers.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO answers (id, question_id, position, text, is_correct)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(to_i64("answer_id", answer.id.value())?)
            .bind(question_id)
            .bind(to_i64("position", position as u64)?)
            .bind(answer.text.as_str())
            .bind(i64::from(answer.is_correct))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return StorageError::Conflict;
                    }
                }
                conn(e)
            })?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    /// Number of questions in the bank, valid or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failures.
    pub async fn count_questions(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        u64::try_from(count).map_err(ser)
    }

    /// Every question draft in random order, answers in presentation order.
    async fn random_drafts(&self) -> Result<Vec<QuestionDraft>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, text, explanation, difficulty, category_id
            FROM questions
            ORDER BY RANDOM()
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut drafts = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(draft) = map_question_row(row)? {
                drafts.push(draft);
            }
        }

        let answer_rows = sqlx::query(
            r"
            SELECT id, question_id, text, is_correct
            FROM answers
            ORDER BY question_id, position
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut by_question: HashMap<QuestionId, Vec<AnswerDraft>> = HashMap::new();
        for row in &answer_rows {
            let question_id = question_id_from_i64(row.try_get("question_id").map_err(ser)?)?;
            let answer = AnswerDraft::new(
                answer_id_from_i64(row.try_get("id").map_err(ser)?)?,
                row.try_get::<String, _>("text").map_err(ser)?,
                row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
            );
            by_question.entry(question_id).or_default().push(answer);
        }

        for draft in &mut drafts {
            draft.answers = by_question.remove(&draft.id).unwrap_or_default();
        }
        Ok(drafts)
    }
}

#[async_trait::async_trait]
impl QuestionSetLoader for SqliteRepository {
    async fn load(&self, desired_count: u32) -> Result<Vec<Question>, LoadError> {
        let drafts = self.random_drafts().await?;
        debug!(available = drafts.len(), desired_count, "loaded question bank");
        select_valid(drafts, desired_count)
    }
}
