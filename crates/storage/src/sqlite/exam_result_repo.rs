use chrono::{DateTime, Utc};
use exam_core::model::{ExamResult, QuestionOutcome};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    answer_id_from_i64, conn, question_id_from_i64, secs_from_i64, ser, to_i64, to_u32,
};
use crate::repository::{ExamResultRow, ResultsStore, StorageError};

fn map_outcome_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionOutcome, StorageError> {
    Ok(QuestionOutcome {
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        selected_answer_id: row
            .try_get::<Option<i64>, _>("selected_answer_id")
            .map_err(ser)?
            .map(answer_id_from_i64)
            .transpose()?,
        correct_answer_id: row
            .try_get::<Option<i64>, _>("correct_answer_id")
            .map_err(ser)?
            .map(answer_id_from_i64)
            .transpose()?,
        is_correct: row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
    })
}

/// Scalar columns of an `exam_results` row, read before the outcomes are fetched.
struct ResultHeader {
    id: i64,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct_answers: u32,
    time_spent_secs: u64,
    passing_threshold: u32,
    passed: bool,
}

fn map_header_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultHeader, StorageError> {
    Ok(ResultHeader {
        id: row.try_get("id").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        total_questions: to_u32("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        correct_answers: to_u32("correct_answers", row.try_get("correct_answers").map_err(ser)?)?,
        time_spent_secs: secs_from_i64(
            "time_spent_secs",
            row.try_get("time_spent_secs").map_err(ser)?,
        )?,
        passing_threshold: to_u32(
            "passing_threshold",
            row.try_get("passing_threshold").map_err(ser)?,
        )?,
        passed: row.try_get::<i64, _>("passed").map_err(ser)? != 0,
    })
}

impl SqliteRepository {
    async fn outcomes_for(&self, result_id: i64) -> Result<Vec<QuestionOutcome>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id, selected_answer_id, correct_answer_id, is_correct
            FROM exam_result_answers
            WHERE result_id = ?1
            ORDER BY position
            ",
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_outcome_row).collect()
    }

    async fn hydrate(&self, header: ResultHeader) -> Result<ExamResultRow, StorageError> {
        let outcomes = self.outcomes_for(header.id).await?;
        let result = ExamResult::from_persisted(
            header.total_questions,
            header.correct_answers,
            header.time_spent_secs,
            header.passing_threshold,
            header.passed,
            outcomes,
        )
        .map_err(ser)?;
        Ok(ExamResultRow::new(header.id, header.completed_at, result))
    }
}

#[async_trait::async_trait]
impl ResultsStore for SqliteRepository {
    async fn save(
        &self,
        result: &ExamResult,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO exam_results (
                completed_at, total_questions, correct_answers,
                time_spent_secs, passing_threshold, passed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(completed_at)
        .bind(i64::from(result.total_questions()))
        .bind(i64::from(result.correct_answers()))
        .bind(to_i64("time_spent_secs", result.time_spent_secs())?)
        .bind(i64::from(result.passing_threshold()))
        .bind(i64::from(result.passed()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        let result_id = res.last_insert_rowid();

        for (position, outcome) in result.per_question().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO exam_result_answers (
                    result_id, position, question_id,
                    selected_answer_id, correct_answer_id, is_correct
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(result_id)
            .bind(to_i64("position", position as u64)?)
            .bind(to_i64("question_id", outcome.question_id.value())?)
            .bind(
                outcome
                    .selected_answer_id
                    .map(|id| to_i64("selected_answer_id", id.value()))
                    .transpose()?,
            )
            .bind(
                outcome
                    .correct_answer_id
                    .map(|id| to_i64("correct_answer_id", id.value()))
                    .transpose()?,
            )
            .bind(i64::from(outcome.is_correct))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(result_id)
    }

    async fn get_result(&self, id: i64) -> Result<ExamResultRow, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, completed_at, total_questions, correct_answers,
                   time_spent_secs, passing_threshold, passed
            FROM exam_results
            WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let header = map_header_row(&row)?;
        drop(row);
        self.hydrate(header).await
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, completed_at, total_questions, correct_answers,
                   time_spent_secs, passing_threshold, passed
            FROM exam_results
            ORDER BY completed_at DESC, id DESC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let headers = rows
            .iter()
            .map(map_header_row)
            .collect::<Result<Vec<_>, _>>()?;
        drop(rows);

        let mut results = Vec::with_capacity(headers.len());
        for header in headers {
            results.push(self.hydrate(header).await?);
        }
        Ok(results)
    }
}
