use std::collections::BTreeMap;

use crate::model::ids::{AnswerId, QuestionId};

/// Selected answer per question. Absence means unanswered.
///
/// Holds at most one selection per question; selecting again overwrites.
/// Membership checks against the loaded question set are the owner's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap(BTreeMap<QuestionId, AnswerId>);

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a selection, returning the previous one for this question.
    pub fn select(&mut self, question: QuestionId, answer: AnswerId) -> Option<AnswerId> {
        self.0.insert(question, answer)
    }

    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<AnswerId> {
        self.0.get(&question).copied()
    }

    #[must_use]
    pub fn is_answered(&self, question: QuestionId) -> bool {
        self.0.contains_key(&question)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, AnswerId)> + '_ {
        self.0.iter().map(|(q, a)| (*q, *a))
    }
}

impl FromIterator<(QuestionId, AnswerId)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (QuestionId, AnswerId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_overwrites_previous_choice() {
        let mut map = AnswerMap::new();
        assert_eq!(map.select(QuestionId::new(1), AnswerId::new(10)), None);
        assert_eq!(
            map.select(QuestionId::new(1), AnswerId::new(11)),
            Some(AnswerId::new(10))
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(QuestionId::new(1)), Some(AnswerId::new(11)));
    }

    #[test]
    fn unanswered_question_is_absent() {
        let map = AnswerMap::new();
        assert!(map.is_empty());
        assert!(!map.is_answered(QuestionId::new(3)));
    }
}
