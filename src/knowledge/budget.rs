//! 검색 예산 - 결과 개수 또는 누적 단어 수 제한
//!
//! 두 모드는 명시적으로 분리됩니다:
//! - `Count(n)`: 순위 상위 n개
//! - `Words(max)`: 순위 순서대로 본문 단어 수를 누적, 누적합이 max 이하일 때까지 포함
//!
//! 누적합은 삽입 순서가 아니라 순위 순서로 계산합니다.

use std::fmt;

use crate::error::{RagError, Result};

use super::model::{Candidate, Document};

/// 검색 예산
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// 최대 결과 개수
    Count(usize),
    /// 최대 누적 단어 수
    Words(usize),
}

impl SearchBudget {
    /// 저장소 호출 전 검증
    pub fn validate(&self) -> Result<()> {
        match self {
            SearchBudget::Count(0) => Err(RagError::invalid("limit must be greater than zero")),
            SearchBudget::Words(0) => {
                Err(RagError::invalid("maximum word count must be greater than zero"))
            }
            _ => Ok(()),
        }
    }

    /// 백엔드에 요청할 최대 후보 수 (words 모드는 제한 없음)
    pub fn candidate_limit(&self) -> Option<usize> {
        match self {
            SearchBudget::Count(n) => Some(*n),
            SearchBudget::Words(_) => None,
        }
    }
}

impl fmt::Display for SearchBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchBudget::Count(n) => write!(f, "count({})", n),
            SearchBudget::Words(n) => write!(f, "words({})", n),
        }
    }
}

/// 공백 기준 단어 수
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 질의 벡터 검증 (빈 벡터, 차원 불일치)
pub fn validate_query_vector(query: &[f32], dimension: usize) -> Result<()> {
    if query.is_empty() {
        return Err(RagError::invalid("query vector cannot be empty"));
    }
    if query.len() != dimension {
        return Err(RagError::invalid(format!(
            "query vector has {} dimensions, expected {}",
            query.len(),
            dimension
        )));
    }
    Ok(())
}

/// 거리 오름차순 정렬 후 순위 부여
///
/// 거리가 같으면 문서 ID (삽입 순서) 오름차순. NaN 거리는 맨 뒤.
pub fn rank_by_distance(scored: Vec<(Document, f32)>) -> Vec<Candidate> {
    let mut scored = scored;
    scored.sort_by(|(a, da), (b, db)| {
        da.total_cmp(db).then_with(|| a.id.cmp(&b.id))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (document, distance))| Candidate {
            document,
            rank: i + 1,
            distance,
        })
        .collect()
}

/// 순위가 매겨진 후보에 예산 적용
///
/// words 모드에서 1위 후보는 단독으로 예산을 넘어도 포함됩니다.
pub fn apply_budget(ranked: Vec<Candidate>, budget: SearchBudget) -> Vec<Candidate> {
    match budget {
        SearchBudget::Count(n) => ranked.into_iter().take(n).collect(),
        SearchBudget::Words(max) => {
            let mut cumulative = 0usize;
            ranked
                .into_iter()
                .enumerate()
                .take_while(|(i, candidate)| {
                    cumulative += word_count(&candidate.document.body);
                    *i == 0 || cumulative <= max
                })
                .map(|(_, candidate)| candidate)
                .collect()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
