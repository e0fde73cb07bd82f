//! 프롬프트 구성 - 검색 후보 + 사용자 질의
//!
//! 후보마다 ```json 블록 하나, 순위 순서 그대로, 질의는 항상 마지막입니다.

use crate::knowledge::Candidate;

const HEADER: &str = "Search results: \n";
const NO_RESULTS: &str = "No results \n\n";

/// 완성 요청용 프롬프트 생성
pub fn compose(candidates: &[Candidate], query: &str) -> String {
    let mut prompt = String::from(HEADER);

    if candidates.is_empty() {
        prompt.push_str(NO_RESULTS);
    }

    for candidate in candidates {
        prompt.push_str("```json\n");
        prompt.push_str(&render_document(candidate));
        prompt.push_str("\n```\n\n");
    }

    prompt.push_str(query);
    prompt
}

/// 모델이 인용할 수 있도록 id 포함
fn render_document(candidate: &Candidate) -> String {
    let doc = &candidate.document;
    serde_json::json!({
        "id": doc.id,
        "title": doc.title,
        "url": doc.url.as_deref().unwrap_or_default(),
        "body": doc.body,
    })
    .to_string()
}
