//! 인용 마커 해석
//!
//! `[citation]<id>[/citation]` → `[title](url)`.
//! 후보에 없는 id는 마커를 그대로 둡니다.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::knowledge::Candidate;

const CITATION_PATTERN: &str = r"\[citation\](\d+)\[/citation\]";

fn citation_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CITATION_PATTERN).ok()).as_ref()
}

/// 생성 텍스트의 인용 마커를 마크다운 링크로 치환
pub fn resolve(text: &str, candidates: &[Candidate]) -> String {
    let Some(re) = citation_regex() else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &Captures| {
        let marker = caps[0].to_string();
        let Ok(id) = caps[1].parse::<i64>() else {
            return marker;
        };

        match candidates.iter().find(|c| c.id() == id) {
            Some(c) => format!(
                "[{}]({})",
                escape_link_text(&c.document.title),
                escape_link_url(c.document.url.as_deref().unwrap_or_default())
            ),
            None => {
                tracing::debug!("Citation {} not in candidate set", id);
                marker
            }
        }
    })
    .into_owned()
}

/// 링크 텍스트의 `\`, `[`, `]` 앞에 백슬래시 추가
///
/// 치환 결과가 다시 마커로 매칭되지 않습니다.
fn escape_link_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 링크 URL의 괄호/대괄호 퍼센트 인코딩
fn escape_link_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '(' => escaped.push_str("%28"),
            ')' => escaped.push_str("%29"),
            '[' => escaped.push_str("%5B"),
            ']' => escaped.push_str("%5D"),
            _ => escaped.push(c),
        }
    }
    escaped
}
