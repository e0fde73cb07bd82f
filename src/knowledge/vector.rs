//! 벡터 유틸리티 - 거리 계산 및 BLOB 직렬화

/// 벡터 임베딩 차원 기본값
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

// ============================================================================
// Distance
// ============================================================================

/// L2 (유클리드) 거리
///
/// 차원이 다르면 `f32::INFINITY`를 반환합니다 (순위 최하위).
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ============================================================================
// BLOB Encoding
// ============================================================================

/// 벡터를 little-endian f32 바이트열로 변환
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// little-endian f32 바이트열을 벡터로 변환
pub fn decode_vector(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("Corrupt vector blob: {} bytes is not a multiple of 4", bytes.len());
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
