//! 저장소 파티션 키 생성
//!
//! 정규 이미지 식별자는 `/`, `:`, `@`를 포함하므로 그대로 키로 쓸 수 없습니다.
//! 허용되지 않는 문자를 `_`로 치환한 뒤 원본의 SHA-256 앞부분을 덧붙여
//! 서로 다른 식별자가 같은 파티션을 공유하지 않도록 합니다.

use sha2::{Digest, Sha256};

/// 파티션 키에 붙는 digest 길이 (hex 문자 수)
const DIGEST_SUFFIX_LEN: usize = 12;

/// 사람이 읽을 수 있는 부분의 최대 길이
const MAX_READABLE_LEN: usize = 180;

/// 정규 식별자로부터 파티션 키를 생성합니다.
///
/// 결과는 `[A-Za-z0-9._-]`만 포함하며 같은 입력에 대해 항상 같습니다.
pub fn partition_key(canonical_id: &str) -> String {
    let readable: String = canonical_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_READABLE_LEN)
        .collect();
    let readable = readable.trim_matches('.');
    let readable = if readable.is_empty() {
        "unknown"
    } else {
        readable
    };

    let digest = hex::encode(Sha256::digest(canonical_id.as_bytes()));
    format!("{readable}-{}", &digest[..DIGEST_SUFFIX_LEN])
}
