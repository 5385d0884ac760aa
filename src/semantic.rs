use sha2::{Digest, Sha256};

pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const MIN_EMBEDDING_DIM: usize = 8;

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Deterministic feature-hashing embedding used by the offline backend.
///
/// Features are lowercase terms plus adjacent-term pairs. Catalog identifiers such as
/// `CAPEC-651` or `CWE-319` stay a single term so they only match each other.
pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let width = dimensions.max(MIN_EMBEDDING_DIM);
    let mut buckets = vec![0_f32; width];

    let terms = terms(payload);
    let pairs = terms
        .windows(2)
        .map(|pair| format!("pair:{}+{}", pair[0], pair[1]));
    let features = terms.iter().map(|term| format!("term:{term}")).chain(pairs);

    for feature in features {
        let bits = feature_bits(&feature);
        let slot = (bits % width as u64) as usize;
        let magnitude = 1.0 + ((bits >> 40) & 0xFF) as f32 / 255.0;
        if bits >> 63 == 0 {
            buckets[slot] += magnitude;
        } else {
            buckets[slot] -= magnitude;
        }
    }

    let length = norm(&buckets);
    if length > 0.0 {
        let length = length as f32;
        buckets.iter_mut().for_each(|value| *value /= length);
    }
    buckets
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.is_empty() || left.len() != right.len() {
        return 0.0;
    }

    let denominator = norm(left) * norm(right);
    if denominator == 0.0 {
        return 0.0;
    }

    let dot = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum::<f64>();
    dot / denominator
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.checked_mul(4)? {
        return None;
    }

    blob.chunks_exact(4)
        .map(|bytes| bytes.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

// Persisted vectors must stay identical across toolchains, so no std hasher here.
fn feature_bits(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

fn terms(payload: &str) -> Vec<String> {
    let mut terms = Vec::<String>::new();
    let mut current = String::new();
    let mut chars = payload.chars().peekable();

    while let Some(character) = chars.next() {
        if character.is_ascii_alphanumeric() {
            current.push(character.to_ascii_lowercase());
            continue;
        }

        // Join `letters-digits` so catalog identifiers survive as one term.
        let joins_identifier = character == '-'
            && !current.is_empty()
            && current.chars().all(|c| c.is_ascii_alphabetic())
            && chars.peek().is_some_and(char::is_ascii_digit);
        if joins_identifier {
            current.push('-');
            continue;
        }

        if !current.is_empty() {
            terms.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

fn norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|value| f64::from(*value).powi(2))
        .sum::<f64>()
        .sqrt()
}
