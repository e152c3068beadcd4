use crate::providers::AddressCandidate;
use regex::Regex;
use std::collections::HashSet;

lazy_static::lazy_static! {
    // Administrative prefixes that users write in front of the actual name
    static ref LOCALITY_PREFIX: Regex =
        Regex::new(r"\b(?:kelurahan|kecamatan|desa)\b|\b(?:kel|kec|ds)\.").unwrap();
}

/// Weight of the locality (kelurahan) match in the combined score
pub const LOCALITY_WEIGHT: f64 = 0.6;

/// Weight of the sub-district (kecamatan) match in the combined score
pub const SUBDISTRICT_WEIGHT: f64 = 0.4;

/// Score awarded when one normalized name contains the other
pub const SUBSTRING_SCORE: f64 = 0.8;

/// Normalizes an administrative name for comparison:
/// lowercase, administrative prefixes removed, whitespace collapsed
pub fn normalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let stripped = LOCALITY_PREFIX.replace_all(&lower, " ");

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compares an observed name against the expected one, returning a value in [0, 1]
///
/// Equal names score 1.0 and containment scores a flat 0.8 regardless of how
/// much of the longer name is covered. Everything else falls back to the
/// Jaccard index of the word sets.
pub fn similarity(observed: &str, expected: &str) -> f64 {
    let observed = normalize(observed);
    let expected = normalize(expected);

    if observed.is_empty() || expected.is_empty() {
        return 0.0;
    }

    if observed == expected {
        return 1.0;
    }

    if observed.contains(&expected) || expected.contains(&observed) {
        return SUBSTRING_SCORE;
    }

    let observed_tokens: HashSet<&str> = observed.split_whitespace().collect();
    let expected_tokens: HashSet<&str> = expected.split_whitespace().collect();

    let union = observed_tokens.union(&expected_tokens).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = observed_tokens.intersection(&expected_tokens).count();

    intersection as f64 / union as f64
}

/// Combines locality and sub-district agreement into a confidence score
///
/// A term only contributes when both the expected and the observed value are
/// present. Missing terms are not redistributed, so a perfect locality-only
/// match tops out at 0.6.
pub fn score(
    candidate: &AddressCandidate,
    expected_locality: Option<&str>,
    expected_subdistrict: Option<&str>,
) -> f64 {
    let mut total = 0.0;

    if let (Some(expected), Some(observed)) = (expected_locality, candidate.locality.as_deref()) {
        total += LOCALITY_WEIGHT * similarity(observed, expected);
    }

    if let (Some(expected), Some(observed)) =
        (expected_subdistrict, candidate.sub_district.as_deref())
    {
        total += SUBDISTRICT_WEIGHT * similarity(observed, expected);
    }

    total.clamp(0.0, 1.0)
}
