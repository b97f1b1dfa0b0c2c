//! Fuzzy scoring of Kakao places against stored restaurants.
//!
//! `score = 0.5*name + 0.3*address + 0.2*geo`, each component in `[0, 1]`.
//! Unknown address or coordinates score a neutral 0.5.

use strsim::jaro_winkler;
use unicode_normalization::UnicodeNormalization;

use super::KakaoPlace;

pub const WEIGHT_NAME: f64 = 0.5;
pub const WEIGHT_ADDRESS: f64 = 0.3;
pub const WEIGHT_GEO: f64 = 0.2;

/// Minimum composite score for accepting a candidate.
pub const ACCEPT_THRESHOLD: f64 = 0.75;

const ADDRESS_TOKENS: usize = 4;
const GEO_FULL_SCORE_M: f64 = 100.0;
const GEO_ZERO_SCORE_M: f64 = 2_000.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// What we know about a stored restaurant.
#[derive(Debug, Clone)]
pub struct MatchTarget<'a> {
    pub name: &'a str,
    pub address: &'a str,
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub total: f64,
    pub name: f64,
    pub address: f64,
    pub geo: f64,
}

/// NFC, lower-case, alphanumerics only (Hangul counts as alphanumeric).
pub fn normalize_name(name: &str) -> String {
    name.nfc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

pub fn name_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_name(a), normalize_name(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        1.0
    } else if a.contains(&b) || b.contains(&a) {
        0.9
    } else {
        jaro_winkler(&a, &b)
    }
}

/// Share of the stored address's leading tokens found in either candidate address.
///
/// Tokens match on prefix either way so `서울` and `서울특별시` agree.
pub fn address_similarity(stored: &str, jibun: &str, road: &str) -> f64 {
    let tokens: Vec<String> = stored
        .split_whitespace()
        .take(ADDRESS_TOKENS)
        .map(|t| t.nfc().collect())
        .collect();
    if tokens.is_empty() || (jibun.trim().is_empty() && road.trim().is_empty()) {
        return 0.5;
    }
    let candidate: Vec<String> = jibun
        .split_whitespace()
        .chain(road.split_whitespace())
        .map(|t| t.nfc().collect())
        .collect();

    let matched = tokens
        .iter()
        .filter(|token| {
            candidate.iter().any(|c| {
                c == *token
                    || (token.chars().count() >= 2 && c.chars().count() >= 2
                        && (c.starts_with(token.as_str()) || token.starts_with(c.as_str())))
            })
        })
        .count();
    matched as f64 / tokens.len() as f64
}

/// Great-circle distance in meters.
pub fn haversine_m((lat1, lng1): (f64, f64), (lat2, lng2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// 1.0 within 100 m, falling linearly to 0 at 2 km.
pub fn geo_similarity(distance_m: Option<f64>) -> f64 {
    match distance_m {
        None => 0.5,
        Some(d) if d <= GEO_FULL_SCORE_M => 1.0,
        Some(d) if d >= GEO_ZERO_SCORE_M => 0.0,
        Some(d) => 1.0 - (d - GEO_FULL_SCORE_M) / (GEO_ZERO_SCORE_M - GEO_FULL_SCORE_M),
    }
}

pub fn score(target: &MatchTarget<'_>, place: &KakaoPlace) -> MatchScore {
    let name = name_similarity(target.name, &place.place_name);
    let address = if target.address.trim().is_empty() {
        0.5
    } else {
        address_similarity(target.address, &place.address_name, &place.road_address_name)
    };
    let distance = match (target.coordinates, place.coordinates()) {
        (Some(a), Some(b)) => Some(haversine_m(a, b)),
        _ => None,
    };
    let geo = geo_similarity(distance);
    MatchScore {
        total: WEIGHT_NAME * name + WEIGHT_ADDRESS * address + WEIGHT_GEO * geo,
        name,
        address,
        geo,
    }
}

/// Highest-scoring acceptable candidate, skipping place ids for which `taken` is true.
pub fn best_match<'p>(
    target: &MatchTarget<'_>,
    candidates: &'p [KakaoPlace],
    taken: impl Fn(&str) -> bool,
) -> Option<(&'p KakaoPlace, MatchScore)> {
    candidates
        .iter()
        .filter(|p| !taken(&p.id))
        .map(|p| (p, score(target, p)))
        .filter(|(_, s)| s.total >= ACCEPT_THRESHOLD)
        .max_by(|a, b| a.1.total.total_cmp(&b.1.total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, name: &str, jibun: &str, road: &str, lat: f64, lng: f64) -> KakaoPlace {
        KakaoPlace {
            id: id.into(),
            place_name: name.into(),
            category_name: String::new(),
            phone: String::new(),
            address_name: jibun.into(),
            road_address_name: road.into(),
            x: lng.to_string(),
            y: lat.to_string(),
        }
    }

    #[test]
    fn test_normalize_name_strips_spacing_and_punctuation() {
        assert_eq!(normalize_name(" 을지 면옥! "), "을지면옥");
        assert_eq!(normalize_name("BHC-Chicken"), "bhcchicken");
    }

    #[test]
    fn test_name_similarity_tiers() {
        assert_eq!(name_similarity("을지면옥", "을지 면옥"), 1.0);
        assert_eq!(name_similarity("을지면옥", "을지면옥 본점"), 0.9);
        let fuzzy = name_similarity("우래옥", "우레옥");
        assert!(fuzzy > 0.5 && fuzzy < 0.9);
        assert_eq!(name_similarity("", "x"), 0.0);
    }

    #[test]
    fn test_address_similarity_prefix_tokens() {
        let s = address_similarity("서울특별시 중구 충무로14길 2-1", "서울 중구 입정동 177", "서울 중구 충무로14길 2-1");
        assert_eq!(s, 1.0);
        let s = address_similarity("부산 해운대구 우동 1", "서울 중구 입정동 177", "");
        assert_eq!(s, 0.0);
        assert_eq!(address_similarity("", "서울", ""), 0.5);
        assert_eq!(address_similarity("서울 중구", "", ""), 0.5);
    }

    #[test]
    fn test_geo_similarity_decay() {
        assert_eq!(geo_similarity(None), 0.5);
        assert_eq!(geo_similarity(Some(50.0)), 1.0);
        assert_eq!(geo_similarity(Some(2_500.0)), 0.0);
        let mid = geo_similarity(Some(1_050.0));
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Seoul City Hall to Gwanghwamun, roughly 1 km
        let d = haversine_m((37.5663, 126.9779), (37.5759, 126.9769));
        assert!((1_000.0..1_150.0).contains(&d), "{d}");
        assert!(haversine_m((37.0, 127.0), (37.0, 127.0)) < 1e-6);
    }

    #[test]
    fn test_best_match_accepts_and_skips_taken() {
        let target = MatchTarget {
            name: "을지면옥",
            address: "서울 중구 충무로14길 2-1",
            coordinates: None,
        };
        let candidates = vec![
            place("1", "을지면옥", "서울 중구 입정동 177", "서울 중구 충무로14길 2-1", 37.566, 126.991),
            place("2", "을지로 골뱅이", "서울 중구 을지로3가", "", 37.566, 126.991),
        ];
        let (best, s) = best_match(&target, &candidates, |_| false).unwrap();
        assert_eq!(best.id, "1");
        assert!(s.total >= ACCEPT_THRESHOLD);

        assert!(best_match(&target, &candidates, |id| id == "1").is_none());
    }

    #[test]
    fn test_best_match_rejects_far_weak_candidates() {
        let target = MatchTarget {
            name: "할매순대국",
            address: "부산 사하구 하단동",
            coordinates: Some((35.10, 128.96)),
        };
        let candidates = vec![place("9", "순대국집", "서울 마포구", "", 37.55, 126.92)];
        assert!(best_match(&target, &candidates, |_| false).is_none());
    }
}
