//! Edge cases: degenerate pools, missing data, extreme parameters.

use rank_listings::candidate::{MmrCandidate, Property, PropertyFeatures};
use rank_listings::diversity::{select_mmr_recommendations, select_scored, try_select, MmrConfig};
use rank_listings::geo::GeoPoint;
use rank_listings::market::MarketStatistics;
use rank_listings::scoring::{BuyBox, BuyBoxScorer, RelevanceModel};
use rank_listings::similarity::{similarity, SimilarityWeights};
use rank_listings::RecommendError;

fn zipped(id: &str, relevance: f64, zip: Option<&str>) -> MmrCandidate {
    MmrCandidate::new(
        id,
        relevance,
        PropertyFeatures {
            zip: zip.map(str::to_string),
            ..PropertyFeatures::default()
        },
    )
}

#[test]
fn test_k_zero_selects_nothing() {
    let pool: Vec<MmrCandidate> = (0..5)
        .map(|i| zipped(&format!("p{i}"), 0.5, Some("1")))
        .collect();
    let slate = select_mmr_recommendations(
        &pool,
        &MmrConfig::default().with_k(0),
        &SimilarityWeights::default(),
    );
    assert!(slate.is_empty());
}

#[test]
fn test_pool_exactly_k_is_untouched() {
    let pool: Vec<MmrCandidate> = (0..9)
        .map(|i| zipped(&format!("p{i}"), f64::from(i) / 10.0, Some("90210")))
        .collect();
    let slate = select_mmr_recommendations(&pool, &MmrConfig::default(), &SimilarityWeights::default());
    // no reordering and no ZIP cap
    assert_eq!(slate, pool);
}

#[test]
fn test_pool_of_k_plus_one_is_capped() {
    let pool: Vec<MmrCandidate> = (0..10)
        .map(|i| zipped(&format!("p{i}"), 0.5, Some("90210")))
        .collect();
    let slate = select_mmr_recommendations(&pool, &MmrConfig::default(), &SimilarityWeights::default());
    assert_eq!(slate.len(), 2);
}

#[test]
fn test_identical_candidates() {
    let features = PropertyFeatures {
        zip: Some("78701".into()),
        coordinates: Some(GeoPoint::new(30.27, -97.74)),
        price_per_unit: Some(110_000.0),
        units: Some(8),
        vintage: Some(1978),
        property_type: Some("Fourplex".into()),
        ..PropertyFeatures::default()
    };
    let a = MmrCandidate::new("a", 0.9, features.clone());
    let b = MmrCandidate::new("b", 0.9, features);
    let s = similarity(&a, &b, 5.0, &SimilarityWeights::default());
    assert!((s - 1.0).abs() < 1e-9);
}

#[test]
fn test_all_fields_missing() {
    let a = PropertyFeatures::default();
    let s = similarity(&a, &a, 5.0, &SimilarityWeights::default());
    // neutral defaults everywhere, well below identical
    assert!(s > 0.0 && s < 0.5);
}

#[test]
fn test_half_coordinates_ignored() {
    let p = Property {
        latitude: Some(30.0),
        ..Property::new("a")
    };
    assert!(p.coordinates().is_none());
}

#[test]
fn test_non_finite_relevance_does_not_panic() {
    let mut pool: Vec<MmrCandidate> = (0..12)
        .map(|i| zipped(&format!("p{i}"), 0.5, Some(format!("{i}").as_str())))
        .collect();
    pool[3].relevance = f64::NAN;
    pool[4].relevance = f64::INFINITY;
    let slate = select_scored(&pool, &MmrConfig::default(), &SimilarityWeights::default());
    assert!(slate.len() <= 9);
    assert_eq!(slate[0].candidate.property_id, "p4");
}

#[test]
fn test_extreme_geo_scale() {
    let a = PropertyFeatures {
        coordinates: Some(GeoPoint::new(30.0, -97.0)),
        ..PropertyFeatures::default()
    };
    let b = PropertyFeatures {
        coordinates: Some(GeoPoint::new(31.0, -97.0)),
        ..PropertyFeatures::default()
    };
    let w = SimilarityWeights::default();
    for scale in [1e-9, 1e-3, 1.0, 1e6, 1e12] {
        let s = similarity(&a, &b, scale, &w);
        assert!((0.0..=1.0).contains(&s), "scale {scale} gave {s}");
    }
}

#[test]
fn test_try_select_reports_config_errors() {
    let pool = vec![zipped("a", 0.5, None)];
    let w = SimilarityWeights::default();

    let err = try_select(&pool, &MmrConfig::default().with_geo_scale_km(-1.0), &w).unwrap_err();
    assert!(matches!(err, RecommendError::InvalidGeoScale { .. }));
    assert!(err.to_string().contains("-1"));

    let bad = SimilarityWeights {
        vintage: f64::NAN,
        ..w
    };
    let err = try_select(&pool, &MmrConfig::default(), &bad).unwrap_err();
    assert!(matches!(err, RecommendError::InvalidWeight { dimension: "vintage", .. }));
}

#[test]
fn test_bare_listing_scores_neutral() {
    let scorer = BuyBoxScorer::new(2025);
    let result = scorer.score(
        &Property::new("bare"),
        &BuyBox::default(),
        &MarketStatistics::fallback(),
    );
    assert!((0.0..=1.0).contains(&result.score));
    assert_eq!(result.reasoning, vec!["Unit count unavailable"]);
}

#[test]
fn test_garbage_numbers_score_in_range() {
    let scorer = BuyBoxScorer::new(2025);
    let weird = Property {
        listing_price: Some(-5.0),
        estimated_equity: Some(f64::INFINITY),
        units_count: Some(u32::MAX),
        year_built: Some(i32::MIN),
        years_owned: Some(f64::NAN),
        ..Property::new("weird")
    };
    let bb = BuyBox {
        price_min: Some(100.0),
        price_max: Some(50.0), // inverted
        units_min: Some(10),
        units_max: Some(5),
        year_min: Some(2020),
        year_max: Some(1900),
        ..BuyBox::default()
    };
    let result = scorer.score(&weird, &bb, &MarketStatistics::fallback());
    assert!((0.0..=1.0).contains(&result.score), "got {}", result.score);
}
