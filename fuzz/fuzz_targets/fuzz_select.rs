#![no_main]

use std::collections::{HashMap, HashSet};

use libfuzzer_sys::fuzz_target;
use rank_listings::candidate::{MmrCandidate, PropertyFeatures};
use rank_listings::diversity::{select_mmr_recommendations, MmrConfig};
use rank_listings::similarity::SimilarityWeights;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let k = data[0] as usize % 16;
    let max_per_zip = data[1] as usize % 4;
    let lambda = f64::from(data[2]) / 255.0;

    // 4 bytes per candidate: relevance, zip, units, vintage offset
    let pool: Vec<MmrCandidate> = data[3..]
        .chunks_exact(4)
        .enumerate()
        .map(|(i, c)| {
            let features = PropertyFeatures {
                zip: (c[1] % 5 != 0).then(|| format!("{}", c[1] % 5)),
                units: (c[2] != 0).then_some(u32::from(c[2])),
                vintage: (c[3] != 0).then_some(1900 + i32::from(c[3])),
                ..PropertyFeatures::default()
            };
            MmrCandidate::new(format!("p{i}"), f64::from(c[0]) / 255.0, features)
        })
        .collect();

    let config = MmrConfig::default()
        .with_k(k)
        .with_lambda(lambda)
        .with_max_per_zip(max_per_zip);
    let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());

    assert!(slate.len() <= k);

    let mut seen = HashSet::new();
    for c in &slate {
        assert!(seen.insert(c.property_id.clone()), "duplicate pick");
    }

    if pool.len() > k {
        let mut per_zip: HashMap<&str, usize> = HashMap::new();
        for c in &slate {
            if let Some(zip) = c.zip() {
                *per_zip.entry(zip).or_insert(0) += 1;
            }
        }
        assert!(per_zip.values().all(|&n| n <= max_per_zip), "zip cap exceeded");
    }
});
