#![no_main]

use libfuzzer_sys::fuzz_target;
use rank_listings::candidate::PropertyFeatures;
use rank_listings::geo::GeoPoint;
use rank_listings::similarity::{similarity, SimilarityWeights};

const TYPES: [&str; 5] = ["Duplex", "Apartment", "Condo", "Multi-Family", ""];

fn f64_at(data: &[u8], offset: usize) -> Option<f64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(f64::from_le_bytes(bytes.try_into().ok()?))
}

/// Decode one listing from 40 bytes; any bit pattern is accepted.
fn features(data: &[u8]) -> Option<PropertyFeatures> {
    let flags = *data.first()?;
    let lat = f64_at(data, 1)?;
    let lon = f64_at(data, 9)?;
    let ppu = f64_at(data, 17)?;
    let units = u32::from_le_bytes(data.get(25..29)?.try_into().ok()?);
    let vintage = i32::from_le_bytes(data.get(29..33)?.try_into().ok()?);
    let zip = data.get(33).copied()?;
    let ty = data.get(34).copied()?;

    Some(PropertyFeatures {
        zip: (flags & 1 != 0).then(|| format!("{}", zip % 4)),
        city: (flags & 2 != 0).then(|| "Austin".to_string()),
        state: (flags & 4 != 0).then(|| "TX".to_string()),
        coordinates: (flags & 8 != 0).then_some(GeoPoint::new(lat, lon)),
        price_per_unit: (flags & 16 != 0).then_some(ppu),
        units: (flags & 32 != 0).then_some(units),
        vintage: (flags & 64 != 0).then_some(vintage),
        property_type: (flags & 128 != 0).then(|| TYPES[ty as usize % TYPES.len()].to_string()),
    })
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 80 {
        return;
    }
    let (Some(a), Some(b)) = (features(&data[..40]), features(&data[40..80])) else {
        return;
    };
    let scale = f64_at(data, 80).unwrap_or(5.0);
    if !scale.is_finite() || scale <= 0.0 {
        return;
    }

    let weights = SimilarityWeights::default();
    let ab = similarity(&a, &b, scale, &weights);
    let ba = similarity(&b, &a, scale, &weights);

    assert!((0.0..=1.0).contains(&ab), "similarity out of range: {ab}");
    assert_eq!(ab.to_bits(), ba.to_bits(), "similarity not symmetric");
});
