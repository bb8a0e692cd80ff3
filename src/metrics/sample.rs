use crate::extract::ExtractedRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

/// Records in a generated sample dataset
pub const SAMPLE_RECORD_COUNT: usize = 20;

const STREETS: &[&str] = &[
    "MAIN ST",
    "OAK AVE",
    "PINE ST",
    "MAPLE DR",
    "WASHINGTON ST",
    "FRANKLIN ST",
    "CHURCH ST",
    "SCHOOL ST",
    "PARK AVE",
    "ELM ST",
];
const PROPERTY_TYPES: &[&str] = &["SINGLE FAMILY", "MULTI-FAMILY", "COMMERCIAL", "VACANT LAND"];
const STYLES: &[&str] = &["COLONIAL", "CAPE", "RANCH", "CONTEMPORARY"];
const STORIES: &[&str] = &["1", "1.5", "2", "2.5"];
const ZONES: &[&str] = &["RESIDENTIAL", "COMMERCIAL", "INDUSTRIAL", "RURAL"];

/// Seed derived from the collector name, so one collector always gets the same dataset
fn seed_for(collector: &str) -> u64 {
    let digest = Sha256::digest(collector.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Formats an integer with thousands separators
fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn pick<'a>(rng: &mut StdRng, choices: &[&'a str]) -> &'a str {
    choices.choose(rng).copied().unwrap_or_default()
}

fn sale(
    rng: &mut StdRng,
    years: RangeInclusive<u32>,
    price: RangeInclusive<u64>,
    grantor: String,
    grantee: String,
) -> Value {
    json!({
        "sale_date": format!(
            "{}/{}/{}",
            rng.gen_range(1..=12u32),
            rng.gen_range(1..=28u32),
            rng.gen_range(years)
        ),
        "price": format!("${}", grouped(rng.gen_range(price))),
        "grantor": grantor,
        "grantee": grantee,
    })
}

/// Generates the synthetic property-assessment dataset for a collector
///
/// Every record carries `using_sample_data: true` in its metadata.
pub fn generate_sample_records(collector: &str) -> Vec<ExtractedRecord> {
    let mut rng = StdRng::seed_from_u64(seed_for(collector));

    (1..=SAMPLE_RECORD_COUNT)
        .map(|i| {
            let parcel_id = format!("SAMPLE-{:03}", i);
            let owner = format!("SAMPLE OWNER {}", i);

            let mut sales = vec![sale(
                &mut rng,
                2010..=2023,
                100_000..=700_000,
                format!("PREVIOUS OWNER {}-1", i),
                owner.clone(),
            )];
            if rng.gen_bool(0.5) {
                sales.push(sale(
                    &mut rng,
                    2000..=2009,
                    80_000..=400_000,
                    format!("PREVIOUS OWNER {}-2", i),
                    format!("PREVIOUS OWNER {}-1", i),
                ));
            }

            let content = json!({
                "parcel_id": parcel_id,
                "location": format!("{} {}", rng.gen_range(1..=999u32), pick(&mut rng, STREETS)),
                "owner": owner,
                "assessment": format!("${}", grouped(rng.gen_range(150_000..=750_000u64))),
                "land_area": format!("{} sq ft", grouped(rng.gen_range(5_000..=30_000u64))),
                "property_type": pick(&mut rng, PROPERTY_TYPES),
                "year_built": rng.gen_range(1900..=2020u32).to_string(),
                "building": {
                    "style": pick(&mut rng, STYLES),
                    "living_area": format!("{} sq ft", grouped(rng.gen_range(1_000..=3_500u64))),
                    "bedrooms": rng.gen_range(2..=5u32).to_string(),
                    "bathrooms": rng.gen_range(1..=4u32).to_string(),
                    "stories": pick(&mut rng, STORIES),
                },
                "land": {
                    "zone": pick(&mut rng, ZONES),
                    "frontage": format!("{} ft", rng.gen_range(50..=200u32)),
                    "depth": format!("{} ft", rng.gen_range(100..=500u32)),
                },
                "sales_history": sales,
            });

            ExtractedRecord::new(format!("{} (SAMPLE)", collector), "property_assessment", content)
                .with_metadata("using_sample_data", true)
                .with_metadata("sample_source", "generated")
                .with_metadata("data_source", "sample")
        })
        .collect()
}
