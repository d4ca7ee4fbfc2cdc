//! Shared builders for stage and pipeline tests.

use std::collections::BTreeMap;

use lineup_shared::{
    CatalogVehicle, MatchMethod, MatchingResult, PriceEntry, SpecificationGroups, TierOutcome,
};

/// A price entry with the given model, package, and code.
pub fn entry(model: &str, package: &str, code: &str) -> PriceEntry {
    PriceEntry {
        model_code: code.into(),
        model: model.into(),
        package: package.into(),
        engine: String::new(),
        track: String::new(),
        starter: String::new(),
        display: String::new(),
        spring_option: String::new(),
        color: String::new(),
        normalized: Default::default(),
        price: 14_990.0,
        currency: "EUR".into(),
        model_year: 2025,
        brand: "SKI-DOO".into(),
        source_file: "pricelist.pdf".into(),
        source_page: 2,
        extraction_confidence: 0.95,
    }
}

/// A bare catalog vehicle.
pub fn vehicle(id: &str, name: &str, family: &str) -> CatalogVehicle {
    CatalogVehicle {
        id: id.into(),
        display_name: name.into(),
        model_family: family.into(),
        package_name: String::new(),
        specifications: Default::default(),
        source_catalog: "catalog.pdf".into(),
        source_page: 14,
        extraction_quality: 0.9,
    }
}

/// A catalog vehicle with a populated specification tree.
pub fn vehicle_with_specs(id: &str) -> CatalogVehicle {
    let mut v = vehicle(id, "SUMMIT X WITH EXPERT PACKAGE", "SUMMIT");
    v.specifications = SpecificationGroups {
        engine: BTreeMap::from([
            ("displacement".into(), "850".into()),
            ("fuel_system".into(), "e_tec_direct_injection".into()),
        ]),
        dimensions: BTreeMap::from([
            ("track_length".into(), "154".into()),
            ("ski_stance".into(), "36".into()),
        ]),
        suspension: BTreeMap::from([
            ("front_suspension".into(), "RAS 3".into()),
            ("rear_suspension".into(), "tMotion".into()),
        ]),
        features: vec!["mountain_strap".into(), "seat_lowering_kit".into()],
        colors: vec!["Black".into(), "Neo Yellow".into()],
        spring_options: vec!["PowderMax light track".into()],
    };
    v
}

/// A minimal matching result with the given confidence and review flag.
pub fn matching_result(code: &str, confidence: f64, review: bool) -> MatchingResult {
    MatchingResult {
        model_code: code.into(),
        tier1: TierOutcome {
            attempted: true,
            hit: confidence >= 0.95,
            confidence,
            evidence: Default::default(),
        },
        tier2: TierOutcome::default(),
        tier3: TierOutcome::default(),
        final_matching_method: if confidence >= 0.95 {
            MatchMethod::Exact
        } else {
            MatchMethod::None
        },
        overall_confidence: confidence,
        requires_human_review: review,
        quality_issues: vec![],
    }
}
