use super::constraint::{
    BoundScope, Bounds, Confidence, Constraint, ConstraintScope, ConstraintSet, ConstraintType, ConstraintUnit,
};

/// Ceiling for sectors without a specific entry.
pub const DEFAULT_MAX_GROWTH: f64 = 0.25;

/// ISIC Rev. 4 section -> (growth ceiling, rationale).
const SECTOR_MAX_GROWTH: &[(&str, f64, &str)] = &[
    ("B", 0.08, "Mining and quarrying: extraction capacity is capital-intensive"),
    ("C", 0.12, "Manufacturing: industrial diversification capacity"),
    ("D", 0.10, "Utilities: grid and generation expansion"),
    ("E", 0.10, "Water and waste: infrastructure-bound"),
    ("F", 0.15, "Construction: project absorption bottleneck"),
    ("G", 0.20, "Wholesale and retail: relatively flexible"),
    ("H", 0.15, "Transport and storage: fleet and infrastructure limits"),
    ("I", 0.20, "Accommodation and food: tourism absorption"),
    ("J", 0.25, "ICT: scalable but talent-constrained"),
    ("K", 0.15, "Financial services: regulatory and talent limits"),
    ("L", 0.10, "Real estate: supply pipeline limits"),
    ("M", 0.20, "Professional services: talent-constrained"),
    ("N", 0.20, "Administrative services"),
];

pub fn sector_max_growth(sector_code: &str) -> Option<f64> {
    SECTOR_MAX_GROWTH
        .iter()
        .find(|(code, _, _)| *code == sector_code)
        .map(|(_, rate, _)| *rate)
}

/// Starting-point ramp constraints for an engagement: one per sector plus an
/// economy-wide 25% ceiling. Every entry is `Assumed`.
pub fn default_ramp_constraints(sector_codes: &[String]) -> ConstraintSet {
    let mut constraints: Vec<Constraint> = sector_codes
        .iter()
        .map(|code| {
            let (rate, rationale) = match SECTOR_MAX_GROWTH.iter().find(|(c, _, _)| *c == code.as_str()) {
                Some((_, rate, why)) => (*rate, why.to_string()),
                None => (
                    DEFAULT_MAX_GROWTH,
                    format!(
                        "Sector {}: no sector-specific data, using the general limit of {:.0}%",
                        code,
                        DEFAULT_MAX_GROWTH * 100.0
                    ),
                ),
            };
            Constraint::ramp(code.clone(), rate)
                .with_bound_scope(BoundScope::AbsoluteTotal)
                .with_confidence(Confidence::Assumed)
                .with_rationale(rationale)
        })
        .collect();

    constraints.push(
        Constraint::new(
            ConstraintType::Ramp,
            ConstraintScope::economy_proportional(),
            Bounds::growth(DEFAULT_MAX_GROWTH),
            ConstraintUnit::GrowthRate,
        )
        .with_bound_scope(BoundScope::AbsoluteTotal)
        .with_confidence(Confidence::Assumed)
        .with_rationale("General limit: no sector grows faster than 25% in a single period"),
    );

    ConstraintSet::new("Default ramp constraints (assumed)", constraints)
}
