//! Field-level conflict detection across source-attributed records

use super::{ConflictContext, ConflictingValue};
use crate::types::EpisodeMetadata;
use std::collections::BTreeSet;

/// Fields on which `records` disagree.
///
/// A field is in conflict when at least two records hold a valid value for
/// it and those values are not all equal. Output is ordered by field name;
/// candidates keep the order of `records`.
pub fn identify_field_conflicts(records: &[EpisodeMetadata]) -> Vec<ConflictContext> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    names
        .into_iter()
        .filter_map(|name| {
            let candidates: Vec<ConflictingValue> = records
                .iter()
                .filter(|r| r.is_field_valid(name))
                .filter_map(|r| {
                    r.field(name).map(|value| ConflictingValue {
                        source: r.data_source.clone(),
                        value: value.clone(),
                        confidence: r.confidence_score,
                        timestamp: r.last_updated,
                        reliability: r.confidence_score,
                    })
                })
                .collect();

            let disagree = candidates.len() >= 2
                && candidates.iter().any(|c| c.value != candidates[0].value);
            disagree.then(|| ConflictContext {
                episode_id: first.episode_id.clone(),
                field_name: name.to_string(),
                candidates,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{fields, MEMORY_ALPHA_SOURCE_ID, TMDB_SOURCE_ID};
    use serde_json::json;

    fn record(source: &str, confidence: f64, values: &[(&str, serde_json::Value)]) -> EpisodeMetadata {
        let mut record = EpisodeMetadata::new("ent_s1_e01", source, confidence);
        for (name, value) in values {
            record.set_field(name, Some(value.clone()), source);
        }
        record
    }

    #[test]
    fn test_disagreeing_field_is_reported() {
        let records = vec![
            record(
                MEMORY_ALPHA_SOURCE_ID,
                0.9,
                &[(fields::TITLE, json!("Broken Bow")), (fields::STARDATE, json!("1207.3"))],
            ),
            record(
                TMDB_SOURCE_ID,
                0.85,
                &[(fields::TITLE, json!("Broken Bow (1)")), (fields::DIRECTOR, json!("James L. Conway"))],
            ),
        ];

        let conflicts = identify_field_conflicts(&records);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.field_name, fields::TITLE);
        assert_eq!(conflict.episode_id, "ent_s1_e01");
        assert_eq!(conflict.candidates[0].source, MEMORY_ALPHA_SOURCE_ID);
        assert_eq!(conflict.candidates[1].confidence, 0.85);
        assert_eq!(conflict.candidates[1].reliability, 0.85);
    }

    #[test]
    fn test_agreeing_and_single_values_are_not_conflicts() {
        let records = vec![
            record(MEMORY_ALPHA_SOURCE_ID, 0.9, &[(fields::TITLE, json!("Broken Bow"))]),
            record(TMDB_SOURCE_ID, 0.85, &[(fields::TITLE, json!("Broken Bow"))]),
            record("fan-wiki", 0.3, &[(fields::TITLE, json!("")), (fields::RATING, json!(7.5))]),
        ];
        assert!(identify_field_conflicts(&records).is_empty());
        assert!(identify_field_conflicts(&[]).is_empty());
    }

    #[test]
    fn test_conflicts_ordered_by_field_name() {
        let records = vec![
            record("a", 0.5, &[(fields::WRITER, json!("x")), (fields::AIR_DATE, json!("2001-09-26"))]),
            record("b", 0.5, &[(fields::WRITER, json!("y")), (fields::AIR_DATE, json!("2001-09-27"))]),
        ];
        let names: Vec<_> = identify_field_conflicts(&records)
            .into_iter()
            .map(|c| c.field_name)
            .collect();
        assert_eq!(names, vec![fields::AIR_DATE, fields::WRITER]);
    }
}
