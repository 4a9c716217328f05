//! Canonical field mapping: apply a profile's mapping rules to a parsed
//! tree and produce a canonical record.
//!
//! Mapping never fails outright. Every rule lands in one of three places:
//! a typed field, the rule's declared default, or (for required rules) the
//! record's `missing_required` set. Optional rules with no value and no
//! default are simply absent.

pub mod coerce;
pub mod transform;

pub use coerce::{coerce, CoerceError};
pub use transform::apply_transform;

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{CanonicalRecord, FieldValue, RawTree};
use crate::profiles::CaseProfile;

/// Map a parsed tree into a canonical record using the profile's rules.
///
/// `version` starts at 1 and increments on reprocessing; `source_id` ties
/// the record back to its queue item.
pub fn map_record(
    tree: &RawTree,
    profile: &CaseProfile,
    source_id: Uuid,
    version: i64,
) -> CanonicalRecord {
    let mut fields: BTreeMap<String, FieldValue> = BTreeMap::new();
    let mut missing_required: BTreeSet<String> = BTreeSet::new();

    for rule in &profile.mappings {
        let mut values = tree.texts_at(&rule.source_path);
        if let Some(transform) = rule.transform {
            values = values
                .iter()
                .map(|value| apply_transform(transform, value))
                .collect();
        }

        match coerce(&values, rule.value_type) {
            Ok(value) => {
                fields.insert(rule.target_path.clone(), value);
            }
            Err(err) => {
                if let Some(default) = &rule.default {
                    debug!(
                        target = %rule.target_path,
                        %err,
                        "mapping fell back to declared default"
                    );
                    fields.insert(rule.target_path.clone(), default.clone());
                } else if rule.required {
                    warn!(
                        filename = %tree.filename,
                        target = %rule.target_path,
                        %err,
                        "required field could not be mapped"
                    );
                    missing_required.insert(rule.target_path.clone());
                }
            }
        }
    }

    CanonicalRecord {
        record_id: Uuid::new_v4(),
        source_id,
        version,
        profile_id: profile.profile_id.clone(),
        fields,
        missing_required,
        created_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}
