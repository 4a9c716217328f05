//! Built-in profile registry.
//!
//! Seven parse cases, declared in tie-break order. Paths follow the LIDC
//! annotation convention: a response header, one or more reading sessions,
//! unblinded nodule reads with nine coded characteristics, and optional
//! free-text nodes (impression, reason-for-missing, response description).

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{FieldValue, SegmentKind, ValueType};

use super::{CaseProfile, FieldSpec, MappingRule, SignalWeights, Transform};

pub const REGISTRY_VERSION: &str = "1.0.0";

/// The nine coded nodule characteristics, in LIDC declaration order.
pub const CHARACTERISTICS: [&str; 9] = [
    "subtlety",
    "internalStructure",
    "calcification",
    "sphericity",
    "margin",
    "lobulation",
    "spiculation",
    "texture",
    "malignancy",
];

/// Ordered, versioned collection of case profiles.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    version: String,
    profiles: Vec<CaseProfile>,
}

impl ProfileRegistry {
    pub fn new(version: impl Into<String>, profiles: Vec<CaseProfile>) -> Self {
        Self {
            version: version.into(),
            profiles,
        }
    }

    /// The built-in registry. Built once; immutable reference data.
    pub fn builtin() -> &'static ProfileRegistry {
        &BUILTIN
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, profile_id: &str) -> Option<&CaseProfile> {
        self.profiles.iter().find(|p| p.profile_id == profile_id)
    }

    /// Declaration order. The detector breaks score ties by this order.
    pub fn iter(&self) -> impl Iterator<Item = &CaseProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

static BUILTIN: LazyLock<ProfileRegistry> = LazyLock::new(|| {
    ProfileRegistry::new(
        REGISTRY_VERSION,
        vec![
            complete_attributes(),
            lidc_single_session(),
            lidc_multi_session(2),
            lidc_multi_session(3),
            lidc_multi_session(4),
            with_reason_partial(),
            core_attributes_only(),
        ],
    )
});

fn patterns(list: &[&str]) -> Vec<Regex> {
    list.iter()
        .map(|p| Regex::new(p).expect("builtin filename pattern must compile"))
        .collect()
}

fn characteristic_path(name: &str) -> String {
    format!("readingSession/unblindedReadNodule/characteristics/{name}")
}

// ── shared field blocks ────────────────────────────────────────────────────

fn header_core_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("ResponseHeader/Version", 1.0),
        FieldSpec::new("ResponseHeader/MessageId", 1.0),
        FieldSpec::new("ResponseHeader/DateRequest", 1.0),
        FieldSpec::new("ResponseHeader/TimeRequest", 1.0),
        FieldSpec::new("ResponseHeader/StudyInstanceUID", 2.0),
        FieldSpec::new("ResponseHeader/SeriesInstanceUid", 2.0),
    ]
}

fn characteristic_fields(importance: f32) -> Vec<FieldSpec> {
    CHARACTERISTICS
        .iter()
        .map(|name| FieldSpec::new(characteristic_path(name), importance))
        .collect()
}

// ── shared mapping blocks ──────────────────────────────────────────────────

fn header_core_mappings() -> Vec<MappingRule> {
    vec![
        MappingRule::new(
            "ResponseHeader/Version",
            "study/version",
            ValueType::Text,
            SegmentKind::Mixed,
        )
        .with_transform(Transform::Trim),
        MappingRule::new(
            "ResponseHeader/MessageId",
            "study/message_id",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "ResponseHeader/DateRequest",
            "study/requested_date",
            ValueType::Date,
            SegmentKind::Mixed,
        )
        .with_transform(Transform::NormalizeDate),
        MappingRule::new(
            "ResponseHeader/TimeRequest",
            "study/requested_time",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "ResponseHeader/StudyInstanceUID",
            "study/study_instance_uid",
            ValueType::Text,
            SegmentKind::Mixed,
        )
        .required()
        .with_transform(Transform::Trim),
        MappingRule::new(
            "ResponseHeader/SeriesInstanceUid",
            "study/series_instance_uid",
            ValueType::Text,
            SegmentKind::Mixed,
        )
        .required()
        .with_transform(Transform::Trim),
    ]
}

fn characteristic_mappings_array() -> Vec<MappingRule> {
    CHARACTERISTICS
        .iter()
        .map(|name| {
            MappingRule::new(
                characteristic_path(name),
                format!("nodules/characteristics/{}", snake(name)),
                ValueType::IntegerArray,
                SegmentKind::Quantitative,
            )
        })
        .collect()
}

fn characteristic_mappings_single() -> Vec<MappingRule> {
    CHARACTERISTICS
        .iter()
        .map(|name| {
            let rule = MappingRule::new(
                characteristic_path(name),
                format!("nodule/characteristics/{}", snake(name)),
                ValueType::Integer,
                SegmentKind::Quantitative,
            );
            if *name == "malignancy" {
                rule.required()
            } else {
                rule
            }
        })
        .collect()
}

fn session_array_mappings() -> Vec<MappingRule> {
    vec![
        MappingRule::new(
            "readingSession/annotationVersion",
            "sessions/annotation_versions",
            ValueType::TextArray,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/servicingRadiologistID",
            "sessions/radiologist_ids",
            ValueType::TextArray,
            SegmentKind::Mixed,
        )
        .required(),
        MappingRule::new(
            "readingSession/unblindedReadNodule/noduleID",
            "nodules/ids",
            ValueType::TextArray,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/unblindedReadNodule/roi/imageZposition",
            "nodules/roi/image_z_positions",
            ValueType::FloatArray,
            SegmentKind::Quantitative,
        ),
        MappingRule::new(
            "readingSession/unblindedReadNodule/roi/imageSOP_UID",
            "nodules/roi/image_sop_uids",
            ValueType::TextArray,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/impression",
            "narrative/impression",
            ValueType::Text,
            SegmentKind::Qualitative,
        ),
    ]
}

fn lidc_keyword_terms() -> Vec<String> {
    ["nodule", "malignancy", "spiculation", "margin", "calcification"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// ── profiles, in declaration (tie-break) order ─────────────────────────────

fn complete_attributes() -> CaseProfile {
    let mut expected = header_core_fields();
    expected.extend([
        FieldSpec::new("ResponseHeader/TaskDescription", 1.0),
        FieldSpec::new("ResponseHeader/DateService", 1.0),
        FieldSpec::new("ResponseHeader/TimeService", 1.0),
        FieldSpec::new("ResponseHeader/ResponseDescription", 1.0),
        FieldSpec::new("readingSession", 2.0),
        FieldSpec::new("readingSession/annotationVersion", 1.0),
        FieldSpec::new("readingSession/servicingRadiologistID", 1.5),
        FieldSpec::new("readingSession/unblindedReadNodule", 2.0),
        FieldSpec::new("readingSession/unblindedReadNodule/noduleID", 1.0),
        FieldSpec::new("readingSession/unblindedReadNodule/roi/imageZposition", 1.0),
        FieldSpec::new("readingSession/unblindedReadNodule/roi/imageSOP_UID", 1.0),
    ]);
    expected.extend(characteristic_fields(1.5));

    let mut mappings = header_core_mappings();
    mappings.extend([
        MappingRule::new(
            "ResponseHeader/TaskDescription",
            "study/task",
            ValueType::Text,
            SegmentKind::Qualitative,
        )
        .with_default(FieldValue::Text("Second unblinded read".into())),
        MappingRule::new(
            "ResponseHeader/DateService",
            "study/service_date",
            ValueType::Date,
            SegmentKind::Mixed,
        )
        .with_transform(Transform::NormalizeDate),
        MappingRule::new(
            "ResponseHeader/TimeService",
            "study/service_time",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "ResponseHeader/ResponseDescription",
            "narrative/response_description",
            ValueType::Text,
            SegmentKind::Qualitative,
        ),
    ]);
    mappings.extend(session_array_mappings());
    mappings.extend(characteristic_mappings_array());

    CaseProfile {
        profile_id: "complete_attributes".into(),
        version: "1.0.0".into(),
        description: "Full header, reading sessions, and all nine nodule characteristics".into(),
        filename_patterns: patterns(&["(?i)complete"]),
        expected_fields: expected,
        keyword_terms: lidc_keyword_terms(),
        weights: SignalWeights::default(),
        mappings,
    }
}

fn lidc_single_session() -> CaseProfile {
    let mut expected = header_core_fields();
    expected.push(FieldSpec::counted("readingSession", 3.0, 1, Some(1)));
    expected.extend([
        FieldSpec::new("readingSession/annotationVersion", 1.0),
        FieldSpec::new("readingSession/servicingRadiologistID", 1.5),
        FieldSpec::new("readingSession/unblindedReadNodule", 2.0),
        FieldSpec::new("readingSession/unblindedReadNodule/noduleID", 1.0),
    ]);
    expected.extend(characteristic_fields(1.5));

    let mut mappings = header_core_mappings();
    mappings.extend([
        MappingRule::new(
            "readingSession/annotationVersion",
            "session/annotation_version",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/servicingRadiologistID",
            "session/radiologist_id",
            ValueType::Text,
            SegmentKind::Mixed,
        )
        .required(),
        MappingRule::new(
            "readingSession/unblindedReadNodule/noduleID",
            "nodule/id",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/unblindedReadNodule/roi/imageZposition",
            "nodule/roi/image_z_position",
            ValueType::Float,
            SegmentKind::Quantitative,
        ),
        MappingRule::new(
            "readingSession/unblindedReadNodule/roi/imageSOP_UID",
            "nodule/roi/image_sop_uid",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/impression",
            "narrative/impression",
            ValueType::Text,
            SegmentKind::Qualitative,
        ),
    ]);
    mappings.extend(characteristic_mappings_single());

    CaseProfile {
        profile_id: "lidc_single_session".into(),
        version: "1.0.0".into(),
        description: "One reading session with a fully characterized nodule read".into(),
        filename_patterns: patterns(&["(?i)lidc", "(?i)single"]),
        expected_fields: expected,
        keyword_terms: lidc_keyword_terms(),
        weights: SignalWeights::default(),
        mappings,
    }
}

fn lidc_multi_session(sessions: usize) -> CaseProfile {
    let mut expected = header_core_fields();
    expected.push(FieldSpec::counted(
        "readingSession",
        3.0,
        sessions,
        Some(sessions),
    ));
    expected.extend([
        FieldSpec::new("readingSession/annotationVersion", 1.0),
        FieldSpec::new("readingSession/servicingRadiologistID", 1.5),
        FieldSpec::new("readingSession/unblindedReadNodule", 2.0),
        FieldSpec::new("readingSession/unblindedReadNodule/noduleID", 1.0),
    ]);
    expected.extend(characteristic_fields(1.0));

    let mut mappings = header_core_mappings();
    mappings.extend(session_array_mappings());
    mappings.extend(characteristic_mappings_array());

    CaseProfile {
        profile_id: format!("lidc_multi_session_{sessions}"),
        version: "1.0.0".into(),
        description: format!("{sessions} independent reading sessions over one series"),
        filename_patterns: patterns(&["(?i)lidc", "(?i)multi"]),
        expected_fields: expected,
        keyword_terms: lidc_keyword_terms(),
        weights: SignalWeights::default(),
        mappings,
    }
}

fn with_reason_partial() -> CaseProfile {
    let mut expected = header_core_fields();
    expected.extend([
        FieldSpec::new("readingSession", 2.0),
        FieldSpec::new("readingSession/servicingRadiologistID", 1.0),
        FieldSpec::new("readingSession/reasonForMissing", 3.0),
        FieldSpec::new(characteristic_path("subtlety"), 1.0),
        FieldSpec::new(characteristic_path("malignancy"), 1.0),
    ]);

    let mut mappings = header_core_mappings();
    mappings.extend([
        MappingRule::new(
            "readingSession/servicingRadiologistID",
            "session/radiologist_id",
            ValueType::Text,
            SegmentKind::Mixed,
        ),
        MappingRule::new(
            "readingSession/reasonForMissing",
            "narrative/reason_for_missing",
            ValueType::Text,
            SegmentKind::Qualitative,
        )
        .required(),
        MappingRule::new(
            characteristic_path("subtlety"),
            "nodule/characteristics/subtlety",
            ValueType::Integer,
            SegmentKind::Quantitative,
        ),
        MappingRule::new(
            characteristic_path("malignancy"),
            "nodule/characteristics/malignancy",
            ValueType::Integer,
            SegmentKind::Quantitative,
        ),
    ]);

    CaseProfile {
        profile_id: "with_reason_partial".into(),
        version: "1.0.0".into(),
        description: "Partial read that explains missing annotations in free text".into(),
        filename_patterns: patterns(&["(?i)partial", "(?i)reason"]),
        expected_fields: expected,
        keyword_terms: ["nodule", "non-nodule"].into_iter().map(str::to_string).collect(),
        weights: SignalWeights::default(),
        mappings,
    }
}

fn core_attributes_only() -> CaseProfile {
    CaseProfile {
        profile_id: "core_attributes_only".into(),
        version: "1.0.0".into(),
        description: "Header-only files with no reading sessions".into(),
        filename_patterns: patterns(&["(?i)core", "(?i)minimal"]),
        expected_fields: header_core_fields(),
        // No free text expected, so the keyword signal carries no weight.
        keyword_terms: Vec::new(),
        weights: SignalWeights {
            filename: 0.15,
            structural: 0.85,
            keyword: 0.0,
        },
        mappings: header_core_mappings(),
    }
}
