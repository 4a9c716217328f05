use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(QueueStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl QueueStatus {
    /// Approved and rejected are terminal; an item reaches one of them
    /// exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

str_enum!(ReviewAction {
    Approve => "approve",
    Reject => "reject",
});

impl ReviewAction {
    pub fn target_status(&self) -> QueueStatus {
        match self {
            Self::Approve => QueueStatus::Approved,
            Self::Reject => QueueStatus::Rejected,
        }
    }
}

str_enum!(SegmentKind {
    Quantitative => "quantitative",
    Qualitative => "qualitative",
    Mixed => "mixed",
});

str_enum!(ValueType {
    Text => "text",
    Integer => "integer",
    Float => "float",
    Boolean => "boolean",
    Date => "date",
    TextArray => "text_array",
    IntegerArray => "integer_array",
    FloatArray => "float_array",
});

impl ValueType {
    /// Repeated source nodes are only legal for array-typed targets.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::TextArray | Self::IntegerArray | Self::FloatArray)
    }
}

str_enum!(SignalKind {
    Filename => "filename",
    Structural => "structural",
    Keyword => "keyword",
});
