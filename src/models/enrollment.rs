use serde::{Deserialize, Serialize};

/// A learner's entitlement to access one course.
///
/// There is at most one enrollment row per (buyer, course) pair no matter
/// how many transactions were attempted for that course; the composite
/// unique key enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub buyer_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: i64,
    pub completed_at: Option<i64>,
    pub expires_at: Option<i64>,
    /// Progress counter owned by the learning subsystem; this core only
    /// initializes it to zero and never touches it afterwards.
    pub completed_lessons: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Expired,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
