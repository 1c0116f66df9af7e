use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const STUDENTS: &str = "students";
pub const ASSIGNMENTS: &str = "assignments";
pub const GRADES: &str = "grades";
pub const ATTENDANCE: &str = "attendance";
pub const PARENT_CONTACTS: &str = "parentContacts";
pub const COMMUNICATIONS: &str = "communications";

pub const COLLECTIONS: &[&str] = &[
    STUDENTS,
    ASSIGNMENTS,
    GRADES,
    ATTENDANCE,
    PARENT_CONTACTS,
    COMMUNICATIONS,
];

/// A flat record stored in one named collection and keyed by an integer id.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: &'static str;

    fn id(&self) -> i64;
}

pub fn is_collection(name: &str) -> bool {
    COLLECTIONS.contains(&name)
}

/// Human-facing entity name used in "not found" messages.
pub fn entity_name(collection: &str) -> &'static str {
    match collection {
        STUDENTS => "Student",
        ASSIGNMENTS => "Assignment",
        GRADES => "Grade",
        ATTENDANCE => "Attendance record",
        PARENT_CONTACTS => "Parent contact",
        COMMUNICATIONS => "Communication",
        _ => "Record",
    }
}

/// Declared field list per collection, sent as the field selection to the
/// record table.
pub fn fields_for(collection: &str) -> &'static [&'static str] {
    match collection {
        STUDENTS => &[
            "id",
            "firstName",
            "lastName",
            "email",
            "phone",
            "gradeLevel",
            "enrollmentDate",
            "status",
            "photoUrl",
        ],
        ASSIGNMENTS => &[
            "id",
            "title",
            "category",
            "points",
            "dueDate",
            "description",
            "courseId",
        ],
        GRADES => &[
            "id",
            "studentId",
            "assignmentId",
            "score",
            "submittedDate",
            "comments",
        ],
        ATTENDANCE => &["id", "studentId", "courseId", "date", "status"],
        PARENT_CONTACTS => &[
            "id",
            "studentId",
            "parentName",
            "email",
            "phone",
            "relationship",
            "createdDate",
            "updatedDate",
        ],
        COMMUNICATIONS => &[
            "id",
            "parentContactId",
            "type",
            "message",
            "direction",
            "date",
            "updatedDate",
        ],
        _ => &["id"],
    }
}

/// ISO-8601 timestamps. Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` and
/// plain `YYYY-MM-DD`; always writes UTC with millisecond precision.
pub mod iso_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(ndt.and_utc());
        }
        NaiveDate::parse_from_str(t, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ndt| ndt.and_utc())
    }

    pub fn to_iso(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_iso(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
    }

    pub mod opt {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(v) => s.serialize_str(&super::to_iso(v)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}"))),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub grade_level: String,
    #[serde(with = "iso_date")]
    pub enrollment_date: DateTime<Utc>,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == StudentStatus::Active
    }
}

impl Record for Student {
    const COLLECTION: &'static str = STUDENTS;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentCategory {
    Homework,
    Quiz,
    Test,
    Project,
}

impl AssignmentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentCategory::Homework => "homework",
            AssignmentCategory::Quiz => "quiz",
            AssignmentCategory::Test => "test",
            AssignmentCategory::Project => "project",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "homework" => Some(AssignmentCategory::Homework),
            "quiz" => Some(AssignmentCategory::Quiz),
            "test" => Some(AssignmentCategory::Test),
            "project" => Some(AssignmentCategory::Project),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub category: AssignmentCategory,
    pub points: f64,
    #[serde(with = "iso_date")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
}

impl Record for Assignment {
    const COLLECTION: &'static str = ASSIGNMENTS;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    #[serde(default)]
    pub id: i64,
    pub student_id: i64,
    pub assignment_id: i64,
    pub score: f64,
    #[serde(with = "iso_date")]
    pub submitted_date: DateTime<Utc>,
    #[serde(default)]
    pub comments: String,
}

impl Record for Grade {
    const COLLECTION: &'static str = GRADES;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Tardy,
    Excused,
}

/// Order applied on repeated toggles. `None` is "unmarked" (no record).
pub const STATUS_CYCLE: [Option<AttendanceStatus>; 5] = [
    Some(AttendanceStatus::Present),
    Some(AttendanceStatus::Absent),
    Some(AttendanceStatus::Tardy),
    Some(AttendanceStatus::Excused),
    None,
];

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Tardy => "tardy",
            AttendanceStatus::Excused => "excused",
        }
    }

    /// Parses a mark request. `Ok(None)` means unmark.
    pub fn parse_mark(raw: Option<&str>) -> Result<Option<Self>, String> {
        let Some(raw) = raw else { return Ok(None) };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "unmarked" | "none" => Ok(None),
            "present" => Ok(Some(AttendanceStatus::Present)),
            "absent" => Ok(Some(AttendanceStatus::Absent)),
            "tardy" => Ok(Some(AttendanceStatus::Tardy)),
            "excused" => Ok(Some(AttendanceStatus::Excused)),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }

    pub fn next(current: Option<Self>) -> Option<Self> {
        let idx = STATUS_CYCLE
            .iter()
            .position(|s| *s == current)
            .unwrap_or(STATUS_CYCLE.len() - 1);
        STATUS_CYCLE[(idx + 1) % STATUS_CYCLE.len()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default)]
    pub id: i64,
    pub student_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(with = "iso_date")]
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
}

impl Record for AttendanceRecord {
    const COLLECTION: &'static str = ATTENDANCE;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    #[default]
    Parent,
    Guardian,
    EmergencyContact,
}

impl Relationship {
    pub fn as_str(self) -> &'static str {
        match self {
            Relationship::Parent => "parent",
            Relationship::Guardian => "guardian",
            Relationship::EmergencyContact => "emergency_contact",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentContact {
    #[serde(default)]
    pub id: i64,
    pub student_id: i64,
    pub parent_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Relationship,
    #[serde(default, with = "iso_date::opt", skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, with = "iso_date::opt", skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<DateTime<Utc>>,
}

impl Record for ParentContact {
    const COLLECTION: &'static str = PARENT_CONTACTS;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationType {
    #[default]
    Email,
    Phone,
    Meeting,
    Text,
}

impl CommunicationType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommunicationType::Email => "email",
            CommunicationType::Phone => "phone",
            CommunicationType::Meeting => "meeting",
            CommunicationType::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Sent,
    Received,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    #[serde(default)]
    pub id: i64,
    pub parent_contact_id: i64,
    #[serde(rename = "type", default)]
    pub kind: CommunicationType,
    pub message: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(with = "iso_date")]
    pub date: DateTime<Utc>,
    #[serde(default, with = "iso_date::opt", skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<DateTime<Utc>>,
}

impl Record for Communication {
    const COLLECTION: &'static str = COMMUNICATIONS;

    fn id(&self) -> i64 {
        self.id
    }
}
