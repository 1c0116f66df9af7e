use crate::calc::{self, Trend};
use crate::model::{
    iso_date, Assignment, AttendanceRecord, AttendanceStatus, Grade, Student,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Number;
use std::collections::{BTreeMap, HashSet};

const RECENT_GRADES: usize = 5;
const RECENT_ATTENDANCE: usize = 3;
const RECENT_ASSIGNMENTS: usize = 2;
const RECENT_LIMIT: usize = 10;
const TREND_TITLE_CHARS: usize = 15;

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: usize,
    pub active_students: usize,
    pub attendance_rate: String,
    pub average_grade: String,
    pub pending_assignments: usize,
}

pub fn dashboard_stats(
    students: &[Student],
    attendance: &[AttendanceRecord],
    grades: &[Grade],
    assignments: &[Assignment],
    as_of: DateTime<Utc>,
    window_days: i64,
) -> DashboardStats {
    let cutoff = as_of - Duration::days(window_days);
    let window: Vec<&AttendanceRecord> = attendance
        .iter()
        .filter(|r| r.date >= cutoff && r.date <= as_of)
        .collect();
    let present = window
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    let attendance_rate = if window.is_empty() {
        None
    } else {
        Some(calc::ratio_percent(present, window.len()))
    };

    let scores: Vec<f64> = grades.iter().map(|g| g.score).collect();
    let graded: HashSet<i64> = grades.iter().map(|g| g.assignment_id).collect();

    DashboardStats {
        total_students: students.len(),
        active_students: students.iter().filter(|s| s.is_active()).count(),
        attendance_rate: calc::one_decimal_or_zero(attendance_rate),
        average_grade: calc::one_decimal_or_zero(calc::mean(&scores)),
        pending_assignments: assignments
            .iter()
            .filter(|a| !graded.contains(&a.id))
            .count(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Grade,
    Attendance,
    Assignment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: &'static str,
    pub description: String,
    #[serde(with = "iso_date")]
    pub timestamp: DateTime<Utc>,
}

/// Latest grades, attendance marks and assignments (by storage order),
/// newest first. Entries whose student or assignment no longer exists are
/// dropped.
pub fn recent_activity(
    students: &[Student],
    attendance: &[AttendanceRecord],
    grades: &[Grade],
    assignments: &[Assignment],
) -> Vec<Activity> {
    let student = |id: i64| students.iter().find(|s| s.id == id);
    let mut out = Vec::new();

    for g in tail(grades, RECENT_GRADES) {
        let Some(s) = student(g.student_id) else { continue };
        let Some(a) = assignments.iter().find(|a| a.id == g.assignment_id) else {
            continue;
        };
        out.push(Activity {
            kind: ActivityKind::Grade,
            title: "Grade Entered",
            description: format!(
                "{} received {} points on {}",
                s.full_name(),
                calc::format_number(g.score),
                a.title
            ),
            timestamp: g.submitted_date,
        });
    }

    for r in tail(attendance, RECENT_ATTENDANCE) {
        let Some(s) = student(r.student_id) else { continue };
        out.push(Activity {
            kind: ActivityKind::Attendance,
            title: "Attendance Recorded",
            description: format!("{} marked as {}", s.full_name(), r.status.as_str()),
            timestamp: r.date,
        });
    }

    for a in tail(assignments, RECENT_ASSIGNMENTS) {
        out.push(Activity {
            kind: ActivityKind::Assignment,
            title: "Assignment Created",
            description: format!("New {}: {}", a.category.as_str(), a.title),
            timestamp: a.due_date,
        });
    }

    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out.truncate(RECENT_LIMIT);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Graded,
    Overdue,
    DueSoon,
    Active,
}

pub fn assignment_status(
    due: DateTime<Utc>,
    has_grades: bool,
    now: DateTime<Utc>,
    due_soon_days: i64,
) -> AssignmentStatus {
    if has_grades {
        AssignmentStatus::Graded
    } else if now > due {
        AssignmentStatus::Overdue
    } else if due < now + Duration::days(due_soon_days) {
        AssignmentStatus::DueSoon
    } else {
        AssignmentStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub name: &'static str,
    pub data: Vec<Number>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Chart {
    pub series: Vec<Series>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub average_grade: i64,
    pub total_assignments: usize,
    pub attendance_rate: i64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub grades_trend: Chart,
    pub attendance_rate: Chart,
    pub assignment_scores: Chart,
    pub stats: PerformanceStats,
}

/// `grades` and `attendance` must already be limited to one student.
pub fn student_performance(
    grades: &[Grade],
    attendance: &[AttendanceRecord],
    assignments: &[Assignment],
) -> StudentPerformance {
    let mut sorted: Vec<&Grade> = grades.iter().collect();
    sorted.sort_by_key(|g| g.submitted_date);

    StudentPerformance {
        grades_trend: grades_trend(&sorted, assignments),
        attendance_rate: weekly_attendance(attendance),
        assignment_scores: category_scores(grades, assignments),
        stats: performance_stats(&sorted, attendance),
    }
}

fn trend_label(grade: &Grade, assignments: &[Assignment]) -> String {
    let title = match assignments.iter().find(|a| a.id == grade.assignment_id) {
        Some(a) => {
            let short: String = a.title.chars().take(TREND_TITLE_CHARS).collect();
            format!("{short}...")
        }
        None => "Assignment".to_string(),
    };
    format!("{}\n{}", grade.submitted_date.format("%b %d"), title)
}

/// Whole scores chart as integers; fractional ones keep their decimals.
fn chart_number(v: f64) -> Number {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Number::from(v as i64)
    } else {
        Number::from_f64(v).unwrap_or_else(|| Number::from(0))
    }
}

fn grades_trend(sorted: &[&Grade], assignments: &[Assignment]) -> Chart {
    if sorted.is_empty() {
        return Chart::default();
    }
    let mut categories = Vec::with_capacity(sorted.len());
    let mut scores = Vec::with_capacity(sorted.len());
    let mut averages = Vec::with_capacity(sorted.len());
    let mut running = 0.0;
    for (idx, g) in sorted.iter().enumerate() {
        categories.push(trend_label(g, assignments));
        scores.push(chart_number(g.score));
        running += g.score;
        averages.push(Number::from(calc::round_half_up(running / (idx + 1) as f64)));
    }
    Chart {
        series: vec![
            Series {
                name: "Score",
                data: scores,
                kind: Some("column"),
            },
            Series {
                name: "Running Average",
                data: averages,
                kind: Some("line"),
            },
        ],
        categories,
    }
}

/// Sunday on or before `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

fn weekly_attendance(attendance: &[AttendanceRecord]) -> Chart {
    if attendance.is_empty() {
        return Chart::default();
    }
    let mut weeks: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for r in attendance {
        let entry = weeks.entry(week_start(r.date.date_naive())).or_default();
        entry.1 += 1;
        if r.status == AttendanceStatus::Present {
            entry.0 += 1;
        }
    }
    let categories = weeks.keys().map(|d| d.format("%b %d").to_string()).collect();
    let rates = weeks
        .values()
        .map(|(present, total)| Number::from(calc::round_half_up(calc::ratio_percent(*present, *total))))
        .collect();
    Chart {
        series: vec![Series {
            name: "Attendance Rate",
            data: rates,
            kind: None,
        }],
        categories,
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn category_scores(grades: &[Grade], assignments: &[Assignment]) -> Chart {
    // First-seen order of categories is kept.
    let mut buckets: Vec<(&'static str, Vec<i64>)> = Vec::new();
    for g in grades {
        let Some(a) = assignments.iter().find(|a| a.id == g.assignment_id) else {
            continue;
        };
        let pct = calc::round_half_up(calc::grade_percentage(g.score, a.points));
        let key = a.category.as_str();
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => v.push(pct),
            None => buckets.push((key, vec![pct])),
        }
    }
    if buckets.is_empty() {
        return Chart::default();
    }
    let averages = buckets
        .iter()
        .map(|(_, v)| {
            let sum: i64 = v.iter().sum();
            Number::from(calc::round_half_up(sum as f64 / v.len() as f64))
        })
        .collect();
    Chart {
        series: vec![Series {
            name: "Average Score %",
            data: averages,
            kind: None,
        }],
        categories: buckets.iter().map(|(k, _)| capitalize(k)).collect(),
    }
}

fn performance_stats(sorted: &[&Grade], attendance: &[AttendanceRecord]) -> PerformanceStats {
    let scores: Vec<f64> = sorted.iter().map(|g| g.score).collect();
    let present = attendance
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    PerformanceStats {
        average_grade: calc::mean(&scores).map(calc::round_half_up).unwrap_or(0),
        total_assignments: scores.len(),
        attendance_rate: calc::round_half_up(calc::ratio_percent(present, attendance.len())),
        trend: calc::score_trend(&scores),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceLevel {
    Good,
    Fair,
    Poor,
}

impl AttendanceLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 90.0 {
            AttendanceLevel::Good
        } else if percent >= 70.0 {
            AttendanceLevel::Fair
        } else {
            AttendanceLevel::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub date: NaiveDate,
    pub present: usize,
    pub total: usize,
    pub percentage: f64,
    pub level: AttendanceLevel,
}

/// Present marks of active students on `day` against the active roster.
pub fn day_stats(day: NaiveDate, students: &[Student], attendance: &[AttendanceRecord]) -> DayStats {
    let active: HashSet<i64> = students
        .iter()
        .filter(|s| s.is_active())
        .map(|s| s.id)
        .collect();
    let present = attendance
        .iter()
        .filter(|r| r.date.date_naive() == day)
        .filter(|r| r.status == AttendanceStatus::Present && active.contains(&r.student_id))
        .count();
    let percentage = calc::ratio_percent(present, active.len());
    DayStats {
        date: day,
        present,
        total: active.len(),
        percentage,
        level: AttendanceLevel::from_percent(percentage),
    }
}

pub fn days_of_month(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub month: String,
    pub students: Vec<RosterEntry>,
    pub days: Vec<DayStats>,
    pub records: Vec<AttendanceRecord>,
}

pub fn month_view(
    year: i32,
    month: u32,
    students: &[Student],
    attendance: &[AttendanceRecord],
) -> MonthView {
    let roster: Vec<RosterEntry> = students
        .iter()
        .filter(|s| s.is_active())
        .map(|s| RosterEntry {
            id: s.id,
            name: s.full_name(),
        })
        .collect();
    let active: HashSet<i64> = roster.iter().map(|r| r.id).collect();
    let records = attendance
        .iter()
        .filter(|r| {
            let d = r.date.date_naive();
            d.year() == year && d.month() == month && active.contains(&r.student_id)
        })
        .cloned()
        .collect();
    MonthView {
        month: format!("{year:04}-{month:02}"),
        students: roster,
        days: days_of_month(year, month)
            .into_iter()
            .map(|d| day_stats(d, students, attendance))
            .collect(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentCategory, StudentStatus};
    use chrono::TimeZone;

    fn numbers(v: &[i64]) -> Vec<Number> {
        v.iter().map(|n| Number::from(*n)).collect()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn student(id: i64, first: &str, status: StudentStatus) -> Student {
        Student {
            id,
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone: String::new(),
            grade_level: "9th Grade".to_string(),
            enrollment_date: at(2024, 8, 26),
            status,
            photo_url: None,
        }
    }

    fn assignment(id: i64, title: &str, category: AssignmentCategory, points: f64) -> Assignment {
        Assignment {
            id,
            title: title.to_string(),
            category,
            points,
            due_date: at(2024, 9, 10 + id as u32),
            description: String::new(),
            course_id: None,
        }
    }

    fn grade(id: i64, student_id: i64, assignment_id: i64, score: f64, when: DateTime<Utc>) -> Grade {
        Grade {
            id,
            student_id,
            assignment_id,
            score,
            submitted_date: when,
            comments: String::new(),
        }
    }

    fn mark(id: i64, student_id: i64, when: DateTime<Utc>, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id,
            course_id: None,
            date: when,
            status,
        }
    }

    #[test]
    fn empty_dashboard_renders_zero_strings() {
        let stats = dashboard_stats(&[], &[], &[], &[], at(2024, 9, 20), 7);
        assert_eq!(stats.attendance_rate, "0");
        assert_eq!(stats.average_grade, "0");
        assert_eq!(stats.total_students, 0);
    }

    #[test]
    fn dashboard_counts_only_the_recent_window() {
        let students = vec![
            student(1, "Ann", StudentStatus::Active),
            student(2, "Bo", StudentStatus::Inactive),
        ];
        let attendance = vec![
            mark(1, 1, at(2024, 9, 1), AttendanceStatus::Absent),
            mark(2, 1, at(2024, 9, 16), AttendanceStatus::Present),
            mark(3, 2, at(2024, 9, 17), AttendanceStatus::Present),
            mark(4, 1, at(2024, 9, 18), AttendanceStatus::Tardy),
            // Marked ahead of `asOf`.
            mark(5, 2, at(2024, 9, 25), AttendanceStatus::Absent),
        ];
        let assignments = vec![
            assignment(1, "Quiz", AssignmentCategory::Quiz, 10.0),
            assignment(2, "Essay", AssignmentCategory::Project, 50.0),
        ];
        let grades = vec![
            grade(1, 1, 1, 8.0, at(2024, 9, 12)),
            grade(2, 2, 1, 7.0, at(2024, 9, 12)),
        ];
        let stats = dashboard_stats(&students, &attendance, &grades, &assignments, at(2024, 9, 20), 7);
        assert_eq!(stats.active_students, 1);
        assert_eq!(stats.attendance_rate, "66.7");
        assert_eq!(stats.average_grade, "7.5");
        assert_eq!(stats.pending_assignments, 1);
    }

    #[test]
    fn recent_activity_is_newest_first_and_skips_orphans() {
        let students = vec![student(1, "Ann", StudentStatus::Active)];
        let assignments = vec![assignment(1, "Quiz", AssignmentCategory::Quiz, 10.0)];
        let grades = vec![
            grade(1, 1, 1, 9.0, at(2024, 9, 13)),
            grade(2, 99, 1, 5.0, at(2024, 9, 14)),
        ];
        let attendance = vec![mark(1, 1, at(2024, 9, 15), AttendanceStatus::Absent)];
        let items = recent_activity(&students, &attendance, &grades, &assignments);
        let kinds: Vec<ActivityKind> = items.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Attendance, ActivityKind::Grade, ActivityKind::Assignment]
        );
        assert_eq!(items[1].description, "Ann Doe received 9 points on Quiz");
        assert_eq!(items[0].description, "Ann Doe marked as absent");
        assert_eq!(items[2].description, "New quiz: Quiz");
    }

    #[test]
    fn chart_numbers_drop_trailing_zero_fractions() {
        assert_eq!(serde_json::to_string(&chart_number(45.0)).unwrap(), "45");
        assert_eq!(serde_json::to_string(&chart_number(7.5)).unwrap(), "7.5");
        assert_eq!(chart_number(f64::NAN), Number::from(0));
    }

    #[test]
    fn assignment_status_order() {
        let now = at(2024, 9, 10);
        assert_eq!(assignment_status(at(2024, 9, 1), true, now, 3), AssignmentStatus::Graded);
        assert_eq!(assignment_status(at(2024, 9, 9), false, now, 3), AssignmentStatus::Overdue);
        assert_eq!(assignment_status(at(2024, 9, 12), false, now, 3), AssignmentStatus::DueSoon);
        assert_eq!(assignment_status(at(2024, 9, 20), false, now, 3), AssignmentStatus::Active);
        assert_eq!(
            serde_json::to_value(AssignmentStatus::DueSoon).unwrap(),
            serde_json::json!("due-soon")
        );
    }

    #[test]
    fn performance_charts_follow_submission_order() {
        let assignments = vec![
            assignment(1, "Photosynthesis Lab Report", AssignmentCategory::Project, 50.0),
            assignment(2, "Quiz", AssignmentCategory::Quiz, 10.0),
        ];
        let grades = vec![
            grade(1, 1, 2, 7.0, at(2024, 9, 20)),
            grade(2, 1, 1, 45.0, at(2024, 9, 12)),
            grade(3, 1, 404, 3.0, at(2024, 9, 25)),
        ];
        let attendance = vec![
            // 2024-09-15 is a Sunday.
            mark(1, 1, at(2024, 9, 16), AttendanceStatus::Present),
            mark(2, 1, at(2024, 9, 17), AttendanceStatus::Absent),
            mark(3, 1, at(2024, 9, 10), AttendanceStatus::Present),
        ];
        let perf = student_performance(&grades, &attendance, &assignments);

        assert_eq!(
            perf.grades_trend.categories,
            vec![
                "Sep 12\nPhotosynthesis ...".to_string(),
                "Sep 20\nQuiz...".to_string(),
                "Sep 25\nAssignment".to_string(),
            ]
        );
        assert_eq!(perf.grades_trend.series[0].data, numbers(&[45, 7, 3]));
        assert_eq!(perf.grades_trend.series[1].data, numbers(&[45, 26, 18]));

        assert_eq!(perf.attendance_rate.categories, vec!["Sep 08", "Sep 15"]);
        assert_eq!(perf.attendance_rate.series[0].data, numbers(&[100, 50]));

        assert_eq!(perf.assignment_scores.categories, vec!["Quiz", "Project"]);
        assert_eq!(perf.assignment_scores.series[0].data, numbers(&[70, 90]));

        assert_eq!(perf.stats.average_grade, 18);
        assert_eq!(perf.stats.total_assignments, 3);
        assert_eq!(perf.stats.attendance_rate, 67);
        assert_eq!(perf.stats.trend, Trend::Declining);
    }

    #[test]
    fn performance_without_grades_still_reports_attendance() {
        let attendance = vec![mark(1, 1, at(2024, 9, 16), AttendanceStatus::Present)];
        let perf = student_performance(&[], &attendance, &[]);
        assert!(perf.grades_trend.series.is_empty());
        assert!(perf.assignment_scores.categories.is_empty());
        assert_eq!(perf.stats.attendance_rate, 100);
        assert_eq!(perf.stats.trend, Trend::Stable);
    }

    #[test]
    fn day_stats_use_active_roster() {
        let students = vec![
            student(1, "Ann", StudentStatus::Active),
            student(2, "Bo", StudentStatus::Active),
            student(3, "Cy", StudentStatus::Inactive),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 9, 16).unwrap();
        let attendance = vec![
            mark(1, 1, at(2024, 9, 16), AttendanceStatus::Present),
            mark(2, 3, at(2024, 9, 16), AttendanceStatus::Present),
            mark(3, 2, at(2024, 9, 17), AttendanceStatus::Present),
        ];
        let stats = day_stats(day, &students, &attendance);
        assert_eq!((stats.present, stats.total), (1, 2));
        assert_eq!(stats.percentage, 50.0);
        assert_eq!(stats.level, AttendanceLevel::Poor);

        let empty = day_stats(day, &[], &attendance);
        assert_eq!(empty.percentage, 0.0);
    }

    #[test]
    fn month_view_covers_every_day() {
        let students = vec![student(1, "Ann", StudentStatus::Active)];
        let attendance = vec![
            mark(1, 1, at(2024, 2, 29), AttendanceStatus::Present),
            mark(2, 1, at(2024, 3, 1), AttendanceStatus::Present),
        ];
        let view = month_view(2024, 2, &students, &attendance);
        assert_eq!(view.month, "2024-02");
        assert_eq!(view.days.len(), 29);
        assert_eq!(view.records.len(), 1);
        assert_eq!(view.days[28].level, AttendanceLevel::Good);
        assert_eq!(view.students[0].name, "Ann Doe");
    }
}
