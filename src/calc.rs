use crate::model::{Assignment, Grade};
use serde::Serialize;
use std::collections::HashMap;

/// Second-half mean must move by more than this many points to count as a
/// trend.
pub const TREND_THRESHOLD: f64 = 5.0;

/// `score / max * 100`, or 0 when `max` is not positive.
pub fn grade_percentage(score: f64, max: f64) -> f64 {
    if max > 0.0 {
        score / max * 100.0
    } else {
        0.0
    }
}

/// Share of `part` in `total` as a percentage, 0 for an empty total.
pub fn ratio_percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64) / (total as f64) * 100.0
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Nearest integer with halves rounded up (`Math.round`).
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// One decimal place, or the bare string "0" when there is nothing to show.
pub fn one_decimal_or_zero(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "0".to_string(),
    }
}

/// Renders whole numbers without a fractional part ("45", "7.5").
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

pub fn letter_grade(percent: f64) -> &'static str {
    const LADDER: [(f64, &str); 11] = [
        (97.0, "A+"),
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (67.0, "D+"),
        (65.0, "D"),
    ];
    LADDER
        .iter()
        .find(|(min, _)| percent >= *min)
        .map(|(_, l)| *l)
        .unwrap_or("F")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl GradeBand {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 90.0 {
            GradeBand::Excellent
        } else if percent >= 80.0 {
            GradeBand::Good
        } else if percent >= 70.0 {
            GradeBand::Fair
        } else {
            GradeBand::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub percent: f64,
    pub letter: &'static str,
    pub band: GradeBand,
}

impl GradeSummary {
    pub fn from_scores(score: f64, max: f64) -> Self {
        let percent = grade_percentage(score, max);
        Self {
            percent,
            letter: letter_grade(percent),
            band: GradeBand::from_percent(percent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Splits chronologically ordered scores at `n / 2` and compares the means
/// of the two halves.
pub fn score_trend(chronological: &[f64]) -> Trend {
    let mid = chronological.len() / 2;
    let (first, second) = chronological.split_at(mid);
    let first_avg = mean(first).unwrap_or(0.0);
    let second_avg = mean(second).unwrap_or(0.0);
    if chronological.is_empty() {
        Trend::Stable
    } else if second_avg > first_avg + TREND_THRESHOLD {
        Trend::Improving
    } else if second_avg < first_avg - TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverage {
    pub student_id: i64,
    pub graded_count: usize,
    pub total_points: f64,
    pub total_possible: f64,
    #[serde(flatten)]
    pub summary: GradeSummary,
}

/// Points-weighted average: Σscore / Σpoints over grades whose assignment
/// still exists.
pub fn student_average(student_id: i64, grades: &[Grade], assignments: &[Assignment]) -> StudentAverage {
    let points: HashMap<i64, f64> = assignments.iter().map(|a| (a.id, a.points)).collect();
    let mut total_points = 0.0;
    let mut total_possible = 0.0;
    let mut graded_count = 0;
    for g in grades.iter().filter(|g| g.student_id == student_id) {
        if let Some(p) = points.get(&g.assignment_id) {
            total_points += g.score;
            total_possible += p;
            graded_count += 1;
        }
    }
    StudentAverage {
        student_id,
        graded_count,
        total_points,
        total_possible,
        summary: GradeSummary::from_scores(total_points, total_possible),
    }
}
