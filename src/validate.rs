use crate::calc;
use crate::model::AssignmentCategory;
use crate::store::Fields;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Field name -> message for every field that failed.
pub type FieldErrors = BTreeMap<&'static str, String>;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("static email pattern"))
}

pub fn is_valid_email(raw: &str) -> bool {
    email_re().is_match(raw)
}

fn text<'a>(fields: &'a Fields, key: &str) -> &'a str {
    fields.get(key).and_then(|v| v.as_str()).unwrap_or("").trim()
}

fn has_value(fields: &Fields, key: &str) -> bool {
    match fields.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn require(errors: &mut FieldErrors, fields: &Fields, key: &'static str, message: &str) {
    if !has_value(fields, key) {
        errors.insert(key, message.to_string());
    }
}

fn check_email(errors: &mut FieldErrors, fields: &Fields) {
    let email = text(fields, "email");
    if email.is_empty() {
        errors.insert("email", "Email is required".to_string());
    } else if !is_valid_email(email) {
        errors.insert("email", "Email is invalid".to_string());
    }
}

pub fn student(fields: &Fields) -> FieldErrors {
    let mut errors = FieldErrors::new();
    require(&mut errors, fields, "firstName", "First name is required");
    require(&mut errors, fields, "lastName", "Last name is required");
    check_email(&mut errors, fields);
    require(&mut errors, fields, "gradeLevel", "Grade level is required");
    require(&mut errors, fields, "enrollmentDate", "Enrollment date is required");
    errors
}

pub fn assignment(fields: &Fields) -> FieldErrors {
    let mut errors = FieldErrors::new();
    require(&mut errors, fields, "title", "Title is required");
    match fields.get("category").and_then(|v| v.as_str()) {
        None => {
            errors.insert("category", "Category is required".to_string());
        }
        Some(c) if c.trim().is_empty() => {
            errors.insert("category", "Category is required".to_string());
        }
        Some(c) if AssignmentCategory::parse(c).is_none() => {
            errors.insert("category", format!("Unknown category: {}", c.trim()));
        }
        Some(_) => {}
    }
    if number(fields.get("points")).map_or(true, |p| p <= 0.0) {
        errors.insert("points", "Points must be greater than 0".to_string());
    }
    require(&mut errors, fields, "dueDate", "Due date is required");
    errors
}

pub fn parent_contact(fields: &Fields) -> FieldErrors {
    let mut errors = FieldErrors::new();
    require(&mut errors, fields, "parentName", "Parent name is required");
    check_email(&mut errors, fields);
    require(&mut errors, fields, "phone", "Phone is required");
    errors
}

pub fn communication(fields: &Fields) -> FieldErrors {
    let mut errors = FieldErrors::new();
    require(&mut errors, fields, "message", "Message is required");
    errors
}

/// Numbers and numeric strings, as a form input would submit them.
pub fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub fn grade_score(raw: Option<&Value>, points: f64) -> Result<f64, String> {
    let score = number(raw).ok_or_else(|| "Please enter a valid score".to_string())?;
    if score < 0.0 || score > points {
        return Err(format!(
            "Score must be between 0 and {}",
            calc::format_number(points)
        ));
    }
    Ok(score)
}
