use chrono::{Datelike, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::calc::{self, FeeComponents};
use crate::editor::{parse_date, parse_datetime, parse_decimal};
use crate::error::{AdmissionError, Result};
use crate::fields;
use crate::model::{AdmissionRow, FieldValue, NewReference};
use crate::store;
use crate::uploads;

pub const MOBILE_MESSAGE: &str = "Mobile number must be 10 digits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Personal,
    Department,
    Marks,
    Academic,
    Vocational,
    Facility,
    Transport,
    Hostel,
    Fee,
    Scholarship,
    Bank,
    References,
    Certificates,
    Review,
}

impl Step {
    pub const ALL: [Step; 14] = [
        Step::Personal,
        Step::Department,
        Step::Marks,
        Step::Academic,
        Step::Vocational,
        Step::Facility,
        Step::Transport,
        Step::Hostel,
        Step::Fee,
        Step::Scholarship,
        Step::Bank,
        Step::References,
        Step::Certificates,
        Step::Review,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Personal => "personal",
            Step::Department => "department",
            Step::Marks => "marks",
            Step::Academic => "academic",
            Step::Vocational => "vocational",
            Step::Facility => "facility",
            Step::Transport => "transport",
            Step::Hostel => "hostel",
            Step::Fee => "fee",
            Step::Scholarship => "scholarship",
            Step::Bank => "bank",
            Step::References => "references",
            Step::Certificates => "certificates",
            Step::Review => "review",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Personal => "Personal Details",
            Step::Department => "Department",
            Step::Marks => "Marks Details",
            Step::Academic => "Academic Details",
            Step::Vocational => "Vocational Details",
            Step::Facility => "Facility Details",
            Step::Transport => "Transport Details",
            Step::Hostel => "Hostel Details",
            Step::Fee => "Fees Details",
            Step::Scholarship => "Scholarship Details",
            Step::Bank => "Bank Details",
            Step::References => "Reference Details",
            Step::Certificates => "Certificate Details",
            Step::Review => "Complete",
        }
    }

    pub fn parse(name: &str) -> Option<Step> {
        Step::ALL.iter().copied().find(|s| s.name() == name)
    }

    pub fn number(self) -> usize {
        Step::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.number()).copied()
    }
}

/// Read-only view over a step's submitted params. Missing keys read as
/// empty; strings are trimmed.
pub struct FormData<'a> {
    params: &'a serde_json::Value,
}

impl<'a> FormData<'a> {
    pub fn new(params: &'a serde_json::Value) -> Self {
        FormData { params }
    }

    pub fn text(&self, key: &str) -> String {
        match self.params.get(key) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        match self.params.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    /// Checkbox semantics: `on`, `true` or JSON true.
    pub fn flag(&self, key: &str) -> bool {
        match self.params.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "on" | "true")
            }
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<&'a str> {
        self.params
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Errors(Vec<String>);

impl Errors {
    fn push(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if !self.0.contains(&msg) {
            self.0.push(msg);
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AdmissionError::Validation(self.0))
        }
    }
}

pub fn validate_mobile(raw: &str) -> std::result::Result<String, String> {
    let m = raw.trim();
    if m.len() == 10 && m.chars().all(|c| c.is_ascii_digit()) {
        Ok(m.to_string())
    } else {
        Err(MOBILE_MESSAGE.to_string())
    }
}

pub fn validate_email(raw: &str) -> std::result::Result<String, String> {
    let e = raw.trim().to_lowercase();
    if e.contains('@') && e.contains('.') {
        Ok(e)
    } else {
        Err("Invalid email format".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub pk: i64,
    pub unique_id: Option<String>,
    pub step: Step,
    pub next_step: Option<Step>,
}

impl StepOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "pk": self.pk,
            "uniqueId": self.unique_id,
            "step": self.step.name(),
            "nextStep": self.next_step.map(Step::name),
        })
    }
}

/// Everything a step needs besides its form.
pub struct StepContext<'a> {
    pub conn: &'a Connection,
    pub workspace: &'a Path,
}

type Changes = Vec<(&'static str, FieldValue)>;

fn require_record(conn: &Connection, pk: Option<i64>) -> Result<AdmissionRow> {
    let pk = pk.ok_or_else(|| AdmissionError::bad_params("missing pk"))?;
    store::load_admission(conn, pk)
}

fn opt(form: &FormData<'_>, key: &str) -> FieldValue {
    FieldValue::opt_text(&form.text(key))
}

/// Validates and persists one editable step. Review is read-only and goes
/// through [`review`].
pub fn submit(
    ctx: &StepContext<'_>,
    step: Step,
    pk: Option<i64>,
    form: &FormData<'_>,
) -> Result<StepOutcome> {
    let pk = match step {
        Step::Personal => personal(ctx, pk, form)?,
        Step::Department => department(ctx, pk, form)?,
        Step::Marks => marks(ctx, pk, form)?,
        Step::Academic => academic(ctx, pk, form)?,
        Step::Vocational => vocational(ctx, pk, form)?,
        Step::Facility => facility(ctx, pk, form)?,
        Step::Transport => transport(ctx, pk, form)?,
        Step::Hostel => hostel(ctx, pk, form)?,
        Step::Fee => fee(ctx, pk, form)?,
        Step::Scholarship => scholarship(ctx, pk, form)?,
        Step::Bank => bank(ctx, pk, form)?,
        Step::References => references(ctx, pk, form)?,
        Step::Certificates => certificates(ctx, pk, form)?,
        Step::Review => require_record(ctx.conn, pk)?.id,
    };
    let row = store::load_admission(ctx.conn, pk)?;
    tracing::info!(admission_id = pk, step = step.name(), "wizard step saved");
    Ok(StepOutcome {
        pk,
        unique_id: row.text("unique_id").map(str::to_string),
        step,
        next_step: step.next(),
    })
}

fn save(conn: &Connection, pk: i64, changes: Changes) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    store::update_fields(&tx, pk, changes)?;
    tx.commit()?;
    Ok(())
}

const PERSONAL_REQUIRED: [&str; 10] = [
    "student_name",
    "student_mobile",
    "father_name",
    "mother_name",
    "dob",
    "gender",
    "address",
    "country",
    "state",
    "district",
];

fn personal(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let existing = match pk {
        Some(pk) => Some(store::load_admission(ctx.conn, pk)?),
        None => None,
    };

    let mut errors = Errors::default();
    let value_of = |key: &str| -> String {
        let v = form.text(key);
        if v.is_empty() && (key == "state" || key == "district") {
            form.text(&format!("{key}_others"))
        } else {
            v
        }
    };
    for key in PERSONAL_REQUIRED {
        if value_of(key).is_empty() {
            errors.push(format!("{} is required.", fields::label_for(key)));
        }
    }

    let student_name = form.text("student_name");
    let student_mobile = form.text("student_mobile");
    let email = match form.text("email").as_str() {
        "" => format!("{}+{}@samplemail.com", student_name, student_mobile),
        raw => validate_email(raw).unwrap_or_else(|msg| {
            errors.push(msg);
            String::new()
        }),
    };

    let mut mobiles: Changes = Vec::new();
    for key in ["student_mobile", "father_mobile", "mother_mobile", "guardian_mobile"] {
        let raw = form.text(key);
        if raw.is_empty() {
            mobiles.push((key, FieldValue::Null));
            continue;
        }
        match validate_mobile(&raw) {
            Ok(m) => mobiles.push((key, FieldValue::text(m))),
            Err(msg) => errors.push(msg),
        }
    }

    let dob_raw = form.text("dob");
    let dob = parse_date(&dob_raw);
    if !dob_raw.is_empty() && dob.is_none() {
        errors.push("Date of birth must be a valid date (YYYY-MM-DD).");
    }
    errors.finish()?;

    let mut changes: Changes = vec![
        (
            "unique_id",
            FieldValue::text(calc::student_fingerprint(&student_name, &student_mobile)),
        ),
        ("student_name", FieldValue::text(student_name)),
        ("email", FieldValue::text(email)),
        ("father_name", opt(form, "father_name")),
        ("mother_name", opt(form, "mother_name")),
        ("guardian_name", opt(form, "guardian_name")),
        ("allotment_number", opt(form, "register_number")),
        ("umis_number", opt(form, "umis_number")),
        ("dob", dob.map(FieldValue::Date).unwrap_or(FieldValue::Null)),
        ("gender", opt(form, "gender")),
        ("community", opt(form, "community")),
        ("address", opt(form, "address")),
        ("country", opt(form, "country")),
        ("state", FieldValue::opt_text(&value_of("state"))),
        ("district", FieldValue::opt_text(&value_of("district"))),
    ];
    changes.extend(mobiles);

    let tx = ctx.conn.unchecked_transaction()?;
    let pk = match existing {
        Some(row) => {
            store::update_fields(&tx, row.id, changes)?;
            row.id
        }
        None => {
            changes.push(("level", FieldValue::text("ug")));
            store::insert_admission(&tx, changes)?
        }
    };
    tx.commit()?;
    Ok(pk)
}

fn department(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let level = form.text("level").to_lowercase();
    let mut errors = Errors::default();
    let mut prefs = serde_json::Map::new();
    let mut pg_dept = FieldValue::Null;

    match level.as_str() {
        "" => errors.push("Please select a level."),
        "ug" | "le" => {
            let prefix = format!("{level}_pref_");
            for key in form.keys() {
                let Some(suffix) = key.strip_prefix(&prefix) else {
                    continue;
                };
                let raw = form.text(key);
                if raw.is_empty() {
                    continue;
                }
                match raw.parse::<i64>() {
                    Ok(rank) => {
                        prefs.insert(suffix.replace('_', " "), json!(rank));
                    }
                    Err(_) => errors.push("Invalid preference value."),
                }
            }
            if prefs.is_empty() {
                errors.push("Please select at least one department preference.");
            }
        }
        "pg" => {
            let dept = form.text("pg_dept");
            if dept.is_empty() {
                errors.push("Please select a PG department.");
            }
            pg_dept = FieldValue::opt_text(&dept);
        }
        _ => errors.push("Invalid level selected."),
    }
    errors.finish()?;

    save(
        ctx.conn,
        row.id,
        vec![
            ("level", FieldValue::text(level)),
            ("department_preferences", FieldValue::Json(serde_json::Value::Object(prefs))),
            ("pg_dept", pg_dept),
        ],
    )?;
    Ok(row.id)
}

const TWELFTH_FIELDS: [&str; 6] = [
    "twelfth_total",
    "twelfth_percentage",
    "maths_marks",
    "physics_marks",
    "chemistry_marks",
    "twelfth_major",
];
const DIPLOMA_FIELDS: [&str; 3] = ["diploma_total", "diploma_percentage", "diploma_major"];

fn percentage(raw: &str) -> Option<Decimal> {
    parse_decimal(raw).filter(|p| *p >= Decimal::ZERO && *p <= Decimal::ONE_HUNDRED)
}

fn marks(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let tenth_total = form.text("tenth_total");
    let tenth_percentage = form.text("tenth_percentage");
    let qualification = form.text("qualification");

    if tenth_total.is_empty() || tenth_percentage.is_empty() || qualification.is_empty() {
        errors.push("Please fill all required fields.");
    }
    if !tenth_percentage.is_empty() && percentage(&tenth_percentage).is_none() {
        errors.push("10th percentage must be between 0 and 100.");
    }

    let mut changes: Changes = Vec::new();
    match qualification.as_str() {
        "" => {}
        "12th" => {
            let subject = |k: &str| parse_decimal(&form.text(k));
            let (maths, physics, chemistry) = (
                subject("maths_marks"),
                subject("physics_marks"),
                subject("chemistry_marks"),
            );
            if form.text("twelfth_total").is_empty() || form.text("twelfth_major").is_empty() {
                errors.push("Please fill all 12th qualification fields.");
            }
            let scored = match (maths, physics, chemistry) {
                (Some(m), Some(p), Some(c)) => {
                    calc::twelfth_cutoff(m, p, c).map(|cutoff| (m, p, c, cutoff))
                }
                _ => None,
            };
            match scored {
                Some((m, p, c, cutoff)) => {
                    for f in DIPLOMA_FIELDS {
                        changes.push((f, FieldValue::Null));
                    }
                    changes.push(("twelfth_total", opt(form, "twelfth_total")));
                    changes.push(("twelfth_percentage", opt(form, "twelfth_percentage")));
                    changes.push(("twelfth_major", opt(form, "twelfth_major")));
                    changes.push(("maths_marks", FieldValue::Decimal(m)));
                    changes.push(("physics_marks", FieldValue::Decimal(p)));
                    changes.push(("chemistry_marks", FieldValue::Decimal(c)));
                    changes.push(("cutoff_marks", FieldValue::Decimal(cutoff)));
                }
                None => errors.push("Invalid numeric marks for 12th."),
            }
            changes.push(("twelth_reg_no", opt(form, "twelth_reg_no")));
        }
        "Diploma" => {
            if percentage(&form.text("diploma_percentage")).is_none() {
                errors.push("Diploma percentage must be between 0 and 100.");
            }
            if DIPLOMA_FIELDS.iter().any(|f| form.text(f).is_empty()) {
                errors.push("Please fill all Diploma qualification fields.");
            }
            let year_raw = form.text("diploma_year_passing");
            let diploma_year = if year_raw.is_empty() {
                FieldValue::Null
            } else {
                match year_raw.parse::<i64>() {
                    Ok(y) => FieldValue::Integer(y),
                    Err(_) => {
                        errors.push("Diploma year of passing must be a number.");
                        FieldValue::Null
                    }
                }
            };
            for f in TWELFTH_FIELDS {
                changes.push((f, FieldValue::Null));
            }
            for f in DIPLOMA_FIELDS {
                changes.push((f, opt(form, f)));
            }
            for f in ["diploma_college", "college_address1", "college_district", "college_state"] {
                changes.push((f, opt(form, f)));
            }
            changes.push(("diploma_year_passing", diploma_year));
            changes.push(("cutoff_marks", FieldValue::Decimal(calc::diploma_cutoff())));
            changes.push(("level", FieldValue::text("le")));
        }
        _ => errors.push("Invalid qualification selected."),
    }
    errors.finish()?;

    changes.push(("tenth_total", FieldValue::text(tenth_total)));
    changes.push(("tenth_percentage", FieldValue::text(tenth_percentage)));
    changes.push(("qualification", FieldValue::text(qualification)));
    save(ctx.conn, row.id, changes)?;
    Ok(row.id)
}

fn academic(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let required = ["last_school", "board", "year_passing", "medium"];
    if required.iter().any(|k| form.text(k).is_empty()) {
        errors.push("Please fill in all required fields.");
    }
    let max_year = i64::from(Utc::now().year()) + 1;
    let year_raw = form.text("year_passing");
    let year = year_raw.parse::<i64>().ok().filter(|y| (2000..=max_year).contains(y));
    if !year_raw.is_empty() && year.is_none() {
        errors.push(format!("Invalid year: Year must be between 2000 and {max_year}"));
    }
    errors.finish()?;

    save(
        ctx.conn,
        row.id,
        vec![
            ("last_school", opt(form, "last_school")),
            ("board", opt(form, "board")),
            ("year_passing", year.map(FieldValue::Integer).unwrap_or(FieldValue::Null)),
            ("medium", opt(form, "medium")),
        ],
    )?;
    Ok(row.id)
}

/// An attachment that passed validation and is ready to copy.
struct PendingFile {
    column: &'static str,
    kind: &'static str,
    source: PathBuf,
}

fn check_attachment(errors: &mut Errors, label: &str, raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    match uploads::validate_file(&path) {
        Ok(_) => Some(path),
        Err(msg) => {
            errors.push(format!("{label} error: {msg}"));
            None
        }
    }
}

/// Copies `pending` into the workspace, then hands the stored paths to
/// `write`. Copies already made are removed again if a copy or the write
/// fails.
fn store_then_write<F>(
    ctx: &StepContext<'_>,
    row: &AdmissionRow,
    pending: Vec<PendingFile>,
    write: F,
) -> Result<()>
where
    F: FnOnce(Vec<(&'static str, String)>) -> Result<()>,
{
    let name = row.text("student_name").unwrap_or("student");
    let email = row.text("email").unwrap_or("");
    let mut stored = Vec::with_capacity(pending.len());
    for p in &pending {
        match uploads::store_file(ctx.workspace, name, email, p.kind, &p.source) {
            Ok(rel) => stored.push((p.column, rel)),
            Err(e) => {
                uploads::discard(ctx.workspace, stored.iter().map(|(_, rel)| rel));
                return Err(e);
            }
        }
    }
    let paths: Vec<String> = stored.iter().map(|(_, rel)| rel.clone()).collect();
    write(stored).inspect_err(|e| {
        tracing::warn!(admission_id = row.id, error = %e, "write failed, removing stored attachments");
        uploads::discard(ctx.workspace, &paths);
    })
}

fn file_changes(stored: Vec<(&'static str, String)>) -> Changes {
    stored
        .into_iter()
        .map(|(column, rel)| (column, FieldValue::text(rel)))
        .collect()
}

fn vocational(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let proof = check_attachment(&mut errors, "Skill proof file", &form.text("skill_proof"));
    errors.finish()?;

    let pending = proof
        .map(|source| PendingFile {
            column: "skill_proof",
            kind: "vocational",
            source,
        })
        .into_iter()
        .collect();
    let stream = opt(form, "vocational_stream");
    store_then_write(ctx, &row, pending, |stored| {
        let mut changes = vec![("vocational_stream", stream)];
        changes.extend(file_changes(stored));
        save(ctx.conn, row.id, changes)
    })?;
    Ok(row.id)
}

fn facility_reset() -> Changes {
    vec![
        ("bus_needed", FieldValue::text("no")),
        ("boarding_point", FieldValue::Null),
        ("bus_route", FieldValue::Null),
        ("hostel_needed", FieldValue::text("no")),
        ("hostel_name", FieldValue::Null),
        ("hostel_type", FieldValue::Null),
        ("room_type", FieldValue::Null),
        ("mess_type", FieldValue::Null),
        ("hostel_fee_amount", FieldValue::Null),
    ]
}

fn set(changes: &mut Changes, name: &'static str, value: FieldValue) {
    match changes.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = value,
        None => changes.push((name, value)),
    }
}

fn facility(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let facility_type = form.text("facility_type");
    let mut changes = facility_reset();
    match facility_type.as_str() {
        "transport" => {
            set(&mut changes, "bus_needed", FieldValue::text("yes"));
            set(&mut changes, "boarding_point", opt(form, "boarding_point"));
            set(&mut changes, "bus_route", opt(form, "bus_route"));
        }
        "hostel" => {
            set(&mut changes, "hostel_needed", FieldValue::text("yes"));
            for f in ["hostel_name", "hostel_type", "room_type", "mess_type"] {
                set(&mut changes, f, opt(form, f));
            }
        }
        "other" => {}
        _ => return Err(AdmissionError::validation("Please select a facility type.")),
    }
    changes.push(("facility_type", FieldValue::text(facility_type)));
    save(ctx.conn, row.id, changes)?;
    Ok(row.id)
}

fn yes_no(raw: &str) -> Option<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "yes" => Some("yes"),
        "no" => Some("no"),
        _ => None,
    }
}

fn transport(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let bus_needed = yes_no(&form.text("bus_needed"));
    if bus_needed.is_none() {
        errors.push("Please specify if bus facility is needed.");
    }
    if bus_needed == Some("yes")
        && (form.text("boarding_point").is_empty() || form.text("bus_route").is_empty())
    {
        errors.push("Please provide boarding point and bus route.");
    }
    errors.finish()?;

    save(
        ctx.conn,
        row.id,
        vec![
            ("bus_needed", FieldValue::opt_text(bus_needed.unwrap_or(""))),
            ("boarding_point", opt(form, "boarding_point")),
            ("bus_route", opt(form, "bus_route")),
        ],
    )?;
    Ok(row.id)
}

fn hostel(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let hostel_needed = yes_no(&form.text("hostel_needed"));
    if hostel_needed.is_none() {
        errors.push("Please specify if hostel accommodation is needed.");
    }
    if hostel_needed == Some("yes")
        && ["hostel_type", "room_type", "mess_type"]
            .iter()
            .any(|k| form.text(k).is_empty())
    {
        errors.push("Please provide all hostel details.");
    }
    let fee_raw = form.text("hostel_fee_amount");
    let fee = parse_decimal(&fee_raw);
    if !fee_raw.is_empty() && fee.is_none() {
        errors.push("Hostel fee amount must be a valid number.");
    }
    errors.finish()?;

    save(
        ctx.conn,
        row.id,
        vec![
            ("hostel_needed", FieldValue::opt_text(hostel_needed.unwrap_or(""))),
            ("hostel_type", opt(form, "hostel_type")),
            ("room_type", opt(form, "room_type")),
            ("mess_type", opt(form, "mess_type")),
            ("hostel_fee_amount", FieldValue::opt_decimal(fee)),
        ],
    )?;
    Ok(row.id)
}

fn fee(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();

    let mut fees = FeeComponents::default();
    for f in calc::FEE_COMPONENT_FIELDS {
        let raw = form.text(f);
        if raw.is_empty() {
            continue;
        }
        match parse_decimal(&raw) {
            Some(d) => fees.set(f, Some(d)),
            None => errors.push(
                "Fee amounts must be valid numbers with at most 8 digits before and 2 after the decimal point.",
            ),
        }
    }

    let date_raw = form.text("transaction_date");
    let transaction_date = parse_datetime(&date_raw);
    if !date_raw.is_empty() && transaction_date.is_none() {
        errors.push(
            "Transaction date format is invalid. Please use YYYY-MM-DD HH:MM[:ss[.uuuuuu]][TZ]",
        );
    }

    let screenshots: Vec<PendingFile> = form
        .list("payment_screenshots")
        .iter()
        .filter_map(|raw| check_attachment(&mut errors, "Payment screenshot", raw))
        .map(|source| PendingFile {
            column: "payment_screenshots",
            kind: "payments",
            source,
        })
        .collect();
    errors.finish()?;
    let unpaid = fees
        .unpaid()
        .ok_or_else(|| AdmissionError::validation("Fee total is out of range."))?;

    let mut changes: Changes = vec![
        ("college_fee", FieldValue::opt_decimal(fees.college_fee)),
        ("hostel_fee", FieldValue::opt_decimal(fees.hostel_fee)),
        ("bus_fee", FieldValue::opt_decimal(fees.bus_fee)),
        ("other_fee", FieldValue::opt_decimal(fees.other_fee)),
        ("paid_fee", FieldValue::opt_decimal(fees.paid_fee)),
        ("concession_amount", FieldValue::opt_decimal(fees.concession_amount)),
        ("unpaid_fee", FieldValue::Decimal(unpaid)),
        ("transaction_id", opt(form, "transaction_id")),
        (
            "transaction_date",
            transaction_date
                .map(FieldValue::DateTime)
                .unwrap_or(FieldValue::Null),
        ),
    ];
    if fees.paid_fee.is_some_and(|p| p > Decimal::ZERO) {
        changes.push(("had_paid", FieldValue::Bool(true)));
    }

    store_then_write(ctx, &row, screenshots, |stored| {
        let tx = ctx.conn.unchecked_transaction()?;
        store::update_fields(&tx, row.id, changes)?;
        for (_, rel) in &stored {
            store::add_payment_screenshot(&tx, row.id, rel)?;
        }
        tx.commit()?;
        Ok(())
    })?;
    Ok(row.id)
}

fn scholarship(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let is_fg = form.flag("is_fg");
    save(
        ctx.conn,
        row.id,
        vec![
            ("pmss", FieldValue::Bool(form.flag("pmss"))),
            ("seven_five", FieldValue::Bool(form.flag("seven_five"))),
            ("is_fg", FieldValue::Bool(is_fg)),
            (
                "fg_number",
                if is_fg {
                    opt(form, "fg_number")
                } else {
                    FieldValue::Null
                },
            ),
        ],
    )?;
    Ok(row.id)
}

fn bank(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let changes = [
        "account_holder_name",
        "account_number",
        "bank_name",
        "ifsc_code",
        "bank_branch",
        "seeding_status",
    ]
    .into_iter()
    .map(|f| (f, opt(form, f)))
    .collect();
    save(ctx.conn, row.id, changes)?;
    Ok(row.id)
}

fn references(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let names = form.list("reference_name");
    let mobiles = form.list("reference_mobile");
    let relationships = form.list("relationship");
    let departments = form.list("reference_department");
    let designations = form.list("reference_designation");
    let at = |v: &[String], i: usize| v.get(i).cloned().unwrap_or_default();

    let mut errors = Errors::default();
    let mut refs = Vec::new();
    for (i, name) in names.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        let mobile = match validate_mobile(&at(&mobiles, i)) {
            Ok(m) => m,
            Err(msg) => {
                errors.push(format!("Reference {}: {}", i + 1, msg));
                continue;
            }
        };
        refs.push(NewReference {
            name: name.clone(),
            mobile,
            relationship: at(&relationships, i),
            department: at(&departments, i),
            designation: at(&designations, i),
        });
    }
    errors.finish()?;

    let tx = ctx.conn.unchecked_transaction()?;
    store::replace_references(&tx, row.id, &refs)?;
    tx.commit()?;
    Ok(row.id)
}

const CERTIFICATE_FILES: [&str; 6] = [
    "tc",
    "community_cert",
    "aadhaar",
    "tenth_marksheet",
    "twelfth_marksheet",
    "photo",
];
const CERTIFICATE_NUMBERS: [&str; 4] = [
    "tc_number",
    "community_cert_number",
    "tenth_marksheet_number",
    "twelfth_marksheet_number",
];

fn certificates(ctx: &StepContext<'_>, pk: Option<i64>, form: &FormData<'_>) -> Result<i64> {
    let row = require_record(ctx.conn, pk)?;
    let mut errors = Errors::default();
    let mut pending = Vec::new();
    for column in CERTIFICATE_FILES {
        if let Some(source) = check_attachment(&mut errors, &fields::label_for(column), &form.text(column)) {
            let kind = if column == "photo" { "photos" } else { "certificates" };
            pending.push(PendingFile {
                column,
                kind,
                source,
            });
        }
    }
    errors.finish()?;

    let mut changes: Changes = CERTIFICATE_NUMBERS
        .into_iter()
        .filter(|k| form.keys().contains(k))
        .map(|k| (k, opt(form, k)))
        .collect();
    store_then_write(ctx, &row, pending, |stored| {
        changes.extend(file_changes(stored));
        save(ctx.conn, row.id, changes)
    })?;
    Ok(row.id)
}

/// Read-only summary shown at the end of the wizard.
pub fn review(conn: &Connection, pk: Option<i64>) -> Result<serde_json::Value> {
    let row = require_record(conn, pk)?;
    Ok(json!({
        "admission": row.to_json(),
        "references": store::list_references(conn, row.id)?,
        "paymentScreenshots": store::list_payment_screenshots(conn, row.id)?,
        "step": Step::Review.name(),
    }))
}

/// Resolves a numeric pk or a 12-hex unique id to its record.
pub fn lookup(conn: &Connection, identifier: &str) -> Result<AdmissionRow> {
    let ident = identifier.trim();
    if ident.is_empty() {
        return Err(AdmissionError::bad_params("missing identifier"));
    }
    let found = if ident.chars().all(|c| c.is_ascii_digit()) {
        match ident.parse::<i64>() {
            Ok(pk) => store::find_admission(conn, pk)?,
            Err(_) => None,
        }
    } else {
        store::find_by_unique_id(conn, ident)?
    };
    found.ok_or(AdmissionError::NotFound("admission"))
}

pub fn steps_json() -> serde_json::Value {
    json!(Step::ALL
        .iter()
        .map(|s| json!({ "number": s.number(), "name": s.name(), "label": s.label() }))
        .collect::<Vec<_>>())
}
