use serde_json::json;

use crate::departments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Decimal,
    Integer,
    Boolean,
    Date,
    DateTime,
    Json,
    File,
}

impl FieldKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Integer | FieldKind::Boolean => "INTEGER",
            _ => "TEXT",
        }
    }

    fn input_type(self) -> &'static str {
        match self {
            FieldKind::Email => "email",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime-local",
            FieldKind::Decimal | FieldKind::Integer => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::File => "file",
            FieldKind::Text | FieldKind::Json => "text",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub readonly: bool,
}

impl FieldDef {
    pub fn editable(&self) -> bool {
        self.kind != FieldKind::File && !self.readonly
    }

    /// Human label: underscores become spaces, words title-cased.
    pub fn label(&self) -> String {
        label_for(self.name)
    }
}

const fn f(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        readonly: false,
    }
}

const fn ro(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef {
        name,
        kind,
        readonly: true,
    }
}

use FieldKind::{Boolean, Date, DateTime, Decimal, Email, File, Integer, Json, Text};

/// Every admissions column except `id` and `created_at`, in record order.
pub static ADMISSION_FIELDS: &[FieldDef] = &[
    f("admission_status", Text),
    f("application_number", Text),
    f("application_date", Date),
    f("admission_date", Date),
    f("allotment_number", Text),
    f("portal_status", Text),
    f("quota", Text),
    f("roll_number", Text),
    f("unique_id", Text),
    f("umis_number", Text),
    f("level", Text),
    f("course", Text),
    f("branch", Text),
    f("department_preferences", Json),
    f("pg_dept", Text),
    f("is_fg", Boolean),
    f("fg_number", Text),
    f("pmss", Boolean),
    f("seven_five", Boolean),
    f("student_name", Text),
    f("dob", Date),
    f("gender", Text),
    f("community", Text),
    f("caste", Text),
    f("region", Text),
    f("aadhaar_number", Text),
    f("father_name", Text),
    f("mother_name", Text),
    f("guardian_name", Text),
    f("father_mobile", Text),
    f("mother_mobile", Text),
    f("guardian_mobile", Text),
    f("email", Email),
    f("student_mobile", Text),
    f("address", Text),
    f("pincode", Text),
    f("district", Text),
    f("state", Text),
    f("country", Text),
    f("qualification", Text),
    f("tenth_total", Text),
    f("tenth_percentage", Text),
    f("twelfth_total", Text),
    f("twelfth_percentage", Text),
    f("twelfth_major", Text),
    f("twelth_reg_no", Text),
    f("maths_marks", Decimal),
    f("physics_marks", Decimal),
    f("chemistry_marks", Decimal),
    ro("cutoff_marks", Decimal),
    f("diploma_total", Text),
    f("diploma_percentage", Text),
    f("diploma_major", Text),
    f("board", Text),
    f("year_passing", Integer),
    f("medium", Text),
    f("last_school", Text),
    f("vocational_stream", Text),
    f("skill_proof", File),
    f("diploma_college", Text),
    f("diploma_year_passing", Integer),
    f("college_address1", Text),
    f("college_district", Text),
    f("college_state", Text),
    f("college_fee", Decimal),
    f("hostel_fee", Decimal),
    f("bus_fee", Decimal),
    f("other_fee", Decimal),
    f("paid_fee", Decimal),
    f("concession_amount", Decimal),
    ro("unpaid_fee", Decimal),
    f("transaction_id", Text),
    f("transaction_date", DateTime),
    f("had_paid", Boolean),
    f("facility_type", Text),
    f("hostel_name", Text),
    f("boarding_point", Text),
    f("bus_needed", Text),
    f("bus_route", Text),
    f("hostel_needed", Text),
    f("hostel_type", Text),
    f("room_type", Text),
    f("mess_type", Text),
    f("hostel_fee_amount", Decimal),
    f("account_holder_name", Text),
    f("account_number", Text),
    f("bank_name", Text),
    f("ifsc_code", Text),
    f("bank_branch", Text),
    f("seeding_status", Text),
    f("tc", File),
    f("tc_number", Text),
    f("community_cert", File),
    f("community_cert_number", Text),
    f("aadhaar", File),
    f("tenth_marksheet", File),
    f("tenth_marksheet_number", Text),
    f("twelfth_marksheet", File),
    f("twelfth_marksheet_number", Text),
    f("photo", File),
];

pub fn lookup(name: &str) -> Option<&'static FieldDef> {
    ADMISSION_FIELDS.iter().find(|f| f.name == name)
}

pub fn label_for(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

const STATUS_OPTIONS: &[(&str, &str)] = &[
    ("enquired", "Enquired"),
    ("admitted", "Admitted"),
    ("discontinued", "Discontinued"),
    ("left", "Left"),
];
const LEVEL_OPTIONS: &[(&str, &str)] = &[("ug", "UG"), ("pg", "PG"), ("le", "LE")];
const BOARD_OPTIONS: &[(&str, &str)] = &[
    ("State Board", "State Board"),
    ("CBSE", "CBSE"),
    ("ICSE", "ICSE"),
    ("Others", "Others"),
];
const COMMUNITY_OPTIONS: &[(&str, &str)] = &[
    ("OC", "OC"),
    ("BC", "BC"),
    ("MBC", "MBC"),
    ("SC", "SC"),
    ("ST", "ST"),
    ("DNC", "DNC"),
];
const GENDER_OPTIONS: &[(&str, &str)] = &[
    ("Male", "Male"),
    ("Female", "Female"),
    ("Transgender", "Transgender"),
];
const YES_NO_OPTIONS: &[(&str, &str)] = &[("yes", "Yes"), ("no", "No")];
const QUALIFICATION_OPTIONS: &[(&str, &str)] = &[("12th", "12th"), ("Diploma", "Diploma")];
const QUOTA_OPTIONS: &[(&str, &str)] = &[("Government", "Government"), ("Management", "Management")];
const MEDIUM_OPTIONS: &[(&str, &str)] = &[
    ("Tamil", "Tamil"),
    ("English", "English"),
    ("Others", "Others"),
];

fn options_for(name: &str) -> Vec<serde_json::Value> {
    let pairs: &[(&str, &str)] = match name {
        "admission_status" => STATUS_OPTIONS,
        "level" => LEVEL_OPTIONS,
        "board" => BOARD_OPTIONS,
        "community" => COMMUNITY_OPTIONS,
        "gender" => GENDER_OPTIONS,
        "hostel_needed" | "bus_needed" => YES_NO_OPTIONS,
        "qualification" => QUALIFICATION_OPTIONS,
        "quota" => QUOTA_OPTIONS,
        "medium" => MEDIUM_OPTIONS,
        "pg_dept" => {
            return departments::PG_DEPARTMENTS
                .iter()
                .map(|d| json!({ "value": d.name, "label": d.label }))
                .collect();
        }
        // Inline edits of the mapping write a single rank-1 preference.
        "department_preferences" => {
            return departments::UG_DEPARTMENTS
                .iter()
                .map(|d| json!({ "value": json!({ d.name: 1 }).to_string(), "label": d.label }))
                .collect();
        }
        _ => &[],
    };
    pairs
        .iter()
        .map(|(value, label)| json!({ "value": value, "label": label }))
        .collect()
}

/// Descriptor table shipped to the inline-edit grid.
pub fn editable_descriptors() -> Vec<serde_json::Value> {
    ADMISSION_FIELDS
        .iter()
        .filter(|f| f.kind != FieldKind::File)
        .map(|f| {
            let options = options_for(f.name);
            let input_type = if options.is_empty() {
                f.kind.input_type()
            } else {
                "select"
            };
            let step = match f.kind {
                FieldKind::Decimal => "0.01",
                FieldKind::Integer => "1",
                _ => "",
            };
            json!({
                "name": f.name,
                "label": f.label(),
                "inputType": input_type,
                "step": step,
                "readonly": f.readonly,
                "options": options,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(label_for("twelth_reg_no"), "Twelth Reg No");
        assert_eq!(label_for("college_address1"), "College Address1");
    }

    #[test]
    fn derived_and_file_fields_are_not_editable() {
        for name in ["unpaid_fee", "cutoff_marks", "photo", "tc"] {
            let def = lookup(name).expect("declared");
            assert!(!def.editable(), "{name} should not be editable");
        }
        assert!(lookup("college_fee").expect("declared").editable());
        assert!(lookup("id").is_none());
        assert!(lookup("created_at").is_none());
    }

    #[test]
    fn descriptors_skip_file_fields() {
        let names: Vec<String> = editable_descriptors()
            .iter()
            .filter_map(|d| d.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        assert!(!names.iter().any(|n| n == "photo"));
        assert!(names.iter().any(|n| n == "unpaid_fee"));
    }
}
