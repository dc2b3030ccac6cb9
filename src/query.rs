use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;

use crate::departments;
use crate::error::Result;
use crate::model::AdmissionRow;
use crate::store;

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryFilter {
    India {
        state: Option<String>,
        district: Option<String>,
    },
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accommodation {
    Hostel,
    Transport,
    NotNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankConstraint {
    Any,
    Exactly(i64),
    AtLeast(i64),
}

impl RankConstraint {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1" => RankConstraint::Exactly(1),
            "2" => RankConstraint::Exactly(2),
            "3" => RankConstraint::Exactly(3),
            "3+" => RankConstraint::AtLeast(3),
            _ => RankConstraint::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentFilter {
    /// Free text matched nothing in the vocabulary; the result is empty.
    Unresolved,
    Resolved {
        names: Vec<&'static str>,
        rank: RankConstraint,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    CreatedAt,
    #[default]
    CreatedAtDesc,
    CutoffMarks,
    CutoffMarksDesc,
    StudentName,
    StudentNameDesc,
}

impl SortKey {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "created_at" => SortKey::CreatedAt,
            "-created_at" => SortKey::CreatedAtDesc,
            "cutoff_marks" => SortKey::CutoffMarks,
            "-cutoff_marks" => SortKey::CutoffMarksDesc,
            "student_name" => SortKey::StudentName,
            "-student_name" => SortKey::StudentNameDesc,
            _ => SortKey::CreatedAtDesc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::CreatedAtDesc => "-created_at",
            SortKey::CutoffMarks => "cutoff_marks",
            SortKey::CutoffMarksDesc => "-cutoff_marks",
            SortKey::StudentName => "student_name",
            SortKey::StudentNameDesc => "-student_name",
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at ASC, id DESC",
            SortKey::CreatedAtDesc => "created_at DESC, id DESC",
            SortKey::CutoffMarks => "CAST(cutoff_marks AS REAL) ASC, id DESC",
            SortKey::CutoffMarksDesc => "CAST(cutoff_marks AS REAL) DESC, id DESC",
            SortKey::StudentName => "student_name ASC, id DESC",
            SortKey::StudentNameDesc => "student_name DESC, id DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdmissionFilters {
    pub search: Option<String>,
    pub status: Option<String>,
    pub level: Option<String>,
    pub board: Option<String>,
    pub community: Option<String>,
    pub country: Option<CountryFilter>,
    pub accommodation: Option<Accommodation>,
    pub cutoff_from: Option<Decimal>,
    pub cutoff_to: Option<Decimal>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub department: Option<DepartmentFilter>,
    pub sort: SortKey,
    pub page: Option<String>,
}

fn non_empty(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
}

fn parse_number(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

impl AdmissionFilters {
    /// Never fails: unusable values drop their constraint.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let country = match params.get("country_filter").map(String::as_str) {
            Some("India") => Some(CountryFilter::India {
                state: non_empty(params, "state_filter"),
                district: non_empty(params, "district_filter"),
            }),
            Some("Others") => Some(CountryFilter::Others),
            _ => None,
        };
        let accommodation = match params.get("accommodation_type").map(String::as_str) {
            Some("hostel") => Some(Accommodation::Hostel),
            Some("transport") => Some(Accommodation::Transport),
            Some("not_needed") => Some(Accommodation::NotNeeded),
            _ => None,
        };
        let department = non_empty(params, "dept").map(|dept| {
            let names = departments::resolve(&dept);
            if names.is_empty() {
                DepartmentFilter::Unresolved
            } else {
                DepartmentFilter::Resolved {
                    names,
                    rank: RankConstraint::parse(
                        params.get("preference").map(String::as_str).unwrap_or(""),
                    ),
                }
            }
        });

        AdmissionFilters {
            search: non_empty(params, "search"),
            status: non_empty(params, "status"),
            level: non_empty(params, "level"),
            board: non_empty(params, "board"),
            community: non_empty(params, "community"),
            country,
            accommodation,
            cutoff_from: non_empty(params, "cutoff_from").and_then(|v| parse_number(&v)),
            cutoff_to: non_empty(params, "cutoff_to").and_then(|v| parse_number(&v)),
            date_from: non_empty(params, "date_from")
                .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok()),
            date_to: non_empty(params, "date_to")
                .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok()),
            department,
            sort: params
                .get("sort")
                .map(|s| SortKey::parse(s))
                .unwrap_or_default(),
            page: params.get("page").cloned(),
        }
    }

    /// WHERE clause and its bind values, or `None` when the filters
    /// can match nothing.
    pub fn where_clause(&self) -> Option<(String, Vec<Value>)> {
        let mut clauses: Vec<String> = Vec::new();
        let mut bind: Vec<Value> = Vec::new();

        if let Some(search) = &self.search {
            clauses.push(
                "(instr(lower(COALESCE(student_name, '')), lower(?)) > 0
                  OR instr(lower(COALESCE(email, '')), lower(?)) > 0
                  OR instr(lower(COALESCE(application_number, '')), lower(?)) > 0)"
                    .to_string(),
            );
            for _ in 0..3 {
                bind.push(Value::Text(search.clone()));
            }
        }
        if let Some(status) = &self.status {
            clauses.push("lower(admission_status) = lower(?)".to_string());
            bind.push(Value::Text(status.clone()));
        }
        for (col, val) in [
            ("level", &self.level),
            ("board", &self.board),
            ("community", &self.community),
        ] {
            if let Some(v) = val {
                clauses.push(format!("{col} = ?"));
                bind.push(Value::Text(v.clone()));
            }
        }
        match &self.country {
            Some(CountryFilter::India { state, district }) => {
                clauses.push("lower(country) = 'india'".to_string());
                if let Some(s) = state {
                    clauses.push("lower(state) = lower(?)".to_string());
                    bind.push(Value::Text(s.clone()));
                }
                if let Some(d) = district {
                    clauses.push("lower(district) = lower(?)".to_string());
                    bind.push(Value::Text(d.clone()));
                }
            }
            Some(CountryFilter::Others) => {
                clauses.push("(country IS NULL OR lower(country) <> 'india')".to_string());
            }
            None => {}
        }
        match self.accommodation {
            Some(Accommodation::Hostel) => clauses.push("hostel_needed = 'yes'".to_string()),
            Some(Accommodation::Transport) => clauses.push("bus_needed = 'yes'".to_string()),
            Some(Accommodation::NotNeeded) => {
                clauses.push("hostel_needed = 'no' AND bus_needed = 'no'".to_string())
            }
            None => {}
        }
        if let Some(from) = self.cutoff_from.and_then(|d| d.to_f64()) {
            clauses.push("CAST(cutoff_marks AS REAL) >= ?".to_string());
            bind.push(Value::Real(from));
        }
        if let Some(to) = self.cutoff_to.and_then(|d| d.to_f64()) {
            clauses.push("CAST(cutoff_marks AS REAL) <= ?".to_string());
            bind.push(Value::Real(to));
        }
        if let Some(from) = self.date_from {
            clauses.push("substr(created_at, 1, 10) >= ?".to_string());
            bind.push(Value::Text(from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.date_to {
            clauses.push("substr(created_at, 1, 10) <= ?".to_string());
            bind.push(Value::Text(to.format("%Y-%m-%d").to_string()));
        }
        match &self.department {
            Some(DepartmentFilter::Unresolved) => return None,
            Some(DepartmentFilter::Resolved { names, rank }) => {
                let keys = std::iter::repeat_n("?", names.len())
                    .collect::<Vec<_>>()
                    .join(", ");
                for n in names {
                    bind.push(Value::Text((*n).to_string()));
                }
                let rank_sql = match rank {
                    RankConstraint::Any => String::new(),
                    RankConstraint::Exactly(n) => {
                        bind.push(Value::Integer(*n));
                        bind.push(Value::Text(n.to_string()));
                        " AND ((p.type = 'integer' AND p.value = ?)
                               OR (p.type = 'text' AND trim(p.value) = ?))"
                            .to_string()
                    }
                    RankConstraint::AtLeast(n) => {
                        bind.push(Value::Integer(*n));
                        bind.push(Value::Integer(*n));
                        " AND ((p.type = 'integer' AND p.value >= ?)
                               OR (p.type = 'text'
                                   AND trim(p.value) <> ''
                                   AND trim(p.value) NOT GLOB '*[^0-9]*'
                                   AND CAST(trim(p.value) AS INTEGER) >= ?))"
                            .to_string()
                    }
                };
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(
                        CASE WHEN json_valid(department_preferences)
                             THEN department_preferences ELSE '{{}}' END) p
                     WHERE p.key IN ({keys}){rank_sql})"
                ));
            }
            None => {}
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        Some((sql, bind))
    }
}

/// One page of a result set, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub num_pages: usize,
    pub page_size: usize,
    pub count: usize,
}

impl Page {
    /// Non-integer or missing input yields page 1; any out-of-range integer
    /// yields the last page.
    pub fn resolve(count: usize, page_size: usize, raw: Option<&str>) -> Page {
        let page_size = page_size.max(1);
        let num_pages = count.div_ceil(page_size).max(1);
        let number = match raw.map(|s| s.trim().parse::<i64>()) {
            None | Some(Err(_)) => 1,
            Some(Ok(n)) if n >= 1 && (n as usize) <= num_pages => n as usize,
            Some(Ok(_)) => num_pages,
        };
        Page {
            number,
            num_pages,
            page_size,
            count,
        }
    }

    pub fn offset(&self) -> usize {
        (self.number - 1) * self.page_size
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn start_index(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.offset() + 1
        }
    }

    pub fn end_index(&self) -> usize {
        if self.number == self.num_pages {
            self.count
        } else {
            self.number * self.page_size
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "number": self.number,
            "numPages": self.num_pages,
            "pageSize": self.page_size,
            "hasNext": self.has_next(),
            "hasPrevious": self.has_previous(),
            "startIndex": self.start_index(),
            "endIndex": self.end_index(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionPage {
    pub rows: Vec<AdmissionRow>,
    pub page: Page,
    pub states: Vec<String>,
    pub districts: Vec<String>,
}

pub fn list_admissions(
    conn: &Connection,
    filters: &AdmissionFilters,
    page_size: usize,
) -> Result<AdmissionPage> {
    let (rows, page) = match filters.where_clause() {
        None => (Vec::new(), Page::resolve(0, page_size, filters.page.as_deref())),
        Some((where_sql, bind)) => {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM admissions{where_sql}"),
                params_from_iter(bind.iter()),
                |r| r.get(0),
            )?;
            let page = Page::resolve(count.max(0) as usize, page_size, filters.page.as_deref());
            let sql = format!(
                "SELECT {} FROM admissions{} ORDER BY {} LIMIT ? OFFSET ?",
                store::admission_columns(),
                where_sql,
                filters.sort.order_by()
            );
            let mut all_bind = bind;
            all_bind.push(Value::Integer(page.page_size as i64));
            all_bind.push(Value::Integer(page.offset() as i64));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(all_bind), store::row_to_admission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            (rows, page)
        }
    };

    let (states, districts) = if matches!(filters.country, Some(CountryFilter::India { .. })) {
        (
            distinct_india_values(conn, "state")?,
            distinct_india_values(conn, "district")?,
        )
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(AdmissionPage {
        rows,
        page,
        states,
        districts,
    })
}

fn distinct_india_values(conn: &Connection, col: &str) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM admissions
         WHERE lower(country) = 'india' AND {col} IS NOT NULL AND {col} <> ''
         ORDER BY {col}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn paginator_counts_pages() {
        let p = Page::resolve(120, 50, None);
        assert_eq!(p.num_pages, 3);
        assert_eq!(p.number, 1);
        let last = Page::resolve(120, 50, Some("3"));
        assert_eq!(last.end_index() - last.start_index() + 1, 20);
        let even = Page::resolve(100, 50, Some("2"));
        assert_eq!(even.end_index() - even.start_index() + 1, 50);
    }

    #[test]
    fn paginator_clamps_and_defaults() {
        assert_eq!(Page::resolve(120, 50, Some("99")).number, 3);
        assert_eq!(Page::resolve(120, 50, Some("0")).number, 3);
        assert_eq!(Page::resolve(120, 50, Some("-2")).number, 3);
        assert_eq!(Page::resolve(120, 50, Some("abc")).number, 1);
        let empty = Page::resolve(0, 50, Some("4"));
        assert_eq!((empty.number, empty.num_pages), (1, 1));
        assert_eq!(empty.start_index(), 0);
        assert_eq!(empty.end_index(), 0);
    }

    #[test]
    fn bad_numbers_and_dates_are_ignored() {
        let f = AdmissionFilters::from_params(&params(&[
            ("cutoff_from", "abc"),
            ("cutoff_to", "190.5"),
            ("date_from", "2024-13-40"),
            ("date_to", "2024-06-01"),
        ]));
        assert_eq!(f.cutoff_from, None);
        assert_eq!(f.cutoff_to, Some(Decimal::new(1905, 1)));
        assert_eq!(f.date_from, None);
        assert_eq!(f.date_to, NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[test]
    fn unknown_sort_falls_back_to_newest_first() {
        assert_eq!(SortKey::parse("email"), SortKey::CreatedAtDesc);
        assert_eq!(SortKey::parse("-cutoff_marks"), SortKey::CutoffMarksDesc);
        let f = AdmissionFilters::from_params(&params(&[]));
        assert_eq!(f.sort, SortKey::CreatedAtDesc);
    }

    #[test]
    fn state_and_district_only_apply_for_india() {
        let f = AdmissionFilters::from_params(&params(&[
            ("country_filter", "Others"),
            ("state_filter", "Kerala"),
        ]));
        assert_eq!(f.country, Some(CountryFilter::Others));
        let f = AdmissionFilters::from_params(&params(&[
            ("country_filter", "Mars"),
            ("state_filter", "Kerala"),
        ]));
        assert_eq!(f.country, None);
    }

    #[test]
    fn department_resolution_and_rank() {
        let f = AdmissionFilters::from_params(&params(&[("dept", "B.E (CSE)"), ("preference", "3+")]));
        assert_eq!(
            f.department,
            Some(DepartmentFilter::Resolved {
                names: vec!["B.E (CSE) - Computer Science and Engineering"],
                rank: RankConstraint::AtLeast(3),
            })
        );
        let f = AdmissionFilters::from_params(&params(&[("dept", "Nope")]));
        assert_eq!(f.department, Some(DepartmentFilter::Unresolved));
        assert!(f.where_clause().is_none());
        assert_eq!(RankConstraint::parse("7"), RankConstraint::Any);
    }

    #[test]
    fn no_filters_means_no_where() {
        let f = AdmissionFilters::from_params(&params(&[("search", ""), ("accommodation_type", "boat")]));
        let (sql, bind) = f.where_clause().expect("not forced empty");
        assert!(sql.is_empty());
        assert!(bind.is_empty());
    }

    fn temp_db() -> Connection {
        let ws = std::env::temp_dir().join(format!(
            "admissiond-query-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        crate::db::open_db(&ws).expect("open db")
    }

    fn insert(conn: &Connection, changes: Vec<(&'static str, crate::model::FieldValue)>) -> i64 {
        crate::store::insert_admission(conn, changes).expect("insert")
    }

    fn matching(conn: &Connection, pairs: &[(&str, &str)]) -> Vec<i64> {
        let filters = AdmissionFilters::from_params(&params(pairs));
        let mut out: Vec<i64> = list_admissions(conn, &filters, 100)
            .expect("list")
            .rows
            .iter()
            .map(|r| r.id)
            .collect();
        out.sort();
        out
    }

    #[test]
    fn cutoff_bounds_are_inclusive() {
        use crate::model::FieldValue;
        let conn = temp_db();
        let low = insert(&conn, vec![("cutoff_marks", FieldValue::Decimal(Decimal::new(150, 0)))]);
        let mid = insert(&conn, vec![("cutoff_marks", FieldValue::Decimal(Decimal::new(17550, 2)))]);
        let high = insert(&conn, vec![("cutoff_marks", FieldValue::Decimal(Decimal::new(200, 0)))]);
        let _none = insert(&conn, vec![]);

        assert_eq!(
            matching(&conn, &[("cutoff_from", "150"), ("cutoff_to", "175.5")]),
            vec![low, mid]
        );
        assert_eq!(matching(&conn, &[("cutoff_from", "175.50")]), vec![mid, high]);
        assert_eq!(matching(&conn, &[("cutoff_to", "150.00")]), vec![low]);
        assert!(matching(&conn, &[("cutoff_from", "200.01")]).is_empty());
    }

    #[test]
    fn date_bounds_include_records_on_either_day() {
        let conn = temp_db();
        let mut pks = Vec::new();
        for stamp in [
            "2024-05-31T23:59:59.999999Z",
            "2024-06-01T00:00:00.000000Z",
            "2024-06-15T12:00:00.000000Z",
            "2024-06-30T23:59:59.999999Z",
            "2024-07-01T00:00:00.000000Z",
        ] {
            let pk = insert(&conn, vec![]);
            conn.execute(
                "UPDATE admissions SET created_at = ? WHERE id = ?",
                (stamp, pk),
            )
            .expect("stamp");
            pks.push(pk);
        }
        assert_eq!(
            matching(&conn, &[("date_from", "2024-06-01"), ("date_to", "2024-06-30")]),
            pks[1..4].to_vec()
        );
        assert_eq!(
            matching(&conn, &[("date_from", "2024-06-15"), ("date_to", "2024-06-15")]),
            vec![pks[2]]
        );
        assert_eq!(matching(&conn, &[("date_to", "2024-05-31")]), vec![pks[0]]);
        assert_eq!(matching(&conn, &[("date_from", "2024-07-01")]), vec![pks[4]]);
    }

    #[test]
    fn accommodation_branches() {
        use crate::model::FieldValue;
        let conn = temp_db();
        let yes_no = |hostel: &str, bus: &str| {
            vec![
                ("hostel_needed", FieldValue::text(hostel)),
                ("bus_needed", FieldValue::text(bus)),
            ]
        };
        let neither = insert(&conn, yes_no("no", "no"));
        let bus_only = insert(&conn, yes_no("no", "yes"));
        let hostel_only = insert(&conn, yes_no("yes", "no"));
        let both = insert(&conn, yes_no("yes", "yes"));
        let _unset = insert(&conn, vec![("bus_needed", FieldValue::text("no"))]);

        assert_eq!(
            matching(&conn, &[("accommodation_type", "transport")]),
            vec![bus_only, both]
        );
        assert_eq!(
            matching(&conn, &[("accommodation_type", "hostel")]),
            vec![hostel_only, both]
        );
        assert_eq!(
            matching(&conn, &[("accommodation_type", "not_needed")]),
            vec![neither]
        );
    }

    #[test]
    fn status_filter_ignores_case() {
        use crate::model::FieldValue;
        let conn = temp_db();
        let enquired = insert(&conn, vec![]);
        let admitted = insert(&conn, vec![("admission_status", FieldValue::text("admitted"))]);
        let left = insert(&conn, vec![("admission_status", FieldValue::text("left"))]);

        assert_eq!(matching(&conn, &[("status", "ADMITTED")]), vec![admitted]);
        assert_eq!(matching(&conn, &[("status", "enquired")]), vec![enquired]);
        assert_eq!(matching(&conn, &[("status", "Left")]), vec![left]);
        assert!(matching(&conn, &[("status", "graduated")]).is_empty());
    }

    #[test]
    fn rank_filters_match_integer_and_string_ranks() {
        use crate::model::FieldValue;
        let conn = temp_db();
        let prefs = |dept: &str, rank: serde_json::Value| {
            let mut map = serde_json::Map::new();
            map.insert(dept.to_string(), rank);
            vec![("department_preferences", FieldValue::Json(serde_json::Value::Object(map)))]
        };
        let cse = "B.E (CSE) - Computer Science and Engineering";
        let int_two = insert(&conn, prefs(cse, json!(2)));
        let str_two = insert(&conn, prefs(cse, json!("2")));
        let int_three = insert(&conn, prefs(cse, json!(3)));
        let str_four = insert(&conn, prefs(cse, json!("4")));
        let int_four = insert(&conn, prefs(cse, json!(4)));
        let _other_dept = insert(&conn, prefs("MBA", json!(5)));
        let _blank = insert(&conn, prefs(cse, json!("")));

        assert_eq!(
            matching(&conn, &[("dept", "B.E (CSE)"), ("preference", "3+")]),
            vec![int_three, str_four, int_four]
        );
        assert_eq!(
            matching(&conn, &[("dept", "B.E (CSE)"), ("preference", "2")]),
            vec![int_two, str_two]
        );
        assert_eq!(
            matching(&conn, &[("dept", "B.E (CSE)"), ("preference", "3")]),
            vec![int_three]
        );
    }
}
