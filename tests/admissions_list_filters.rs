mod test_support;

use serde_json::json;
use std::io::{BufReader, Write};
use std::process::{ChildStdin, ChildStdout};
use test_support::{create_applicant, personal_form, request_ok, spawn_sidecar, temp_dir};

const CSE: &str = "B.E (CSE) - Computer Science and Engineering";

fn set_field(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    pk: i64,
    field: &str,
    value: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "admissions.update",
        json!({ "pk": pk, "field_name": field, "new_value": value }),
    );
}

fn ids(result: &serde_json::Value) -> Vec<i64> {
    let mut out: Vec<i64> = result["admissions"]
        .as_array()
        .expect("admissions")
        .iter()
        .filter_map(|a| a["id"].as_i64())
        .collect();
    out.sort();
    out
}

#[test]
fn department_preference_filter_resolves_short_labels() {
    let workspace = temp_dir("admissiond-list-dept");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = create_applicant(&mut stdin, &mut reader, "2", personal_form(1));
    let second = create_applicant(&mut stdin, &mut reader, "3", personal_form(2));
    let third = create_applicant(&mut stdin, &mut reader, "4", personal_form(3));
    set_field(&mut stdin, &mut reader, "5", first, "department_preferences", &format!("{{\"{CSE}\": 1}}"));
    set_field(&mut stdin, &mut reader, "6", second, "department_preferences", &format!("{{\"{CSE}\": \"2\"}}"));
    set_field(&mut stdin, &mut reader, "7", third, "department_preferences", &json!({ "MBA": 1 }).to_string());

    let rank1 = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "admissions.list",
        json!({ "filters": { "dept": "B.E (CSE)", "preference": "1" } }),
    );
    assert_eq!(ids(&rank1), vec![first]);

    let rank2 = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "admissions.list",
        json!({ "dept": "b.e(cse)", "preference": 2 }),
    );
    assert_eq!(ids(&rank2), vec![second]);

    let any = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "admissions.list",
        json!({ "filters": { "dept": CSE.to_string() } }),
    );
    assert_eq!(ids(&any), vec![first, second]);

    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "admissions.list",
        json!({ "filters": { "dept": "Astrophysics" } }),
    );
    assert_eq!(unknown["count"], json!(0));
    assert_eq!(unknown["page"]["numPages"], json!(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn filters_combine_conjunctively() {
    let workspace = temp_dir("admissiond-list-conjunctive");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let a = create_applicant(&mut stdin, &mut reader, "2", personal_form(1));
    let b = create_applicant(&mut stdin, &mut reader, "3", personal_form(2));
    let c = create_applicant(&mut stdin, &mut reader, "4", personal_form(3));
    set_field(&mut stdin, &mut reader, "5", a, "community", "BC");
    set_field(&mut stdin, &mut reader, "6", a, "hostel_needed", "yes");
    set_field(&mut stdin, &mut reader, "7", b, "community", "BC");
    set_field(&mut stdin, &mut reader, "8", b, "hostel_needed", "no");
    set_field(&mut stdin, &mut reader, "9", c, "community", "MBC");
    set_field(&mut stdin, &mut reader, "10", c, "hostel_needed", "yes");
    set_field(&mut stdin, &mut reader, "11", c, "country", "Sri Lanka");

    let both = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "admissions.list",
        json!({ "filters": { "community": "BC", "accommodation_type": "hostel" } }),
    );
    assert_eq!(ids(&both), vec![a]);

    let india = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "admissions.list",
        json!({ "filters": {
            "country_filter": "India",
            "state_filter": "tamil nadu",
            "district_filter": "",
        } }),
    );
    assert_eq!(ids(&india), vec![a, b]);
    assert_eq!(india["states"], json!(["Tamil Nadu"]));
    assert_eq!(india["districts"], json!(["Coimbatore"]));

    let others = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "admissions.list",
        json!({ "filters": { "country_filter": "Others", "state_filter": "Kerala" } }),
    );
    assert_eq!(ids(&others), vec![c]);
    assert_eq!(others["states"], json!([]));

    let ignored = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "admissions.list",
        json!({ "filters": { "cutoff_from": "abc", "date_to": "yesterday", "sort": "bogus" } }),
    );
    assert_eq!(ignored["count"], json!(3));
    assert_eq!(ignored["sort"], json!("-created_at"));
    assert_eq!(ids(&ignored), vec![a, b, c]);
    assert_eq!(ignored["admissions"][0]["id"], json!(c));

    let searched = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "admissions.list",
        json!({ "filters": { "search": "STUDENT2@" } }),
    );
    assert_eq!(ids(&searched), vec![b]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn submit_marks(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    pk: i64,
    maths: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "wizard.marks",
        json!({ "pk": pk, "form": {
            "tenth_total": "450",
            "tenth_percentage": "90",
            "qualification": "12th",
            "twelfth_total": "560",
            "twelfth_major": "Computer Science",
            "maths_marks": maths,
            "physics_marks": "100",
            "chemistry_marks": "100",
        }}),
    );
}

#[test]
fn cutoff_dates_accommodation_status_and_rank_filters() {
    let workspace = temp_dir("admissiond-list-ranges");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let a = create_applicant(&mut stdin, &mut reader, "2", personal_form(1));
    let b = create_applicant(&mut stdin, &mut reader, "3", personal_form(2));
    let c = create_applicant(&mut stdin, &mut reader, "4", personal_form(3));
    let d = create_applicant(&mut stdin, &mut reader, "5", personal_form(4));

    // Cutoffs: a 200, b 190, c 180.
    submit_marks(&mut stdin, &mut reader, "6", a, "100");
    submit_marks(&mut stdin, &mut reader, "7", b, "90");
    submit_marks(&mut stdin, &mut reader, "8", c, "80");

    let list = |stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str, filters: serde_json::Value| {
        ids(&request_ok(stdin, reader, id, "admissions.list", json!({ "filters": filters })))
    };

    assert_eq!(
        list(&mut stdin, &mut reader, "9", json!({ "cutoff_from": "180", "cutoff_to": "190" })),
        vec![b, c]
    );
    assert_eq!(
        list(&mut stdin, &mut reader, "10", json!({ "cutoff_from": "190.00" })),
        vec![a, b]
    );

    let today = chrono::Utc::now().date_naive();
    let day = |d: chrono::NaiveDate| d.format("%Y-%m-%d").to_string();
    assert_eq!(
        list(&mut stdin, &mut reader, "11", json!({ "date_from": day(today), "date_to": day(today) })),
        vec![a, b, c, d]
    );
    let yesterday = today.pred_opt().expect("yesterday");
    let tomorrow = today.succ_opt().expect("tomorrow");
    assert!(list(&mut stdin, &mut reader, "12", json!({ "date_to": day(yesterday) })).is_empty());
    assert!(list(&mut stdin, &mut reader, "13", json!({ "date_from": day(tomorrow) })).is_empty());

    set_field(&mut stdin, &mut reader, "14", a, "hostel_needed", "no");
    set_field(&mut stdin, &mut reader, "15", a, "bus_needed", "no");
    set_field(&mut stdin, &mut reader, "16", b, "hostel_needed", "no");
    set_field(&mut stdin, &mut reader, "17", b, "bus_needed", "yes");
    set_field(&mut stdin, &mut reader, "18", c, "hostel_needed", "yes");
    set_field(&mut stdin, &mut reader, "19", c, "bus_needed", "no");
    assert_eq!(
        list(&mut stdin, &mut reader, "20", json!({ "accommodation_type": "transport" })),
        vec![b]
    );
    assert_eq!(
        list(&mut stdin, &mut reader, "21", json!({ "accommodation_type": "not_needed" })),
        vec![a]
    );

    set_field(&mut stdin, &mut reader, "22", a, "department_preferences", &format!("{{\"{CSE}\": 3}}"));
    set_field(&mut stdin, &mut reader, "23", b, "department_preferences", &format!("{{\"{CSE}\": \"4\"}}"));
    set_field(&mut stdin, &mut reader, "24", c, "department_preferences", &format!("{{\"{CSE}\": 2}}"));
    set_field(&mut stdin, &mut reader, "25", d, "department_preferences", &format!("{{\"{CSE}\": \"2\"}}"));
    assert_eq!(
        list(&mut stdin, &mut reader, "26", json!({ "dept": "B.E (CSE)", "preference": "3+" })),
        vec![a, b]
    );
    assert_eq!(
        list(&mut stdin, &mut reader, "27", json!({ "dept": "B.E (CSE)", "preference": "2" })),
        vec![c, d]
    );

    set_field(&mut stdin, &mut reader, "28", d, "admission_status", "Admitted");
    assert_eq!(
        list(&mut stdin, &mut reader, "29", json!({ "status": "admitted" })),
        vec![d]
    );
    assert_eq!(
        list(&mut stdin, &mut reader, "30", json!({ "status": "ENQUIRED" })),
        vec![a, b, c]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn pagination_of_120_records_gives_three_pages() {
    let workspace = temp_dir("admissiond-list-pages");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for n in 0..120 {
        let _ = create_applicant(&mut stdin, &mut reader, &format!("c{n}"), personal_form(n));
    }

    let first = request_ok(&mut stdin, &mut reader, "2", "admissions.list", json!({}));
    assert_eq!(first["count"], json!(120));
    assert_eq!(first["page"]["numPages"], json!(3));
    assert_eq!(first["admissions"].as_array().map(|a| a.len()), Some(50));
    assert_eq!(first["page"]["hasNext"], json!(true));
    assert!(first["fields"].as_array().is_some_and(|f| !f.is_empty()));

    let last = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "admissions.list",
        json!({ "filters": { "page": "3" } }),
    );
    assert_eq!(last["admissions"].as_array().map(|a| a.len()), Some(20));
    assert_eq!(last["page"]["startIndex"], json!(101));
    assert_eq!(last["page"]["endIndex"], json!(120));

    let beyond = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "admissions.list",
        json!({ "filters": { "page": "99" } }),
    );
    assert_eq!(beyond["page"]["number"], json!(3));

    let junk = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "admissions.list",
        json!({ "filters": { "page": "two" } }),
    );
    assert_eq!(junk["page"]["number"], json!(1));

    // Sorting by name ascending puts Student 000 first.
    let by_name = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "admissions.list",
        json!({ "filters": { "sort": "student_name" } }),
    );
    assert_eq!(by_name["admissions"][0]["student_name"], json!("Student 000"));

    stdin.flush().expect("flush");
    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
