/// One entry of the controlled department vocabulary. `name` is the key
/// stored in preference mappings; `label` is the short display form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Department {
    pub name: &'static str,
    pub label: &'static str,
}

const fn d(name: &'static str, label: &'static str) -> Department {
    Department { name, label }
}

pub static UG_DEPARTMENTS: &[Department] = &[
    d("B.TECH (AI & DS) - Artificial Intelligence and Data Science", "B.TECH (AI & DS)"),
    d("B.TECH (IT) - Information Technology", "B.TECH (IT)"),
    d("B.TECH (CH) - Chemical Engineering", "B.TECH (CH)"),
    d("B.TECH (AE) - Agricultural Engineering", "B.TECH (AE)"),
    d("B.TECH (BT) - Bio Technology", "B.TECH (BT)"),
    d("B.E (ME) - Mechanical Engineering (Tamil Medium)", "B.E (ME-TM)"),
    d("B.E (ME) - Mechanical Engineering (English Medium)", "B.E (ME-EM)"),
    d("B.E (BME) - Biomedical Engineering", "B.E (BME)"),
    d(
        "B.E (CSE(IOT)) - Computer Science and Engineering (Internet Of Things)",
        "B.E (CSE-IOT)",
    ),
    d("B.E (CSE) - Computer Science and Engineering", "B.E (CSE)"),
    d("B.E (CSD) - Computer Science and Design", "B.E (CSD)"),
    d(
        "B.E (CSE(AI & ML)) - Computer Science and Engineering (AI & ML)",
        "B.E (CSE-AI&ML)",
    ),
    d(
        "B.E (CSE(CS)) - Computer Science and Engineering (Cyber Security)",
        "B.E (CSE-CS)",
    ),
    d("B.E (ECE) - Electronics and Communication Engineering", "B.E (ECE)"),
    d("B.E (CE) - Civil Engineering", "B.E (CE)"),
    d("B.E (EEE) - Electrical and Electronics Engineering", "B.E (EEE)"),
    d("B.E (RAE) - Robotics & Automation", "B.E (RAE)"),
    d("B.E (EIE) - Electronics and Instrumentation Engineering", "B.E (EIE)"),
    d("M.Tech (CSE) 5 Years Integrated Course", "M.Tech (CSE) 5 Yr"),
];

pub static PG_DEPARTMENTS: &[Department] = &[
    d("MBA", "MBA"),
    d("MCA", "MCA"),
    d("M.E. Computer Science", "M.E. CSE"),
    d("M.E. Applied Electronics", "M.E. App Elec"),
    d("M.E. Manufacturing Engineering", "M.E. Mfg Eng"),
    d("M.E. Environmental Engineering", "M.E. Env Eng"),
    d("M.E. Power Electronics and Drives", "M.E. PED"),
    d("M.E. Industrial Safety Engineering", "M.E. ISE"),
    d("M.E. Structural Engineering", "M.E. Str Eng"),
    d("M.TECH (CH) - Chemical Engineering", "M.TECH (CH)"),
];

pub fn all() -> impl Iterator<Item = &'static Department> {
    UG_DEPARTMENTS.iter().chain(PG_DEPARTMENTS.iter())
}

/// Lowercase with every space and underscore removed, so "AI & DS",
/// "AI&DS" and "ai_&_ds" compare equal.
pub fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonical names whose full name or short label matches `input` after
/// normalization. Empty when nothing matches.
pub fn resolve(input: &str) -> Vec<&'static str> {
    let wanted = normalize(input);
    if wanted.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<&'static str> = Vec::new();
    for dept in all() {
        if (normalize(dept.name) == wanted || normalize(dept.label) == wanted)
            && !out.contains(&dept.name)
        {
            out.push(dept.name);
        }
    }
    out
}
