use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::model::AdmissionRow;

/// Columns whose change forces an `unpaid_fee` recomputation.
pub const FEE_COMPONENT_FIELDS: [&str; 6] = [
    "college_fee",
    "hostel_fee",
    "bus_fee",
    "other_fee",
    "paid_fee",
    "concession_amount",
];

pub fn is_fee_component(field: &str) -> bool {
    FEE_COMPONENT_FIELDS.contains(&field)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeComponents {
    pub college_fee: Option<Decimal>,
    pub hostel_fee: Option<Decimal>,
    pub bus_fee: Option<Decimal>,
    pub other_fee: Option<Decimal>,
    pub paid_fee: Option<Decimal>,
    pub concession_amount: Option<Decimal>,
}

impl FeeComponents {
    pub fn from_row(row: &AdmissionRow) -> Self {
        FeeComponents {
            college_fee: row.decimal("college_fee"),
            hostel_fee: row.decimal("hostel_fee"),
            bus_fee: row.decimal("bus_fee"),
            other_fee: row.decimal("other_fee"),
            paid_fee: row.decimal("paid_fee"),
            concession_amount: row.decimal("concession_amount"),
        }
    }

    pub fn set(&mut self, field: &str, value: Option<Decimal>) {
        match field {
            "college_fee" => self.college_fee = value,
            "hostel_fee" => self.hostel_fee = value,
            "bus_fee" => self.bus_fee = value,
            "other_fee" => self.other_fee = value,
            "paid_fee" => self.paid_fee = value,
            "concession_amount" => self.concession_amount = value,
            _ => {}
        }
    }

    /// None when the sum leaves the representable range.
    pub fn total_due(&self) -> Option<Decimal> {
        z(self.college_fee)
            .checked_add(z(self.hostel_fee))?
            .checked_add(z(self.bus_fee))?
            .checked_add(z(self.other_fee))
    }

    pub fn deductions(&self) -> Option<Decimal> {
        z(self.paid_fee).checked_add(z(self.concession_amount))
    }

    /// (college + hostel + bus + other) - (paid + concession), missing as zero.
    pub fn unpaid(&self) -> Option<Decimal> {
        self.total_due()?.checked_sub(self.deductions()?)
    }
}

fn z(v: Option<Decimal>) -> Decimal {
    v.unwrap_or(Decimal::ZERO)
}

/// 12th-stream cutoff: maths + physics/2 + chemistry/2, exact.
pub fn twelfth_cutoff(maths: Decimal, physics: Decimal, chemistry: Decimal) -> Option<Decimal> {
    let two = Decimal::from(2);
    maths
        .checked_add(physics.checked_div(two)?)?
        .checked_add(chemistry.checked_div(two)?)
}

/// Diploma holders carry a flat zero cutoff.
pub fn diploma_cutoff() -> Decimal {
    Decimal::ZERO
}

/// Public 12-hex-char student key derived from name and mobile.
pub fn student_fingerprint(name: &str, mobile: &str) -> String {
    let source = format!("{}|{}", name.trim().to_lowercase(), mobile.trim());
    let digest = Sha256::digest(source.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}
