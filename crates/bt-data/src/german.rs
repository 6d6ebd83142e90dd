//! Column layout of the Statlog German Credit data (`german.data`).
//!
//! Twenty attributes followed by the outcome: `1` = good, `2` = bad credit.
//! Bad credit is the positive class.

use bt_types::Schema;

pub const GERMAN_CREDIT_FILE: &str = "german.data";

pub fn german_credit_schema() -> Schema {
    Schema::new("credit_risk", "2")
        .categorical("checking_status", vec!["A11", "A12", "A13", "A14"])
        .integer("duration_months")
        .categorical("credit_history", vec!["A30", "A31", "A32", "A33", "A34"])
        .categorical(
            "purpose",
            vec!["A40", "A41", "A42", "A43", "A44", "A45", "A46", "A47", "A48", "A49", "A410"],
        )
        .integer("credit_amount")
        .categorical("savings", vec!["A61", "A62", "A63", "A64", "A65"])
        .categorical("employment_since", vec!["A71", "A72", "A73", "A74", "A75"])
        .integer("installment_rate")
        .categorical("personal_status_sex", vec!["A91", "A92", "A93", "A94", "A95"])
        .categorical("other_debtors", vec!["A101", "A102", "A103"])
        .integer("residence_since")
        .categorical("property", vec!["A121", "A122", "A123", "A124"])
        .integer("age_years")
        .categorical("other_installment_plans", vec!["A141", "A142", "A143"])
        .categorical("housing", vec!["A151", "A152", "A153"])
        .integer("existing_credits")
        .categorical("job", vec!["A171", "A172", "A173", "A174"])
        .integer("people_liable")
        .categorical("telephone", vec!["A191", "A192"])
        .categorical("foreign_worker", vec!["A201", "A202"])
        .categorical("credit_risk", vec!["1", "2"])
}
