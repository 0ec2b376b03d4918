//! Records owned by the surrounding school application.
//!
//! Field names follow the application's JSON shape. Each struct flattens an `extra` map so a
//! column the struct does not name still survives an import merge.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Entity;

pub type ExtraFields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub level: String,
    pub teacher_id: Option<String>,
    pub teacher_name: Option<String>,
    pub capacity: Option<u32>,
    pub current_occupancy: Option<u32>,
    pub room: Option<String>,
    pub academic_year: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentDocument {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub status: String,
    pub file_name: Option<String>,
    pub updated_at: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Student {
    pub id: String,
    pub registration_number: Option<String>,
    pub registration_date: String,
    pub last_name: String,
    pub first_name: String,
    pub dob: String,
    pub gender: String,
    pub nationality: String,
    pub birth_place: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub grade_level: String,
    pub previous_school: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub medical_info: String,
    pub status: String,
    /// Uploaded attachments; no import format can express these.
    pub documents: Vec<StudentDocument>,
    pub photo_url: Option<String>,
    pub class_id: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Teacher {
    pub id: String,
    pub registration_number: Option<String>,
    pub last_name: String,
    pub first_name: String,
    pub subject: String,
    pub phone: String,
    pub email: String,
    pub status: String,
    pub hire_date: Option<String>,
    pub specialization: Option<String>,
    pub subjects: Vec<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub qualifications: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Grades have no identity outside the (student, evaluation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GradeKey {
    pub student_id: String,
    pub evaluation_id: String,
}

impl GradeKey {
    pub fn new(student_id: impl Into<String>, evaluation_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            evaluation_id: evaluation_id.into(),
        }
    }
}

impl fmt::Display for GradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.student_id, self.evaluation_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Grade {
    pub id: Option<String>,
    pub student_id: String,
    pub student_name: Option<String>,
    pub evaluation_id: String,
    pub evaluation_title: Option<String>,
    pub subject: Option<String>,
    pub score: Option<f64>,
    pub max_grade: Option<f64>,
    pub date: Option<String>,
    pub teacher: Option<String>,
    pub comment: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancialTransaction {
    pub id: String,
    pub date: String,
    pub description: String,
    pub student_name: String,
    pub grade_level: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub status: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub unit: String,
    pub stock_status: String,
    pub last_updated: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Application accounts keep the snake_case names of the auth backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub custom_permissions: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Entity for SchoolClass {
    const COLLECTION: &'static str = "classes";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Student {
    const COLLECTION: &'static str = "students";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Teacher {
    const COLLECTION: &'static str = "teachers";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for Grade {
    const COLLECTION: &'static str = "grades";
    type Key = GradeKey;

    fn key(&self) -> GradeKey {
        GradeKey::new(self.student_id.clone(), self.evaluation_id.clone())
    }

    // Ids may themselves contain '/', so the display form is ambiguous.
    fn storage_key(key: &GradeKey) -> String {
        Value::from(vec![key.student_id.as_str(), key.evaluation_id.as_str()]).to_string()
    }
}

impl Entity for FinancialTransaction {
    const COLLECTION: &'static str = "transactions";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for InventoryItem {
    const COLLECTION: &'static str = "inventory";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}
