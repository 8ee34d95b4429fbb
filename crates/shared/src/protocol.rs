use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AppointmentId, AppointmentStatus, ChatMessageKind, Gender, InvoiceId, InvoiceStatus,
    NotificationId, NotificationType, PatientId, PrescriptionId, Role, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Minimal identity kept alongside the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl UserSnapshot {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "type", default)]
    pub kind: ChatMessageKind,
    pub content: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ChatMessageKind::Chat,
            content: content.into(),
            sender: sender.into(),
            recipient: None,
            timestamp: None,
        }
    }

    pub fn to_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Join/leave announcement published when the messaging session starts or ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAnnouncement {
    pub sender: String,
    #[serde(rename = "type")]
    pub kind: ChatMessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NotificationId>,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl NotificationRecord {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: NotificationType::default(),
            title: title.into(),
            message: message.into(),
            created_at: None,
            read: false,
            reference_type: None,
            reference_id: None,
            sender: None,
            recipient: None,
        }
    }
}

/// Page envelope used by list endpoints backed by a pageable query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    pub size: u32,
    /// Zero-based page index as reported by the server.
    pub number: u32,
}

/// List endpoints answer either with a bare array or with a page envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Items(Vec<T>),
    Page(Page<T>),
}

impl<T> ListResponse<T> {
    pub fn total(&self) -> u64 {
        match self {
            ListResponse::Items(items) => items.len() as u64,
            ListResponse::Page(page) => page.total_elements,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            ListResponse::Items(items) => items,
            ListResponse::Page(page) => page.content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AppointmentId>,
    pub patient_id: PatientId,
    pub doctor_id: UserId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient_first_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient_last_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub doctor_first_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub doctor_last_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PatientId>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PrescriptionId>,
    pub patient_id: PatientId,
    pub doctor_id: UserId,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub prescription_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing)]
    pub patient_first_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient_last_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub doctor_first_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub doctor_last_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InvoiceId>,
    pub patient_id: PatientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<AppointmentId>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: f64,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient_first_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient_last_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Payload for creating or updating a staff account. `password` is
/// mandatory on create and optional on update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminDashboardStats {
    pub total_patients: u64,
    pub appointments_today: u64,
    pub monthly_revenue: f64,
    pub active_staff: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorDashboardStats {
    pub appointments_today: u64,
    pub total_patients: u64,
    pub pending_prescriptions: u64,
    pub next_appointment_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretaryDashboardStats {
    pub appointments_today: u64,
    pub pending_invoices: u64,
    pub registered_patients: u64,
    pub urgent_matters: u64,
}

/// Revenue keyed by month label (`"Jan" -> 1500.5`).
pub type RevenueOverview = BTreeMap<String, f64>;

/// Appointment counts keyed by day label (`"Mon" -> 5`).
pub type AppointmentCounts = BTreeMap<String, u64>;
