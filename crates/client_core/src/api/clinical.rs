use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use shared::{
    domain::{AppointmentId, InvoiceId, InvoiceStatus, PatientId, PrescriptionId, UserId},
    protocol::{AppointmentDto, InvoiceDto, ListResponse, PatientDto, PrescriptionDto},
};

use super::{push_opt, ApiClient, Query};
use crate::error::ClientResult;

impl ApiClient {
    pub async fn appointments(&self) -> ClientResult<Vec<AppointmentDto>> {
        let list: ListResponse<AppointmentDto> =
            self.get_json("/appointments", &Query::new()).await?;
        Ok(list.into_items())
    }

    /// Appointments overlapping `[start, end)`, as used by the calendar view.
    pub async fn appointments_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ClientResult<Vec<AppointmentDto>> {
        let query: Query = vec![
            ("start", start.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ];
        let list: ListResponse<AppointmentDto> = self.get_json("/appointments", &query).await?;
        Ok(list.into_items())
    }

    pub async fn appointments_for_doctor(
        &self,
        doctor_id: UserId,
    ) -> ClientResult<Vec<AppointmentDto>> {
        let list: ListResponse<AppointmentDto> = self
            .get_json(&format!("/appointments/doctor/{doctor_id}"), &Query::new())
            .await?;
        Ok(list.into_items())
    }

    pub async fn appointments_for_patient(
        &self,
        patient_id: PatientId,
    ) -> ClientResult<Vec<AppointmentDto>> {
        let list: ListResponse<AppointmentDto> = self
            .get_json(&format!("/appointments/patient/{patient_id}"), &Query::new())
            .await?;
        Ok(list.into_items())
    }

    pub async fn appointment(&self, id: AppointmentId) -> ClientResult<AppointmentDto> {
        self.get_json(&format!("/appointments/{id}"), &Query::new())
            .await
    }

    pub async fn create_appointment(
        &self,
        appointment: &AppointmentDto,
    ) -> ClientResult<AppointmentDto> {
        let mut payload = appointment.clone();
        payload.id = None;
        self.send_json(Method::POST, "/appointments", &payload).await
    }

    pub async fn update_appointment(
        &self,
        id: AppointmentId,
        appointment: &AppointmentDto,
    ) -> ClientResult<AppointmentDto> {
        self.send_json(Method::PUT, &format!("/appointments/{id}"), appointment)
            .await
    }

    /// Appointments are cancelled, never deleted.
    pub async fn cancel_appointment(&self, id: AppointmentId) -> ClientResult<AppointmentDto> {
        self.post_action_json(&format!("/appointments/{id}/cancel"))
            .await
    }

    pub async fn patients(&self) -> ClientResult<Vec<PatientDto>> {
        let list: ListResponse<PatientDto> = self.get_json("/patients", &Query::new()).await?;
        Ok(list.into_items())
    }

    pub async fn patient(&self, id: PatientId) -> ClientResult<PatientDto> {
        self.get_json(&format!("/patients/{id}"), &Query::new()).await
    }

    pub async fn create_patient(&self, patient: &PatientDto) -> ClientResult<PatientDto> {
        let mut payload = patient.clone();
        payload.id = None;
        self.send_json(Method::POST, "/patients", &payload).await
    }

    pub async fn update_patient(
        &self,
        id: PatientId,
        patient: &PatientDto,
    ) -> ClientResult<PatientDto> {
        self.send_json(Method::PUT, &format!("/patients/{id}"), patient)
            .await
    }

    pub async fn delete_patient(&self, id: PatientId) -> ClientResult<()> {
        self.delete(&format!("/patients/{id}")).await
    }

    pub async fn prescriptions(
        &self,
        patient_id: Option<PatientId>,
        doctor_id: Option<UserId>,
    ) -> ClientResult<Vec<PrescriptionDto>> {
        let mut query = Query::new();
        push_opt(&mut query, "patientId", patient_id);
        push_opt(&mut query, "doctorId", doctor_id);
        let list: ListResponse<PrescriptionDto> = self.get_json("/prescriptions", &query).await?;
        Ok(list.into_items())
    }

    pub async fn prescription(&self, id: PrescriptionId) -> ClientResult<PrescriptionDto> {
        self.get_json(&format!("/prescriptions/{id}"), &Query::new())
            .await
    }

    pub async fn create_prescription(
        &self,
        prescription: &PrescriptionDto,
    ) -> ClientResult<PrescriptionDto> {
        let mut payload = prescription.clone();
        payload.id = None;
        self.send_json(Method::POST, "/prescriptions", &payload).await
    }

    pub async fn update_prescription(
        &self,
        id: PrescriptionId,
        prescription: &PrescriptionDto,
    ) -> ClientResult<PrescriptionDto> {
        self.send_json(Method::PUT, &format!("/prescriptions/{id}"), prescription)
            .await
    }

    pub async fn delete_prescription(&self, id: PrescriptionId) -> ClientResult<()> {
        self.delete(&format!("/prescriptions/{id}")).await
    }

    pub async fn invoices(
        &self,
        patient_id: Option<PatientId>,
        status: Option<InvoiceStatus>,
    ) -> ClientResult<Vec<InvoiceDto>> {
        let mut query = Query::new();
        push_opt(&mut query, "patientId", patient_id);
        push_opt(&mut query, "status", status);
        let list: ListResponse<InvoiceDto> = self.get_json("/invoices", &query).await?;
        Ok(list.into_items())
    }

    pub async fn invoice(&self, id: InvoiceId) -> ClientResult<InvoiceDto> {
        self.get_json(&format!("/invoices/{id}"), &Query::new()).await
    }

    pub async fn create_invoice(&self, invoice: &InvoiceDto) -> ClientResult<InvoiceDto> {
        let mut payload = invoice.clone();
        payload.id = None;
        self.send_json(Method::POST, "/invoices", &payload).await
    }

    pub async fn update_invoice(
        &self,
        id: InvoiceId,
        invoice: &InvoiceDto,
    ) -> ClientResult<InvoiceDto> {
        self.send_json(Method::PUT, &format!("/invoices/{id}"), invoice)
            .await
    }

    pub async fn delete_invoice(&self, id: InvoiceId) -> ClientResult<()> {
        self.delete(&format!("/invoices/{id}")).await
    }

    pub async fn mark_invoice_paid(&self, id: InvoiceId) -> ClientResult<InvoiceDto> {
        self.post_action_json(&format!("/invoices/{id}/pay")).await
    }

    pub async fn mark_invoice_sent(&self, id: InvoiceId) -> ClientResult<InvoiceDto> {
        self.post_action_json(&format!("/invoices/{id}/send")).await
    }
}
