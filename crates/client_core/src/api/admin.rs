use chrono::NaiveDate;
use reqwest::Method;
use shared::{
    domain::{Role, UserId},
    protocol::{
        AdminDashboardStats, AppointmentCounts, AppointmentDto, DoctorDashboardStats,
        ListResponse, RevenueOverview, SecretaryDashboardStats, UserDto, UserUpsert,
    },
};

use super::{push_opt, ApiClient, Query};
use crate::error::{ClientError, ClientResult};

impl ApiClient {
    pub async fn users(&self, role: Option<Role>) -> ClientResult<Vec<UserDto>> {
        let mut query = Query::new();
        push_opt(&mut query, "role", role);
        let list: ListResponse<UserDto> = self.get_json("/admin/users", &query).await?;
        Ok(list.into_items())
    }

    pub async fn user(&self, id: UserId) -> ClientResult<UserDto> {
        self.get_json(&format!("/admin/users/{id}"), &Query::new())
            .await
    }

    /// New accounts need a password; this is checked before anything is sent.
    pub async fn create_user(&self, user: &UserUpsert) -> ClientResult<UserDto> {
        let has_password = user
            .password
            .as_deref()
            .is_some_and(|password| !password.trim().is_empty());
        if !has_password {
            return Err(ClientError::Validation(
                "Password is required to create a user.".into(),
            ));
        }
        self.send_json(Method::POST, "/admin/users", user).await
    }

    /// A missing password leaves the stored one unchanged.
    pub async fn update_user(&self, id: UserId, user: &UserUpsert) -> ClientResult<UserDto> {
        self.send_json(Method::PUT, &format!("/admin/users/{id}"), user)
            .await
    }

    pub async fn delete_user(&self, id: UserId) -> ClientResult<()> {
        self.delete(&format!("/admin/users/{id}")).await
    }

    pub async fn doctors(&self) -> ClientResult<Vec<UserDto>> {
        let list: ListResponse<UserDto> = self.get_json("/staff/doctors", &Query::new()).await?;
        Ok(list.into_items())
    }

    pub async fn admin_stats(&self) -> ClientResult<AdminDashboardStats> {
        self.get_json("/admin/dashboard/stats", &Query::new()).await
    }

    pub async fn revenue_overview(&self, year: Option<i32>) -> ClientResult<RevenueOverview> {
        let mut query = Query::new();
        push_opt(&mut query, "year", year);
        self.get_json("/admin/dashboard/revenue-overview", &query)
            .await
    }

    pub async fn weekly_appointments(
        &self,
        start_date: Option<NaiveDate>,
    ) -> ClientResult<AppointmentCounts> {
        let mut query = Query::new();
        push_opt(
            &mut query,
            "startDate",
            start_date.map(|date| date.format("%Y-%m-%d")),
        );
        self.get_json("/admin/dashboard/weekly-appointments", &query)
            .await
    }

    pub async fn doctor_stats(&self) -> ClientResult<DoctorDashboardStats> {
        self.get_json("/doctor/dashboard/stats", &Query::new()).await
    }

    pub async fn doctor_today(&self) -> ClientResult<Vec<AppointmentDto>> {
        let list: ListResponse<AppointmentDto> = self
            .get_json("/doctor/dashboard/today-appointments", &Query::new())
            .await?;
        Ok(list.into_items())
    }

    pub async fn secretary_stats(&self) -> ClientResult<SecretaryDashboardStats> {
        self.get_json("/secretary/dashboard/stats", &Query::new())
            .await
    }

    pub async fn secretary_today(&self) -> ClientResult<Vec<AppointmentDto>> {
        let list: ListResponse<AppointmentDto> = self
            .get_json("/secretary/dashboard/today-appointments", &Query::new())
            .await?;
        Ok(list.into_items())
    }
}
