use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    guard::{require_login, require_role},
    load_settings, ClientError, ClinicClient,
};
use serde::Serialize;
use shared::{
    domain::{InvoiceStatus, NotificationId, PatientId, Role, UserId},
    protocol::{AppointmentDto, NotificationRecord, RegisterRequest},
};
use tracing_subscriber::EnvFilter;

mod live;

#[derive(Parser, Debug)]
#[command(name = "clinic", about = "Terminal client for the clinic server")]
struct Cli {
    /// Config file; `client.toml` in the working directory when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "SECRETARY")]
        role: Role,
    },
    Logout,
    Whoami,
    /// One page of the notification history, newest first.
    Notifications {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Read {
        id: i64,
    },
    ReadAll,
    /// Streams chat, notifications and connection changes until Ctrl-C.
    Listen,
    /// Line chat; `--to` sends privately.
    Chat {
        #[arg(long)]
        to: Option<String>,
    },
    Appointments {
        #[arg(long)]
        doctor: Option<i64>,
        #[arg(long)]
        patient: Option<i64>,
    },
    Patients,
    Prescriptions {
        #[arg(long)]
        patient: Option<i64>,
        #[arg(long)]
        doctor: Option<i64>,
    },
    Invoices {
        #[arg(long)]
        patient: Option<i64>,
        #[arg(long)]
        status: Option<InvoiceStatus>,
    },
    Users {
        #[arg(long)]
        role: Option<Role>,
    },
    Dashboard,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        match err.downcast_ref::<ClientError>() {
            Some(client_err) => {
                tracing::debug!("command failed: {client_err}");
                eprintln!("{}", client_err.user_message());
            }
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url.trim_end_matches('/').to_string();
    }
    let client = ClinicClient::open(settings).await?;

    match cli.command {
        Command::Login { email, password } => {
            let user = client.session.login(&email, &password).await?;
            println!("Logged in as {} ({})", user.display_name(), user.role);
        }
        Command::Register {
            first_name,
            last_name,
            email,
            password,
            role,
        } => {
            let request = RegisterRequest {
                first_name,
                last_name,
                email,
                password,
                role,
            };
            let user = client.session.register(&request).await?;
            println!("Registered {} ({})", user.display_name(), user.role);
        }
        Command::Logout => {
            client.session.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => match client.session.current_user().await {
            Some(user) => println!("{} <{}> {}", user.display_name(), user.email, user.role),
            None => println!("Not logged in"),
        },
        Command::Notifications { page } => {
            require_login(&client.session).await?;
            client.notifications.load_page(page).await?;
            let snapshot = client.notifications.snapshot().await;
            println!(
                "Page {} ({} of {} shown, {} unread)",
                snapshot.current_page,
                snapshot.records.len(),
                snapshot.total,
                snapshot.unread
            );
            for record in &snapshot.records {
                print_notification(record);
            }
        }
        Command::Read { id } => {
            require_login(&client.session).await?;
            mark_read(&client, NotificationId(id)).await?;
            println!("Notification {id} marked read");
        }
        Command::ReadAll => {
            require_login(&client.session).await?;
            client.notifications.mark_all_as_read().await?;
            println!("All notifications marked read");
        }
        Command::Listen => live::listen(&client).await?,
        Command::Chat { to } => live::chat(&client, to).await?,
        Command::Appointments { doctor, patient } => {
            require_login(&client.session).await?;
            let appointments = match (doctor, patient) {
                (Some(doctor), _) => client.api.appointments_for_doctor(UserId(doctor)).await?,
                (None, Some(patient)) => {
                    client.api.appointments_for_patient(PatientId(patient)).await?
                }
                (None, None) => client.api.appointments().await?,
            };
            print_appointments(&appointments);
        }
        Command::Patients => {
            require_login(&client.session).await?;
            print_json(&client.api.patients().await?)?;
        }
        Command::Prescriptions { patient, doctor } => {
            require_role(&client.session, &[Role::Admin, Role::Doctor]).await?;
            let prescriptions = client
                .api
                .prescriptions(patient.map(PatientId), doctor.map(UserId))
                .await?;
            print_json(&prescriptions)?;
        }
        Command::Invoices { patient, status } => {
            require_role(&client.session, &[Role::Admin, Role::Secretary]).await?;
            print_json(&client.api.invoices(patient.map(PatientId), status).await?)?;
        }
        Command::Users { role } => {
            require_role(&client.session, &[Role::Admin]).await?;
            for user in client.api.users(role).await? {
                println!(
                    "#{:<5} {:<10} {} {} <{}>",
                    user.id.0,
                    user.role.as_str(),
                    user.first_name,
                    user.last_name,
                    user.email
                );
            }
        }
        Command::Dashboard => dashboard(&client).await?,
    }

    Ok(())
}

/// Pages through the feed until the record is loaded, then acknowledges it.
async fn mark_read(client: &ClinicClient, id: NotificationId) -> Result<()> {
    let feed = &client.notifications;
    feed.load_page(1).await?;
    loop {
        let loaded = feed
            .snapshot()
            .await
            .records
            .iter()
            .any(|record| record.id == Some(id));
        if loaded || !feed.load_more().await? {
            break;
        }
    }
    feed.mark_as_read(id).await?;
    Ok(())
}

async fn dashboard(client: &ClinicClient) -> Result<()> {
    let user = require_login(&client.session).await?;
    match user.role {
        Role::Admin => {
            let stats = client.api.admin_stats().await?;
            println!("Patients:            {}", stats.total_patients);
            println!("Appointments today:  {}", stats.appointments_today);
            println!("Monthly revenue:     {:.2}", stats.monthly_revenue);
            println!("Active staff:        {}", stats.active_staff);
            println!("Revenue by month:");
            for (month, amount) in client.api.revenue_overview(None).await? {
                println!("  {month:<4} {amount:>10.2}");
            }
            println!("Appointments this week:");
            for (day, count) in client.api.weekly_appointments(None).await? {
                println!("  {day:<4} {count:>4}");
            }
        }
        Role::Doctor => {
            let stats = client.api.doctor_stats().await?;
            println!("Appointments today:     {}", stats.appointments_today);
            println!("Patients:               {}", stats.total_patients);
            println!("Pending prescriptions:  {}", stats.pending_prescriptions);
            if let Some(next) = &stats.next_appointment_time {
                println!("Next appointment:       {next}");
            }
            print_appointments(&client.api.doctor_today().await?);
        }
        Role::Secretary => {
            let stats = client.api.secretary_stats().await?;
            println!("Appointments today:   {}", stats.appointments_today);
            println!("Pending invoices:     {}", stats.pending_invoices);
            println!("Registered patients:  {}", stats.registered_patients);
            println!("Urgent matters:       {}", stats.urgent_matters);
            print_appointments(&client.api.secretary_today().await?);
        }
    }
    Ok(())
}

fn print_notification(record: &NotificationRecord) {
    let marker = if record.read { ' ' } else { '*' };
    let id = record.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
    let when = record
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("{marker} #{id:<5} {when:<16} [{}] {}: {}", record.kind, record.title, record.message);
}

fn print_appointments(appointments: &[AppointmentDto]) {
    if appointments.is_empty() {
        println!("No appointments");
        return;
    }
    for appointment in appointments {
        let patient = match (&appointment.patient_first_name, &appointment.patient_last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            _ => format!("patient #{}", appointment.patient_id),
        };
        println!(
            "{} - {}  {:<10} {}{}",
            appointment.start_time.format("%Y-%m-%d %H:%M"),
            appointment.end_time.format("%H:%M"),
            appointment.status.as_str(),
            patient,
            appointment
                .room
                .as_deref()
                .map(|room| format!(" (room {room})"))
                .unwrap_or_default()
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
