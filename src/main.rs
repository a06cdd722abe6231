use clap::{Parser, Subcommand};
use std::process::ExitCode;

use field_dispatch::{
    app_state::AppState,
    config::AppConfig,
    models::job::Job,
    services::{
        api::DispatchApi,
        job_board::AcceptOutcome,
        lifecycle::{AdvanceOutcome, Screen},
    },
};

#[derive(Parser)]
#[command(name = "field-dispatch", version, about = "Field technician dispatch client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long, env = "DISPATCH_USERNAME")]
        username: String,
        #[arg(long, env = "DISPATCH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the technician profile and active job
    Profile,
    /// List jobs open for acceptance
    Jobs,
    /// Accept an open job
    Accept { job_id: i64 },
    /// Move the active job to its next status
    Advance,
}

#[tokio::main]
async fn main() -> ExitCode {
    field_dispatch::init_tracing();
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, state: &AppState) -> Result<(), String> {
    match command {
        Command::Login { username, password } => {
            state
                .client
                .login(&username, &password)
                .await
                .map_err(|e| format!("Login failed: {e}"))?;
            println!("Logged in as {username}");
        }
        Command::Logout => {
            state.client.logout().map_err(|e| e.to_string())?;
            println!("Logged out");
        }
        Command::Profile => {
            let profile = state.client.my_profile().await.map_err(|e| e.to_string())?;
            println!(
                "{} (#{}){}",
                profile.full_name,
                profile.id,
                if profile.is_available { " - available" } else { "" }
            );
            match profile.open_job() {
                Some(job) => print_job(job),
                None => println!("No active job"),
            }
        }
        Command::Jobs => {
            let offers = state.board.available().await.map_err(|e| e.to_string())?;
            if offers.is_empty() {
                println!("No jobs available");
            }
            for offer in offers {
                println!(
                    "{:>6}  {:<12} {:<14} {:>8.2}  {}{}",
                    offer.id,
                    offer.request_number,
                    offer.service_type.as_deref().unwrap_or("-"),
                    offer.earnings,
                    offer.address,
                    offer
                        .distance_km
                        .map(|d| format!(" ({d:.1} km)"))
                        .unwrap_or_default()
                );
            }
        }
        Command::Accept { job_id } => {
            // The tracker must know about a job we already hold.
            state.tracker.refresh().await.map_err(|e| e.to_string())?;
            match state.board.accept(job_id).await {
                AcceptOutcome::Accepted(job) => {
                    println!("Job accepted");
                    print_job(&job);
                }
                AcceptOutcome::AlreadyTaken { reason } => {
                    return Err(format!("Job {job_id} is no longer available: {reason}"));
                }
                AcceptOutcome::ActiveJobHeld(job) => {
                    return Err(format!(
                        "Finish job {} ({}) before accepting another",
                        job.request_number, job.status
                    ));
                }
                AcceptOutcome::InFlight => return Err("Accept already in progress".to_string()),
                AcceptOutcome::Failed(e) => return Err(format!("Accept failed: {e}")),
            }
        }
        Command::Advance => {
            match state.tracker.refresh().await.map_err(|e| e.to_string())? {
                Screen::JobList => return Err("No active job".to_string()),
                Screen::ActiveJob(job) => {
                    if let Some(action) = job.status.next_action() {
                        println!("{}...", action.label());
                    }
                }
            }

            match state.tracker.advance().await.map_err(|e| e.to_string())? {
                AdvanceOutcome::Advanced {
                    screen: Screen::ActiveJob(job),
                    ..
                } => print_job(&job),
                AdvanceOutcome::Advanced {
                    screen: Screen::JobList,
                    ..
                } => println!("Job closed, back to the job list"),
                AdvanceOutcome::InFlight => return Err("Advance already in progress".to_string()),
            }
        }
    }

    Ok(())
}

fn print_job(job: &Job) {
    println!("Job {} [{}] - {}", job.request_number, job.status, job.customer.name);
    println!(
        "  {}{}",
        job.destination.address,
        job.destination
            .city
            .as_deref()
            .map(|c| format!(", {c}"))
            .unwrap_or_default()
    );
    if let (Some(distance), Some(eta)) = (job.distance_km, job.eta_minutes) {
        println!("  {distance:.1} km, ETA {eta} min");
    }
    println!("  Earnings: {:.2}", job.earnings);
    if let Some(action) = job.status.next_action() {
        println!("  Next: {}", action.label());
    }
}
