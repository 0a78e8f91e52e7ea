// Classroom CLI
// Drives the REST client and the real-time proctoring channel from a terminal

use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use tokio::time::sleep;

use classroom_live::realtime::{
    ConnectionManager, EventChannel, MonitoringChannel, MonitoringState, QuizProgress,
    SessionChannel, SessionInfo, Severity, Violation, ViolationSource,
};
use classroom_live::{telemetry, ApiClient, AuthSession, ClientError, Config};

#[derive(Parser)]
#[command(name = "classroom-cli")]
#[command(about = "Classroom platform CLI", long_about = None)]
struct Cli {
    /// REST API base URL (default: CLASSROOM_API_URL or http://localhost:5000/api)
    #[arg(short, long)]
    api: Option<String>,

    /// Bearer token (default: CLASSROOM_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and print the issued token
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// List the classrooms of the signed-in user
    Classrooms,

    /// Watch a quiz live as its teacher (press Ctrl+C to exit)
    Monitor {
        /// Quiz ID to monitor
        #[arg(short, long)]
        quiz_id: String,
    },

    /// Simulate a student attempt over the real-time channel
    Attempt {
        /// Quiz ID
        #[arg(short, long)]
        quiz_id: String,

        /// Session ID (default: start a new attempt through the API)
        #[arg(short, long)]
        session_id: Option<String>,

        /// Number of questions to step through
        #[arg(long, default_value_t = 5)]
        questions: u32,

        /// Report a tab-switch violation halfway through
        #[arg(long)]
        violation: bool,
    },

    /// Send an intervention to one student session
    Intervene {
        #[arg(short, long)]
        quiz_id: String,

        #[arg(short, long)]
        session_id: String,

        /// Action name, e.g. warn, pause, terminate
        #[arg(short, long, default_value = "warn")]
        action: String,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Build a download link for a protected file
    Download {
        /// API path of the file
        #[arg(short, long)]
        path: String,

        /// Request a short-lived signed link instead of embedding the token
        #[arg(long)]
        signed: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.api {
        Some(api) => {
            dotenv::dotenv().ok();
            Config::from_api_url(api.clone())
        }
        None => Config::from_env(),
    };
    telemetry::init(&config.logging);

    let auth = AuthSession::new();
    if let Some(token) = cli
        .token
        .clone()
        .or_else(|| std::env::var("CLASSROOM_TOKEN").ok())
        .filter(|t| !t.is_empty())
    {
        auth.set_token(token);
    }

    let api = match ApiClient::new(&config.api, auth.clone()) {
        Ok(api) => api,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Login { email, password } => login(&api, &email, &password).await,
        Commands::Classrooms => list_classrooms(&api).await,
        Commands::Monitor { quiz_id } => monitor(&config, &auth, &quiz_id).await,
        Commands::Attempt {
            quiz_id,
            session_id,
            questions,
            violation,
        } => attempt(&config, &api, &quiz_id, session_id, questions, violation).await,
        Commands::Intervene {
            quiz_id,
            session_id,
            action,
            message,
        } => intervene(&config, &auth, &quiz_id, &session_id, &action, message.as_deref()).await,
        Commands::Download { path, signed } => download(&api, &path, signed).await,
    };

    if let Err(e) = result {
        println!("{} {}", "✗".red(), e);
        if e.is_unauthorized() {
            println!("  Stored credential was rejected, sign in again with {}", "login".cyan());
        }
        std::process::exit(1);
    }
}

fn open_channel(config: &Config, auth: &AuthSession) -> Result<EventChannel, ClientError> {
    if !auth.is_authenticated() {
        return Err(ClientError::MissingToken);
    }
    let manager = ConnectionManager::connect(config.realtime.clone(), auth.clone());
    Ok(EventChannel::new(manager))
}

async fn wait_connected(channel: &EventChannel, config: &Config) -> Result<(), ClientError> {
    println!("{}", "Connecting to real-time channel...".cyan());
    println!("  URL: {}", config.realtime.websocket_url()?);

    match channel
        .manager()
        .wait_until_connected(Duration::from_secs(10))
        .await
    {
        Ok(_) => {
            println!("{} Connected", "✓".green());
            Ok(())
        }
        Err(e) => {
            if let Some(error) = channel.status().last_error {
                println!("  Last error: {}", error.yellow());
            }
            Err(e)
        }
    }
}

async fn login(api: &ApiClient, email: &str, password: &str) -> Result<(), ClientError> {
    println!("{}", "Signing in...".cyan());
    let response = api.login(email, password).await?;

    println!("{} Signed in", "✓".green());
    if let Some(user) = &response.user {
        println!("  User: {}", user.name.as_deref().unwrap_or(&user.id));
        println!("  Role: {}", user.role.as_deref().unwrap_or("unknown"));
    }
    println!("\n{}", "═".repeat(50).green());
    println!("{} {}", "Token:".bold(), response.token.green().bold());
    println!("{}", "═".repeat(50).green());
    println!("Export it as {} for the other commands.", "CLASSROOM_TOKEN".cyan());
    Ok(())
}

async fn list_classrooms(api: &ApiClient) -> Result<(), ClientError> {
    let classrooms = api.list_classrooms().await?;

    if classrooms.is_empty() {
        println!("{}", "No classrooms".yellow());
        return Ok(());
    }

    println!("\n{}", "Classrooms:".bold());
    for classroom in classrooms {
        println!(
            "  {} {} {}",
            classroom.id.cyan(),
            classroom.name.bold(),
            classroom
                .code
                .map(|c| format!("(code {})", c))
                .unwrap_or_default()
                .bright_black()
        );
    }
    Ok(())
}

async fn monitor(config: &Config, auth: &AuthSession, quiz_id: &str) -> Result<(), ClientError> {
    let channel = open_channel(config, auth)?;
    wait_connected(&channel, config).await?;

    let monitor = MonitoringChannel::join(channel.clone(), quiz_id)?;
    println!("Monitoring quiz {}", quiz_id.green().bold());
    println!("Press {} to stop.", "Ctrl+C".bold());

    let mut printed_violations = 0usize;
    let mut last_active = usize::MAX;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep(Duration::from_millis(500)) => {}
        }

        let state = monitor.snapshot();

        if state.violations().len() < printed_violations {
            // State was rebuilt after a reconnect
            printed_violations = 0;
        }
        for entry in &state.violations()[printed_violations..] {
            let marker = match entry.source {
                ViolationSource::Transport => "⚡".yellow(),
                ViolationSource::Proctoring => "⚠".red(),
            };
            println!(
                "{} {} {} ({:?})",
                marker,
                entry.student_id.bold(),
                entry.violation.kind,
                entry.violation.severity
            );
        }
        printed_violations = state.violations().len();

        if state.active_students().len() != last_active {
            last_active = state.active_students().len();
            print_active(&state);
        }
    }

    let state = monitor.snapshot();
    monitor.close();
    channel.manager().shutdown();

    println!("\n{}", "Summary".bold());
    println!("  Active: {}", state.active_students().len());
    println!("  Completed: {}", state.completions().len());
    println!("  Violations: {}", state.violations().len());
    Ok(())
}

fn print_active(state: &MonitoringState) {
    println!("{} {} active", "◀".green(), state.active_students().len());
    for student in state.active_students() {
        let progress = student
            .progress
            .as_ref()
            .map(|p| format!("{}/{}", p.answered_count, p.total_questions))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "    {} {} {}",
            student.student_id.cyan(),
            student.student_name.as_deref().unwrap_or(""),
            progress.bright_white()
        );
    }
}

async fn attempt(
    config: &Config,
    api: &ApiClient,
    quiz_id: &str,
    session_id: Option<String>,
    questions: u32,
    violation: bool,
) -> Result<(), ClientError> {
    let session_id = match session_id {
        Some(id) => id,
        None => {
            let attempt = api.start_quiz(quiz_id).await?;
            println!("{} Attempt opened: {}", "✓".green(), attempt.id.cyan());
            attempt.id
        }
    };

    let channel = open_channel(config, api.auth())?;
    wait_connected(&channel, config).await?;

    let session = SessionChannel::open(
        channel.clone(),
        SessionInfo {
            session_id: session_id.clone(),
            quiz_id: quiz_id.to_string(),
        },
    )?;

    for question in 1..=questions {
        sleep(Duration::from_millis(500)).await;

        let sent = session.report_progress(QuizProgress {
            current_question: question,
            answered_count: question,
            total_questions: questions,
        });
        println!(
            "{} Progress {}/{}",
            if sent { "▶".green() } else { "✗".red() },
            question,
            questions
        );

        if violation && question == questions / 2 + 1 {
            let sent = session.report_violation(
                Violation::new("tab-switch", Severity::Medium).with_details("Simulated from CLI"),
            );
            println!(
                "{} Reported tab-switch violation",
                if sent { "⚠".yellow() } else { "✗".red() }
            );
        }
    }

    for intervention in session.interventions() {
        println!(
            "{} Teacher: {} {}",
            "◀".green(),
            intervention.action.bold(),
            intervention.message.as_deref().unwrap_or("")
        );
    }

    let completed = session.finish();
    println!(
        "{} Completion {}",
        if completed { "✓".green() } else { "✗".yellow() },
        if completed { "sent" } else { "not sent" }
    );

    channel.manager().shutdown();
    Ok(())
}

async fn intervene(
    config: &Config,
    auth: &AuthSession,
    quiz_id: &str,
    session_id: &str,
    action: &str,
    message: Option<&str>,
) -> Result<(), ClientError> {
    let channel = open_channel(config, auth)?;
    wait_connected(&channel, config).await?;

    let monitor = MonitoringChannel::join(channel.clone(), quiz_id)?;
    // Give the join a moment to reach the server before the intervention
    sleep(Duration::from_millis(200)).await;

    if monitor.send_intervention(session_id, action, message) {
        println!("{} Intervention sent to {}", "✓".green(), session_id.cyan());
    } else {
        println!("{} Intervention dropped, channel disconnected", "✗".red());
    }

    // Let the writer flush before tearing down
    sleep(Duration::from_millis(200)).await;
    monitor.close();
    channel.manager().shutdown();
    Ok(())
}

async fn download(api: &ApiClient, path: &str, signed: bool) -> Result<(), ClientError> {
    let url = if signed {
        api.signed_download_url(path).await?
    } else {
        println!(
            "{}",
            "⚠ This link embeds your token; do not share it.".yellow()
        );
        api.download_url(path)?
    };

    println!("{}", url);
    Ok(())
}
