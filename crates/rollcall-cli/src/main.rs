use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall volunteer check-in CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new face profile
    Enroll {
        /// Volunteer user id
        #[arg(short, long)]
        user: String,
        /// Label for this profile (e.g., "normal", "glasses")
        #[arg(short, long, default_value = "normal")]
        label: String,
    },
    /// Check in at an event with face verification
    CheckIn {
        /// Volunteer user id
        #[arg(short, long)]
        user: String,
        /// Event id to record attendance for
        #[arg(short, long)]
        event: String,
    },
    /// Identify the person at the camera against all enrolled profiles
    Identify,
    /// List enrolled face profiles
    List {
        /// Volunteer user id
        #[arg(short, long)]
        user: String,
    },
    /// Remove an enrolled face profile
    Remove {
        /// Volunteer user id
        #[arg(short, long)]
        user: String,
        /// Profile ID to remove
        id: String,
    },
    /// Attach a certificate URL to a recorded check-in
    Certificate {
        /// Volunteer user id
        #[arg(short, long)]
        user: String,
        /// Event id the certificate belongs to
        #[arg(short, long)]
        event: String,
        /// Certificate URL to link
        url: String,
    },
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test,
}

// `#[zbus::proxy]` generates `RollcallProxy` from the daemon interface.
#[zbus::proxy(
    interface = "org.ngo.Rollcall1",
    default_service = "org.ngo.Rollcall1",
    default_path = "/org/ngo/Rollcall1"
)]
trait Rollcall {
    async fn enroll(&self, user: &str, label: &str) -> zbus::Result<String>;
    async fn check_in(&self, user: &str, event_id: &str) -> zbus::Result<String>;
    async fn identify(&self) -> zbus::Result<String>;
    async fn attach_certificate(
        &self,
        user: &str,
        event_id: &str,
        certificate_url: &str,
    ) -> zbus::Result<String>;
    async fn list_profiles(&self, user: &str) -> zbus::Result<String>;
    async fn remove_profile(&self, user: &str, profile_id: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn proxy() -> Result<RollcallProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus — is rollcalld running?")?;
    RollcallProxy::new(&conn).await.map_err(Into::into)
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll { user, label } => {
            println!("Enrolling face profile for {user} ({label}) — look at the camera");
            let reply = proxy().await?.enroll(&user, &label).await?;
            print_json(&reply)?;
        }
        Commands::CheckIn { user, event } => {
            println!("Verifying face for {user} at {event} — look at the camera");
            let reply = proxy().await?.check_in(&user, &event).await?;
            print_json(&reply)?;
        }
        Commands::Identify => {
            let reply = proxy().await?.identify().await?;
            print_json(&reply)?;
        }
        Commands::List { user } => {
            let reply = proxy().await?.list_profiles(&user).await?;
            print_json(&reply)?;
        }
        Commands::Remove { user, id } => {
            let removed = proxy().await?.remove_profile(&user, &id).await?;
            if removed {
                println!("Removed profile {id}");
            } else {
                println!("No profile {id} for {user}");
            }
        }
        Commands::Certificate { user, event, url } => {
            let reply = proxy().await?.attach_certificate(&user, &event, &url).await?;
            print_json(&reply)?;
        }
        Commands::Status => {
            let reply = proxy().await?.status().await?;
            print_json(&reply)?;
        }
        Commands::Test => run_camera_test()?,
    }

    Ok(())
}

/// Direct camera diagnostics, bypassing the daemon. The daemon must not be
/// holding the device while this runs.
fn run_camera_test() -> Result<()> {
    let devices = rollcall_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return Ok(());
    }
    for dev in &devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }

    let device =
        std::env::var("ROLLCALL_CAMERA_DEVICE").unwrap_or_else(|_| devices[0].path.clone());
    println!("Capturing a test frame from {device}...");

    let camera = rollcall_hw::Camera::open(&device)?;
    let frame = camera.capture_frame()?;
    println!(
        "{}x{} seq={} avg_luma={:.1}{}",
        frame.width,
        frame.height,
        frame.sequence,
        frame.avg_luma(),
        if frame.is_dark {
            "  (dark frame — check lighting or lens cover)"
        } else {
            ""
        }
    );
    Ok(())
}
