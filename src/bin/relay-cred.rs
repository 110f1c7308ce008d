use std::time::{Duration, SystemTime};

use clap::Parser;

use relay_plane::auth::credentials::ephemeral_credentials;

/// Print time-windowed relay credentials derived from a shared secret.
#[derive(Parser)]
#[command(name = "relay-cred")]
#[command(version, about = "Generate ephemeral relay credentials", long_about = None)]
struct Cli {
    /// Shared secret configured in auth.credentials.secret
    #[arg(short, long)]
    secret: String,

    /// Opaque user id appended to the username
    #[arg(short, long, default_value = "")]
    user: String,

    /// Validity in seconds
    #[arg(short, long, default_value_t = 86400)]
    ttl: u64,

    /// Print only "username password" instead of JSON
    #[arg(long)]
    plain: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let creds = ephemeral_credentials(
        &cli.user,
        Duration::from_secs(cli.ttl),
        &cli.secret,
        SystemTime::now(),
    )?;

    if cli.plain {
        println!("{} {}", creds.username, creds.password);
    } else {
        println!("{}", serde_json::to_string_pretty(&creds)?);
    }
    Ok(())
}
